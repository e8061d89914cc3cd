//! Backend-neutral query algebra: predicates, sort keys and slice bounds.
//!
//! # Invariants
//! - Every predicate and sort key names a declared field; validation
//!   happens while the query is being built, never inside a backend.
//! - The operator set is closed; adding one means touching every
//!   translator (`Predicate::matches` and the SQL compiler).

use crate::model::record::Record;
use crate::model::schema::{EntitySchema, FieldType};
use crate::model::value::FieldValue;
use crate::repo::error::{RepoError, RepoResult};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

const LOOKUP_SEPARATOR: &str = "__";

/// Comparison operator of one predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    StartsWith,
    EndsWith,
    /// Value is a boolean: `true` keeps nulls, `false` keeps non-nulls.
    IsNull,
}

impl Operator {
    /// Parses a lookup suffix such as `lte` in `num__lte`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            "isnull" => Some(Self::IsNull),
            _ => None,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::IsNull => "isnull",
        }
    }
}

/// One validated `field <op> value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: &'static str,
    pub op: Operator,
    pub value: FieldValue,
}

impl Predicate {
    /// Parses a lookup of the form `field` or `field__op`.
    ///
    /// # Errors
    /// - `InvalidField` when the field is undeclared, the operator suffix is
    ///   unknown, or the value does not fit the operator/field.
    pub fn parse(schema: &EntitySchema, lookup: &str, value: FieldValue) -> RepoResult<Self> {
        if let Some((field, suffix)) = lookup.rsplit_once(LOOKUP_SEPARATOR) {
            if let Some(op) = Operator::from_suffix(suffix) {
                return Self::new(schema, field, op, value);
            }
            if schema.field(lookup).is_none() {
                return Err(RepoError::invalid_field(
                    lookup,
                    format!("unknown lookup operator `{suffix}`"),
                ));
            }
        }
        Self::new(schema, lookup, Operator::Eq, value)
    }

    /// Builds a predicate from its parts, validating against `schema`.
    pub fn new(
        schema: &EntitySchema,
        field: &str,
        op: Operator,
        value: FieldValue,
    ) -> RepoResult<Self> {
        let descriptor = schema.require_field(field)?;
        let value = match op {
            Operator::IsNull => match value {
                FieldValue::Boolean(_) => value,
                other => {
                    return Err(RepoError::invalid_field(
                        field,
                        format!("isnull expects a boolean, got {}", other.kind()),
                    ));
                }
            },
            _ if value.is_null() => {
                return Err(RepoError::invalid_field(
                    field,
                    format!("cannot compare with null using `{}`; use isnull", op.suffix()),
                ));
            }
            Operator::StartsWith | Operator::EndsWith => {
                if descriptor.field_type != FieldType::Text || value.as_text().is_none() {
                    return Err(RepoError::invalid_field(
                        field,
                        format!("`{}` needs a text field and a text value", op.suffix()),
                    ));
                }
                value
            }
            _ => value.coerce_to(descriptor.field_type).ok_or_else(|| {
                RepoError::invalid_field(
                    field,
                    format!(
                        "expected a {} value, got {}",
                        descriptor.field_type,
                        value.kind()
                    ),
                )
            })?,
        };

        Ok(Self {
            field: descriptor.name,
            op,
            value,
        })
    }

    /// Evaluates this predicate against one record.
    ///
    /// Null field values satisfy nothing but `isnull`.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(self.field);
        match self.op {
            Operator::IsNull => matches!(self.value, FieldValue::Boolean(expected) if actual.is_null() == expected),
            Operator::StartsWith => match (actual.as_text(), self.value.as_text()) {
                (Some(text), Some(prefix)) => text.starts_with(prefix),
                _ => false,
            },
            Operator::EndsWith => match (actual.as_text(), self.value.as_text()) {
                (Some(text), Some(suffix)) => text.ends_with(suffix),
                _ => false,
            },
            op => {
                let Some(ordering) = actual.partial_cmp_value(&self.value) else {
                    return false;
                };
                match op {
                    Operator::Eq => ordering == Ordering::Equal,
                    Operator::Ne => ordering != Ordering::Equal,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Lte => ordering != Ordering::Greater,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Gte => ordering != Ordering::Less,
                    Operator::StartsWith | Operator::EndsWith | Operator::IsNull => false,
                }
            }
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}={}",
            self.field,
            LOOKUP_SEPARATOR,
            self.op.suffix(),
            self.value
        )
    }
}

/// One sort key; a leading `-` in the source name means descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderKey {
    pub fn parse(schema: &EntitySchema, name: &str) -> RepoResult<Self> {
        let (descending, field) = match name.strip_prefix('-') {
            Some(field) => (true, field),
            None => (false, name),
        };
        let descriptor = schema.require_field(field)?;
        Ok(Self {
            field: descriptor.name,
            descending,
        })
    }

    /// Compares two records on this key; nulls first when ascending.
    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        let ordering = left.get(self.field).sort_cmp(right.get(self.field));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Half-open `[start, stop)` window over a query's ordered results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceBounds {
    pub start: usize,
    pub stop: Option<usize>,
}

impl SliceBounds {
    /// Narrows these bounds by a slice expressed relative to them.
    pub fn narrow(self, start: usize, stop: Option<usize>) -> Self {
        let relative_stop = stop.map(|stop| self.start.saturating_add(stop));
        let stop = match (relative_stop, self.stop) {
            (Some(inner), Some(outer)) => Some(inner.min(outer)),
            (inner, None) => inner,
            (None, outer) => outer,
        };
        Self {
            start: self.start.saturating_add(start),
            stop,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start == 0 && self.stop.is_none()
    }

    /// Maximum number of rows the window can hold, if bounded.
    pub fn limit(&self) -> Option<usize> {
        self.stop.map(|stop| stop.saturating_sub(self.start))
    }

    /// Applies the window to a sequence, truncating silently.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let take = self.limit().unwrap_or(usize::MAX);
        items.into_iter().skip(self.start).take(take).collect()
    }
}

/// Immutable description of what a query selects.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub schema: &'static EntitySchema,
    pub predicates: Vec<Predicate>,
    pub ordering: Vec<OrderKey>,
    pub slice: SliceBounds,
    /// Set by `Query::none`; executors are never consulted.
    pub empty: bool,
}

impl QuerySpec {
    pub fn new(schema: &'static EntitySchema) -> Self {
        Self {
            schema,
            predicates: Vec::new(),
            ordering: Vec::new(),
            slice: SliceBounds::default(),
            empty: false,
        }
    }

    /// Total order over records implied by `ordering`.
    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        self.ordering
            .iter()
            .map(|key| key.compare(left, right))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::{Operator, OrderKey, Predicate, SliceBounds};
    use crate::model::record::Record;
    use crate::model::schema::{EntitySchema, FieldDescriptor, FieldType};
    use crate::model::value::FieldValue;
    use crate::repo::error::RepoError;

    const SCHEMA: EntitySchema = EntitySchema {
        table: "items",
        id_field: "id",
        fields: &[
            FieldDescriptor::required("id", FieldType::Uuid),
            FieldDescriptor::required("name", FieldType::Text),
            FieldDescriptor::required("rank", FieldType::Integer),
            FieldDescriptor::optional("flag", FieldType::Boolean),
            FieldDescriptor::required("snake__case", FieldType::Text),
        ],
    };

    fn record(name: &str, rank: i64, flag: Option<bool>) -> Record {
        Record::from_values([
            ("id", FieldValue::Uuid(uuid::Uuid::new_v4())),
            ("name", name.into()),
            ("rank", rank.into()),
            ("flag", flag.into()),
            ("snake__case", "x".into()),
        ])
    }

    #[test]
    fn parse_splits_operator_suffix() {
        let predicate = Predicate::parse(&SCHEMA, "rank__gte", 3.into()).unwrap();
        assert_eq!(predicate.field, "rank");
        assert_eq!(predicate.op, Operator::Gte);

        let predicate = Predicate::parse(&SCHEMA, "name", "a".into()).unwrap();
        assert_eq!(predicate.op, Operator::Eq);
    }

    #[test]
    fn parse_accepts_field_names_containing_separator() {
        let predicate = Predicate::parse(&SCHEMA, "snake__case", "x".into()).unwrap();
        assert_eq!(predicate.field, "snake__case");
        assert_eq!(predicate.op, Operator::Eq);
    }

    #[test]
    fn parse_rejects_unknown_fields_and_operators() {
        let err = Predicate::parse(&SCHEMA, "blah", "boo".into()).unwrap_err();
        assert!(matches!(err, RepoError::InvalidField { .. }));
        let err = Predicate::parse(&SCHEMA, "rank__between", 1.into()).unwrap_err();
        assert!(matches!(err, RepoError::InvalidField { .. }));
    }

    #[test]
    fn parse_rejects_ill_typed_values() {
        assert!(Predicate::parse(&SCHEMA, "rank__lt", "two".into()).is_err());
        assert!(Predicate::parse(&SCHEMA, "rank__startswith", "1".into()).is_err());
        assert!(Predicate::parse(&SCHEMA, "flag__isnull", 1.into()).is_err());
        assert!(Predicate::parse(&SCHEMA, "flag", FieldValue::Null).is_err());
    }

    #[test]
    fn null_fields_only_match_isnull() {
        let unset = record("a", 1, None);
        let ne = Predicate::parse(&SCHEMA, "flag__ne", true.into()).unwrap();
        let isnull = Predicate::parse(&SCHEMA, "flag__isnull", true.into()).unwrap();
        let notnull = Predicate::parse(&SCHEMA, "flag__isnull", false.into()).unwrap();
        assert!(!ne.matches(&unset));
        assert!(isnull.matches(&unset));
        assert!(!notnull.matches(&unset));
        assert!(ne.matches(&record("a", 1, Some(false))));
    }

    #[test]
    fn text_operators_are_case_sensitive() {
        let predicate = Predicate::parse(&SCHEMA, "name__startswith", "Ba".into()).unwrap();
        assert!(predicate.matches(&record("Bar", 0, None)));
        assert!(!predicate.matches(&record("bar", 0, None)));
    }

    #[test]
    fn order_key_parses_direction() {
        let key = OrderKey::parse(&SCHEMA, "-rank").unwrap();
        assert!(key.descending);
        assert_eq!(key.field, "rank");
        assert!(OrderKey::parse(&SCHEMA, "-nope").is_err());
    }

    #[test]
    fn slices_compose_relative_to_parent_window() {
        let bounds = SliceBounds::default().narrow(1, Some(5)).narrow(1, Some(2));
        assert_eq!(bounds, SliceBounds { start: 2, stop: Some(3) });

        let bounds = SliceBounds::default().narrow(1, Some(3)).narrow(1, Some(10));
        assert_eq!(bounds.stop, Some(3));

        let bounds = SliceBounds::default().narrow(2, None);
        assert_eq!(bounds.apply((0..6).collect::<Vec<i32>>()), vec![2, 3, 4, 5]);
        let past_end = SliceBounds::default().narrow(9, Some(12));
        assert!(past_end.apply(vec![1, 2]).is_empty());
    }
}
