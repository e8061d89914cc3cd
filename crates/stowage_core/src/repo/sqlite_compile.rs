//! Query-spec to SQL translation for the SQLite backend.
//!
//! # Invariants
//! - Values are always bound as parameters; only validated identifiers are
//!   spliced into SQL text.
//! - Result order is fully determined: the identity column is appended as a
//!   final ascending sort key, matching the scan evaluator's id-ordered
//!   tables.

use crate::db::quote_identifier;
use crate::model::schema::EntitySchema;
use crate::model::value::{format_timestamp, FieldValue};
use crate::query::{Operator, Predicate, QuerySpec};
use rusqlite::types::Value;

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// `SELECT <entity fields> FROM <table> ...` for `spec`.
pub(crate) fn compile_select(table: &str, spec: &QuerySpec) -> CompiledQuery {
    let mut params = Vec::new();
    let mut sql = format!(
        "SELECT {} FROM {}",
        select_list(spec.schema),
        quote_identifier(table)
    );
    push_where(&mut sql, &mut params, spec);
    push_order_by(&mut sql, spec);
    push_window(&mut sql, &mut params, spec);
    CompiledQuery { sql, params }
}

/// Row count for `spec`, honoring its slice window.
pub(crate) fn compile_count(table: &str, spec: &QuerySpec) -> CompiledQuery {
    let mut params = Vec::new();
    if spec.slice.is_unbounded() {
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        push_where(&mut sql, &mut params, spec);
        return CompiledQuery { sql, params };
    }

    let mut inner = format!("SELECT 1 FROM {}", quote_identifier(table));
    push_where(&mut inner, &mut params, spec);
    push_window(&mut inner, &mut params, spec);
    CompiledQuery {
        sql: format!("SELECT COUNT(*) FROM ({inner})"),
        params,
    }
}

/// Storage encoding of one field value.
pub(crate) fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Uuid(id) => Value::Text(id.hyphenated().to_string()),
        FieldValue::Text(text) => Value::Text(text.clone()),
        FieldValue::Integer(number) => Value::Integer(*number),
        FieldValue::Boolean(flag) => Value::Integer(bool_to_int(*flag)),
        FieldValue::Timestamp(at) => Value::Text(format_timestamp(at)),
    }
}

pub(crate) fn select_list(schema: &EntitySchema) -> String {
    schema
        .fields
        .iter()
        .map(|field| quote_identifier(field.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_where(sql: &mut String, params: &mut Vec<Value>, spec: &QuerySpec) {
    if spec.predicates.is_empty() {
        return;
    }
    let clauses = spec
        .predicates
        .iter()
        .map(|predicate| predicate_clause(predicate, params))
        .collect::<Vec<_>>();
    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
}

fn predicate_clause(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    let column = quote_identifier(predicate.field);
    let comparison = match predicate.op {
        Operator::IsNull => {
            return match predicate.value {
                FieldValue::Boolean(false) => format!("{column} IS NOT NULL"),
                _ => format!("{column} IS NULL"),
            };
        }
        Operator::StartsWith | Operator::EndsWith => {
            let text = predicate.value.as_text().unwrap_or_default();
            let pattern = if predicate.op == Operator::StartsWith {
                format!("{}*", escape_glob(text))
            } else {
                format!("*{}", escape_glob(text))
            };
            params.push(Value::Text(pattern));
            return format!("{column} GLOB ?");
        }
        Operator::Eq => "=",
        Operator::Ne => "<>",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
    };
    params.push(to_sql_value(&predicate.value));
    format!("{column} {comparison} ?")
}

fn push_order_by(sql: &mut String, spec: &QuerySpec) {
    let mut keys = spec
        .ordering
        .iter()
        .map(|key| {
            let direction = if key.descending { "DESC" } else { "ASC" };
            format!("{} {}", quote_identifier(key.field), direction)
        })
        .collect::<Vec<_>>();
    if !spec.ordering.iter().any(|key| key.field == spec.schema.id_field) {
        keys.push(format!("{} ASC", quote_identifier(spec.schema.id_field)));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&keys.join(", "));
}

fn push_window(sql: &mut String, params: &mut Vec<Value>, spec: &QuerySpec) {
    let start = to_sql_int(spec.slice.start);
    match spec.slice.limit() {
        Some(limit) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(to_sql_int(limit)));
            params.push(Value::Integer(start));
        }
        None if start > 0 => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(Value::Integer(start));
        }
        None => {}
    }
}

/// Escapes `*`, `?` and `[` so `text` matches literally inside a GLOB.
fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '*' => escaped.push_str("[*]"),
            '?' => escaped.push_str("[?]"),
            '[' => escaped.push_str("[[]"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
