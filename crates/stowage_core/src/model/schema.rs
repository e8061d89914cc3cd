//! Static entity schema declarations.
//!
//! # Responsibility
//! - Bind an entity type to its table name, identity field and field list.
//! - Reject references to undeclared fields before any backend is touched.
//!
//! # Invariants
//! - `id_field` names a non-nullable `FieldType::Uuid` field of `fields`.
//! - Field order in `fields` is the canonical record order.

use crate::model::value::FieldValue;
use crate::repo::error::{RepoError, RepoResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every stored entity.
pub type EntityId = Uuid;

/// Semantic type of one entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Uuid,
    Text,
    Integer,
    Boolean,
    /// Timezone-aware instant, normalized to UTC.
    Timestamp,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uuid => "uuid",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// One declared field: name, semantic type and nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl FieldDescriptor {
    /// Declares a field that must always carry a value.
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: false,
        }
    }

    /// Declares a field that may be null.
    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: true,
        }
    }
}

/// Table/collection binding for one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: &'static str,
    pub id_field: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl EntitySchema {
    /// Returns the descriptor for `name`, if declared.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns the descriptor for `name` or an `InvalidField` error.
    pub fn require_field(&self, name: &str) -> RepoResult<&FieldDescriptor> {
        self.field(name).ok_or_else(|| {
            RepoError::invalid_field(
                name,
                format!("no such field on `{}` entities", self.table),
            )
        })
    }

    /// Returns the identity field descriptor.
    pub fn id_descriptor(&self) -> RepoResult<&FieldDescriptor> {
        let descriptor = self.field(self.id_field).ok_or_else(|| {
            RepoError::InvalidSchema(format!(
                "identity field `{}` is not declared on `{}`",
                self.id_field, self.table
            ))
        })?;
        if descriptor.field_type != FieldType::Uuid || descriptor.nullable {
            return Err(RepoError::InvalidSchema(format!(
                "identity field `{}` on `{}` must be a non-nullable uuid",
                self.id_field, self.table
            )));
        }
        Ok(descriptor)
    }

    /// Validates a partial change set against this schema.
    ///
    /// Returns the changes with every value coerced to its field type.
    ///
    /// # Errors
    /// - `InvalidField` for unknown fields, type mismatches, nulls written
    ///   into non-nullable fields and attempts to change the identity.
    pub fn validate_changes(
        &self,
        changes: &[(&str, FieldValue)],
    ) -> RepoResult<Vec<(&'static str, FieldValue)>> {
        let mut validated = Vec::with_capacity(changes.len());
        for (name, value) in changes {
            let descriptor = self.require_field(name)?;
            if descriptor.name == self.id_field {
                return Err(RepoError::invalid_field(
                    *name,
                    "the identity field cannot be changed",
                ));
            }
            validated.push((descriptor.name, descriptor.accept(value)?));
        }
        Ok(validated)
    }
}

impl FieldDescriptor {
    /// Coerces `value` into this field's type, honoring nullability.
    pub fn accept(&self, value: &FieldValue) -> RepoResult<FieldValue> {
        if value.is_null() {
            if self.nullable {
                return Ok(FieldValue::Null);
            }
            return Err(RepoError::invalid_field(self.name, "field is not nullable"));
        }
        value.coerce_to(self.field_type).ok_or_else(|| {
            RepoError::invalid_field(
                self.name,
                format!("expected a {} value, got {}", self.field_type, value.kind()),
            )
        })
    }
}

/// Identity-bearing immutable domain record managed by a repository.
///
/// Field values are read through `serde`, so implementing this trait only
/// requires the static schema and the identity accessor.
pub trait Entity: Clone + Debug + PartialEq + Serialize + DeserializeOwned {
    fn schema() -> &'static EntitySchema;
    fn id(&self) -> EntityId;
}
