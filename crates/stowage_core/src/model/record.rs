//! Schema-shaped field maps.
//!
//! # Responsibility
//! - Convert entities to and from a dynamic, schema-ordered field map.
//! - Give scan-based backends one representation to filter and sort.
//!
//! # Invariants
//! - A record holds exactly the fields its schema declares.
//! - Converting an entity to a record and back yields an equal entity.

use crate::model::schema::{Entity, EntityId, EntitySchema};
use crate::model::value::FieldValue;
use crate::repo::error::{RepoError, RepoResult};
use std::collections::BTreeMap;

/// Dynamic view of one entity, keyed by declared field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: BTreeMap<&'static str, FieldValue>,
}

impl Record {
    /// Builds a record from an entity's serde representation.
    pub fn from_entity<E: Entity>(entity: &E) -> RepoResult<Self> {
        let json = serde_json::to_value(entity)?;
        Self::from_json(E::schema(), &json)
    }

    /// Builds a record from a JSON object shaped like the entity.
    ///
    /// Missing keys read as null; non-nullable fields must be present.
    pub fn from_json(schema: &EntitySchema, json: &serde_json::Value) -> RepoResult<Self> {
        let object = json.as_object().ok_or_else(|| {
            RepoError::InvalidData(format!(
                "`{}` entity must serialize to an object",
                schema.table
            ))
        })?;

        let mut values = BTreeMap::new();
        for field in schema.fields {
            let raw = object.get(field.name).unwrap_or(&serde_json::Value::Null);
            let value = FieldValue::from_json(raw, field.field_type).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "`{}.{}` holds {raw}, expected {}",
                    schema.table, field.name, field.field_type
                ))
            })?;
            if value.is_null() && !field.nullable {
                return Err(RepoError::InvalidData(format!(
                    "`{}.{}` is null but not nullable",
                    schema.table, field.name
                )));
            }
            values.insert(field.name, value);
        }

        Ok(Self { values })
    }

    /// Builds a record from already typed values, e.g. a relational row.
    pub fn from_values(values: impl IntoIterator<Item = (&'static str, FieldValue)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> &FieldValue {
        self.values.get(name).unwrap_or(&FieldValue::Null)
    }

    pub fn set(&mut self, name: &'static str, value: FieldValue) {
        self.values.insert(name, value);
    }

    /// Reads the identity value declared by `schema`.
    pub fn id(&self, schema: &EntitySchema) -> RepoResult<EntityId> {
        match self.get(schema.id_field) {
            FieldValue::Uuid(id) => Ok(*id),
            other => Err(RepoError::InvalidData(format!(
                "`{}.{}` holds {other}, expected a uuid",
                schema.table, schema.id_field
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .values
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    }

    pub fn to_entity<E: Entity>(&self) -> RepoResult<E> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}
