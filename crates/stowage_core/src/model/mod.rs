//! Entity and schema contract shared by every backend.
//!
//! # Responsibility
//! - Describe an entity's table, identity field and typed field set.
//! - Provide the dynamic value/record views backends compare and persist.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - Schemas are static data; nothing here inspects types at runtime.
//! - Entities are immutable values; an update is a full replacement.

pub mod record;
pub mod schema;
pub mod value;

pub use record::Record;
pub use schema::{Entity, EntityId, EntitySchema, FieldDescriptor, FieldType};
pub use value::FieldValue;
