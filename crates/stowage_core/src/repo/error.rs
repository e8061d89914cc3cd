//! Repository error surface shared by every entity backend.
//!
//! # Invariants
//! - Contract violations (`NotFound`, `AlreadyExists`, ...) are raised at the
//!   call that violates them and are identical across backends.
//! - Transport failures keep their source error untranslated.

use crate::db::DbError;
use crate::model::schema::EntityId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// No entity matched an identity or a unique lookup.
    NotFound(String),
    AlreadyExists(EntityId),
    MultipleResultsFound(usize),
    /// Unknown field, unknown lookup operator or ill-typed value.
    InvalidField { field: String, reason: String },
    IndexOutOfRange { index: i64, len: usize },
    InvalidIndexType(String),
    /// Entity schema and storage mapping disagree.
    InvalidSchema(String),
    /// Persisted data cannot be mapped back to an entity.
    InvalidData(String),
    Db(DbError),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl RepoError {
    pub fn not_found(id: EntityId) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "entity not found: {key}"),
            Self::AlreadyExists(id) => write!(f, "entity already exists: {id}"),
            Self::MultipleResultsFound(count) => {
                write!(f, "expected exactly one entity, found {count}")
            }
            Self::InvalidField { field, reason } => write!(f, "invalid field `{field}`: {reason}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for query of length {len}")
            }
            Self::InvalidIndexType(kind) => {
                write!(f, "query indices must be integers, got {kind}")
            }
            Self::InvalidSchema(message) => write!(f, "invalid schema mapping: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<std::io::Error> for RepoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
