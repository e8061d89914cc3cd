//! SQLite connection bootstrap and table provisioning.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the relational backend.
//! - Describe entity tables statically and create them on demand.
//!
//! # Invariants
//! - Table and column names are validated identifiers before any DDL runs.
//! - This module never migrates existing tables; `ensure_table` only
//!   creates missing ones.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
mod table;

pub use open::{open_db, open_db_in_memory};
pub use table::{ensure_table, quote_identifier, ColumnDef, TableSchema};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidTableSchema { table: String, reason: String },
}

impl DbError {
    pub(crate) fn invalid_table(table: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTableSchema {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidTableSchema { table, reason } => {
                write!(f, "invalid table schema `{table}`: {reason}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidTableSchema { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
