//! Uniform entity repositories, lazy queries and blob storage.
//!
//! Entities are persisted through [`repo::EntityRepository`] over an
//! in-memory registry, a single JSON file or SQLite, and read back through
//! lazily evaluated [`query::Query`] values whose semantics do not depend
//! on the backend.

pub mod blob;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use blob::{BlobError, BlobResult, BlobStorage, MemoryBlobStorage, ObjectStoreBlobStorage, S3BlobConfig};
pub use config::{BlobBackendConfig, ConfigError, EntityBackendConfig, LoggingConfig, StoreConfig};
pub use db::{ensure_table, open_db, open_db_in_memory, ColumnDef, DbError, TableSchema};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::{Entity, EntityId, EntitySchema, FieldDescriptor, FieldType, FieldValue, Record};
pub use query::{Operator, Query, QueryExecutor};
pub use repo::{
    EntityRepository, FileDatabase, FileRepository, MemoryDatabase, MemoryRepository, RepoError,
    SqliteRepository,
};
pub use repo::error::RepoResult;

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
