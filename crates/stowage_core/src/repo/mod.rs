//! Repository contract and backend implementations.
//!
//! # Responsibility
//! - Define the backend-agnostic CRUD + transaction contract.
//! - Provide in-memory, single-file and SQLite implementations of it.
//!
//! # Invariants
//! - A repository value is one transactional scope: constructing it acquires
//!   the backend resource, dropping it without `commit` rolls back.
//! - `insert` rejects existing identities, `update` requires them, `delete`
//!   is idempotent.
//! - Semantic errors (`NotFound`, `AlreadyExists`, ...) are the same for
//!   every backend; transport errors pass through untranslated.

pub mod buffered;
pub mod error;
pub mod file;
pub mod memory;
pub mod sqlite;
mod sqlite_compile;

use crate::model::record::Record;
use crate::model::schema::{Entity, EntityId};
use crate::model::value::FieldValue;
use crate::query::{Query, QueryExecutor};
use error::RepoResult;

pub use buffered::{BufferedRepository, PendingWrite, Table, TableExecutor, TableStore};
pub use error::RepoError;
pub use file::{FileDatabase, FileRepository};
pub use memory::{MemoryDatabase, MemoryRepository};
pub use sqlite::{SqliteExecutor, SqliteRepository};

/// Backend-bound gateway for entities of one schema.
///
/// Callers should depend on this trait only; every backend honors the same
/// observable semantics.
pub trait EntityRepository<E: Entity> {
    type Executor: QueryExecutor<E>;

    fn backend_name(&self) -> &'static str;

    /// Buffers a new entity.
    ///
    /// # Errors
    /// - `AlreadyExists` when the identity is stored or already buffered.
    fn insert(&mut self, entity: &E) -> RepoResult<()>;

    /// Reads one committed entity (or the engine's transaction view).
    ///
    /// # Errors
    /// - `NotFound` when the identity is absent.
    fn get(&self, id: EntityId) -> RepoResult<E>;

    /// Buffers a wholesale replacement of an existing entity.
    ///
    /// # Errors
    /// - `NotFound` when the identity is absent.
    fn update(&mut self, entity: &E) -> RepoResult<()>;

    /// Patches the named fields of an existing entity, keeping the rest.
    ///
    /// # Errors
    /// - `InvalidField` for undeclared or ill-typed changes, checked before
    ///   the backend is read.
    /// - `NotFound` when the identity is absent.
    fn update_attrs(&mut self, id: EntityId, changes: &[(&str, FieldValue)]) -> RepoResult<()> {
        let changes = E::schema().validate_changes(changes)?;
        let current = self.get_for_update(id)?;
        let mut record = Record::from_entity(&current)?;
        for (name, value) in changes {
            record.set(name, value);
        }
        self.update(&record.to_entity()?)
    }

    /// Buffers removal of an entity; absent identities are a no-op.
    fn delete(&mut self, id: EntityId) -> RepoResult<()>;

    /// Makes buffered writes durable/shared.
    fn commit(&mut self) -> RepoResult<()>;

    /// Discards buffered writes.
    fn rollback(&mut self) -> RepoResult<()>;

    /// Number of writes buffered since the last commit or rollback.
    fn pending_len(&self) -> usize;

    /// Fresh, unfiltered query over this repository's backend view.
    fn objects(&self) -> Query<E, Self::Executor>;

    /// Current value as seen by this scope, including its own buffered
    /// writes. Used as the base of `update_attrs`.
    fn get_for_update(&self, id: EntityId) -> RepoResult<E> {
        self.get(id)
    }
}
