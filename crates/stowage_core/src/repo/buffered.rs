//! Write-buffering repository over whole-table stores.
//!
//! # Responsibility
//! - Hold a scope's pending writes until `commit`.
//! - Evaluate queries by scanning a full table snapshot.
//!
//! # Invariants
//! - Reads (`get`, queries) only see committed state.
//! - Existence checks for writes see committed state overlaid with this
//!   scope's own pending writes.
//! - Pending writes are applied in the order they were issued, all or
//!   none, and are re-checked against the committed state at commit.

use crate::model::record::Record;
use crate::model::schema::{Entity, EntityId, EntitySchema};
use crate::query::{scan, Query, QueryExecutor, QuerySpec};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::EntityRepository;
use log::info;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// One table's committed records keyed by identity.
pub type Table = BTreeMap<EntityId, Record>;

/// Buffered mutation waiting for `commit`.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Insert(EntityId, Record),
    /// Full replacement of an existing record.
    Update(EntityId, Record),
    Delete(EntityId),
}

impl PendingWrite {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Insert(id, _) | Self::Update(id, _) | Self::Delete(id) => *id,
        }
    }

    /// Record this write leaves behind, `None` for deletes.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Insert(_, record) | Self::Update(_, record) => Some(record),
            Self::Delete(_) => None,
        }
    }

    /// Re-checks this write against the committed state at apply time.
    ///
    /// Another scope may have committed since the write was buffered.
    pub fn check(&self, present: bool) -> RepoResult<()> {
        match self {
            Self::Insert(id, _) if present => Err(RepoError::AlreadyExists(*id)),
            Self::Update(id, _) if !present => Err(RepoError::not_found(*id)),
            _ => Ok(()),
        }
    }

    /// Applies this write to a table snapshot.
    pub fn apply(&self, table: &mut Table) -> RepoResult<()> {
        let id = self.id();
        self.check(table.contains_key(&id))?;
        match self.record() {
            Some(record) => {
                table.insert(id, record.clone());
            }
            None => {
                table.remove(&id);
            }
        }
        Ok(())
    }
}

/// Storage that loads and rewrites whole tables.
///
/// Handles are cheap to clone and address shared state.
pub trait TableStore: Clone {
    fn backend_name(&self) -> &'static str;

    /// Returns a snapshot of the committed table; missing tables are empty.
    fn load(&self, schema: &EntitySchema) -> RepoResult<Table>;

    /// Returns one committed record.
    fn find(&self, schema: &EntitySchema, id: EntityId) -> RepoResult<Option<Record>> {
        Ok(self.load(schema)?.remove(&id))
    }

    /// Applies `writes` in order as one unit.
    ///
    /// # Errors
    /// - `AlreadyExists` / `NotFound` when a write no longer fits the
    ///   committed state; nothing is applied then.
    fn apply(&self, schema: &EntitySchema, writes: &[PendingWrite]) -> RepoResult<()>;
}

/// Query executor scanning a `TableStore` snapshot.
#[derive(Debug, Clone)]
pub struct TableExecutor<S: TableStore> {
    store: S,
}

impl<S: TableStore> TableExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<E: Entity, S: TableStore> QueryExecutor<E> for TableExecutor<S> {
    fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    fn fetch(&self, spec: &QuerySpec) -> RepoResult<Vec<E>> {
        let table = self.store.load(spec.schema)?;
        scan::execute(spec, table.into_values())
            .iter()
            .map(Record::to_entity::<E>)
            .collect()
    }

    fn count(&self, spec: &QuerySpec) -> RepoResult<usize> {
        let table = self.store.load(spec.schema)?;
        Ok(scan::count(spec, table.values()))
    }
}

/// Repository scope over a `TableStore` with a private write buffer.
pub struct BufferedRepository<E: Entity, S: TableStore> {
    store: S,
    pending: Vec<PendingWrite>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: TableStore> BufferedRepository<E, S> {
    /// Opens a scope on `store`.
    ///
    /// # Errors
    /// - `InvalidSchema` when `E`'s identity field is not a required uuid.
    pub fn open(store: &S) -> RepoResult<Self> {
        E::schema().id_descriptor()?;
        Ok(Self {
            store: store.clone(),
            pending: Vec::new(),
            _entity: PhantomData,
        })
    }

    /// Latest state of `id` as seen by this scope.
    fn visible(&self, id: EntityId) -> RepoResult<Option<Record>> {
        match self.pending.iter().rev().find(|write| write.id() == id) {
            Some(write) => Ok(write.record().cloned()),
            None => self.store.find(E::schema(), id),
        }
    }

    fn log_scope_event(&self, event: &str, status: &str, writes: usize) {
        info!(
            "event={} module=repo status={} backend={} table={} writes={}",
            event,
            status,
            self.store.backend_name(),
            E::schema().table,
            writes
        );
    }
}

impl<E: Entity, S: TableStore> EntityRepository<E> for BufferedRepository<E, S> {
    type Executor = TableExecutor<S>;

    fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    fn insert(&mut self, entity: &E) -> RepoResult<()> {
        let id = entity.id();
        if self.visible(id)?.is_some() {
            return Err(RepoError::AlreadyExists(id));
        }
        let record = Record::from_entity(entity)?;
        self.pending.push(PendingWrite::Insert(id, record));
        Ok(())
    }

    fn get(&self, id: EntityId) -> RepoResult<E> {
        self.store
            .find(E::schema(), id)?
            .ok_or_else(|| RepoError::not_found(id))?
            .to_entity()
    }

    fn update(&mut self, entity: &E) -> RepoResult<()> {
        let id = entity.id();
        if self.visible(id)?.is_none() {
            return Err(RepoError::not_found(id));
        }
        let record = Record::from_entity(entity)?;
        self.pending.push(PendingWrite::Update(id, record));
        Ok(())
    }

    fn delete(&mut self, id: EntityId) -> RepoResult<()> {
        self.pending.push(PendingWrite::Delete(id));
        Ok(())
    }

    fn commit(&mut self) -> RepoResult<()> {
        let writes = self.pending.len();
        if writes > 0 {
            if let Err(err) = self.store.apply(E::schema(), &self.pending) {
                self.log_scope_event("repo_commit", "error", writes);
                return Err(err);
            }
        }
        self.pending.clear();
        self.log_scope_event("repo_commit", "ok", writes);
        Ok(())
    }

    fn rollback(&mut self) -> RepoResult<()> {
        let writes = self.pending.len();
        self.pending.clear();
        self.log_scope_event("repo_rollback", "ok", writes);
        Ok(())
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn objects(&self) -> Query<E, Self::Executor> {
        Query::new(TableExecutor::new(self.store.clone()))
    }

    fn get_for_update(&self, id: EntityId) -> RepoResult<E> {
        self.visible(id)?
            .ok_or_else(|| RepoError::not_found(id))?
            .to_entity()
    }
}

impl<E: Entity, S: TableStore> Drop for BufferedRepository<E, S> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.log_scope_event("repo_scope_exit", "rolled_back", self.pending.len());
        }
    }
}
