//! Process-shared in-memory entity backend.
//!
//! # Responsibility
//! - Hold committed tables in one shared registry per `MemoryDatabase`.
//! - Let every repository on the same handle see commits immediately.
//!
//! # Invariants
//! - Clones of a `MemoryDatabase` address the same registry.
//! - `clear` is the only way to reset the registry; independent runs
//!   (tests, long-lived processes) must call it explicitly.

use crate::model::record::Record;
use crate::model::schema::{EntityId, EntitySchema};
use crate::repo::buffered::{BufferedRepository, PendingWrite, Table, TableStore};
use crate::repo::error::RepoResult;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

const BACKEND_NAME: &str = "InMemory";

/// Repository scope over a shared in-memory registry.
pub type MemoryRepository<E> = BufferedRepository<E, MemoryDatabase>;

/// Shared registry of committed tables, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<HashMap<&'static str, Table>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every table.
    pub fn clear(&self) {
        let mut tables = self.write_tables();
        let dropped = tables.len();
        tables.clear();
        info!(
            "event=memory_db_clear module=repo status=ok backend={} tables={}",
            BACKEND_NAME, dropped
        );
    }

    /// Number of committed rows in `table`.
    pub fn table_len(&self, table: &str) -> usize {
        self.read_tables().get(table).map_or(0, Table::len)
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, HashMap<&'static str, Table>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, HashMap<&'static str, Table>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TableStore for MemoryDatabase {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn load(&self, schema: &EntitySchema) -> RepoResult<Table> {
        Ok(self
            .read_tables()
            .get(schema.table)
            .cloned()
            .unwrap_or_default())
    }

    fn find(&self, schema: &EntitySchema, id: EntityId) -> RepoResult<Option<Record>> {
        Ok(self
            .read_tables()
            .get(schema.table)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    fn apply(&self, schema: &EntitySchema, writes: &[PendingWrite]) -> RepoResult<()> {
        let mut tables = self.write_tables();
        let table = tables.entry(schema.table).or_default();
        let mut staged = table.clone();
        for write in writes {
            write.apply(&mut staged)?;
        }
        *table = staged;
        Ok(())
    }
}
