//! Single-file persisted entity backend.
//!
//! # Responsibility
//! - Persist every table of one database as a JSON map in a single file.
//! - Re-read the file on every backend access; nothing is held resident.
//!
//! # Invariants
//! - Commits rewrite the file through a temp file + rename, so readers see
//!   either the old or the new contents.
//! - There is no locking: concurrent writers to one file are the caller's
//!   responsibility.

use crate::model::record::Record;
use crate::model::schema::{EntityId, EntitySchema};
use crate::repo::buffered::{BufferedRepository, PendingWrite, Table, TableStore};
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

const BACKEND_NAME: &str = "File";

/// Repository scope over a single persisted file.
pub type FileRepository<E> = BufferedRepository<E, FileDatabase>;

/// On-disk layout: table name -> entity id -> serialized entity.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FileContents {
    #[serde(default)]
    tables: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

/// Handle on one database file.
#[derive(Debug, Clone)]
pub struct FileDatabase {
    path: PathBuf,
}

impl FileDatabase {
    /// Opens `path`, creating an empty database file when missing.
    ///
    /// # Side effects
    /// - Creates parent directories and the file itself on first use.
    /// - Emits `file_db_open` logging events.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let db = Self {
            path: path.as_ref().to_path_buf(),
        };

        if !db.path.exists() {
            if let Some(parent) = db.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            db.write_contents(&FileContents::default())?;
        }

        info!(
            "event=file_db_open module=repo status=ok backend={} path={}",
            BACKEND_NAME,
            db.path.display()
        );
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the file with no tables.
    pub fn clear(&self) -> RepoResult<()> {
        self.write_contents(&FileContents::default())
    }

    fn read_contents(&self) -> RepoResult<FileContents> {
        let started_at = Instant::now();
        let bytes = std::fs::read(&self.path)?;
        let contents = if bytes.is_empty() {
            FileContents::default()
        } else {
            serde_json::from_slice(&bytes)?
        };
        debug!(
            "event=file_db_read module=repo status=ok path={} bytes={} duration_ms={}",
            self.path.display(),
            bytes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(contents)
    }

    fn write_contents(&self, contents: &FileContents) -> RepoResult<()> {
        let started_at = Instant::now();
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let result = (|| -> RepoResult<()> {
            let mut staged = NamedTempFile::new_in(directory)?;
            serde_json::to_writer(&mut staged, contents)?;
            staged.flush()?;
            staged
                .persist(&self.path)
                .map_err(|err| RepoError::Io(err.error))?;
            Ok(())
        })();

        match &result {
            Ok(()) => debug!(
                "event=file_db_write module=repo status=ok path={} duration_ms={}",
                self.path.display(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=file_db_write module=repo status=error path={} duration_ms={} error={}",
                self.path.display(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

impl TableStore for FileDatabase {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn load(&self, schema: &EntitySchema) -> RepoResult<Table> {
        let mut contents = self.read_contents()?;
        let Some(raw) = contents.tables.remove(schema.table) else {
            return Ok(Table::new());
        };

        raw.values()
            .map(|value| -> RepoResult<(EntityId, Record)> {
                let record = Record::from_json(schema, value)?;
                Ok((record.id(schema)?, record))
            })
            .collect()
    }

    fn apply(&self, schema: &EntitySchema, writes: &[PendingWrite]) -> RepoResult<()> {
        let mut contents = self.read_contents()?;
        let raw = contents.tables.entry(schema.table.to_string()).or_default();
        for write in writes {
            let key = write.id().to_string();
            write.check(raw.contains_key(&key))?;
            match write.record() {
                Some(record) => {
                    raw.insert(key, record.to_json());
                }
                None => {
                    raw.remove(&key);
                }
            }
        }
        self.write_contents(&contents)
    }
}
