//! Process-local blob adapter, mainly for tests.

use super::{check_key, read_all, BlobError, BlobResult, BlobStorage};
use bytes::Bytes;
use log::debug;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};

const BACKEND_NAME: &str = "InMemory";

/// Shared map of blobs; clones address the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStorage {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every blob.
    pub fn clear(&self) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl BlobStorage for MemoryBlobStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn write(&self, key: &str, data: &mut dyn Read) -> BlobResult<()> {
        check_key(key)?;
        let bytes = read_all(data)?;
        debug!(
            "event=blob_write module=blob status=ok backend={} key={} bytes={}",
            BACKEND_NAME,
            key,
            bytes.len()
        );
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes);
        Ok(())
    }

    fn read(&self, key: &str) -> BlobResult<Bytes> {
        check_key(key)?;
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> BlobResult<()> {
        check_key(key)?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
