//! Key-addressed binary object storage.
//!
//! # Responsibility
//! - Define the blob contract shared by every adapter.
//! - Provide an in-memory adapter and an `object_store` adapter (S3 and
//!   friends).
//!
//! # Invariants
//! - `write` replaces any existing object under the key.
//! - `read` of an absent key is `BlobError::NotFound`.
//! - `delete` of an absent key succeeds.
//! - Keys are non-empty; adapters reject empty keys with `InvalidKey`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;

use bytes::Bytes;

mod memory;
mod remote;
mod runtime;

pub use memory::MemoryBlobStorage;
pub use remote::{ObjectStoreBlobStorage, S3BlobConfig};

pub type BlobResult<T> = Result<T, BlobError>;

#[derive(Debug)]
pub enum BlobError {
    NotFound(String),
    InvalidKey { key: String, reason: String },
    Io(std::io::Error),
    ObjectStore(object_store::Error),
    /// The async runtime driving a remote call could not be started or
    /// its worker thread panicked.
    Runtime(String),
}

impl Display for BlobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "blob not found: {key}"),
            Self::InvalidKey { key, reason } => write!(f, "invalid blob key `{key}`: {reason}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::ObjectStore(err) => write!(f, "{err}"),
            Self::Runtime(message) => write!(f, "blob runtime error: {message}"),
        }
    }
}

impl Error for BlobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::ObjectStore(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BlobError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Binary object store addressed by string keys.
pub trait BlobStorage {
    /// Name used in logs and diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Streams `data` to completion and stores it under `key`.
    fn write(&self, key: &str, data: &mut dyn Read) -> BlobResult<()>;

    fn read(&self, key: &str) -> BlobResult<Bytes>;

    fn delete(&self, key: &str) -> BlobResult<()>;

    fn exists(&self, key: &str) -> BlobResult<bool> {
        match self.read(key) {
            Ok(_) => Ok(true),
            Err(BlobError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Convenience for callers that already hold the whole payload.
    fn write_bytes(&self, key: &str, data: &[u8]) -> BlobResult<()> {
        let mut reader = data;
        self.write(key, &mut reader)
    }
}

pub(crate) fn check_key(key: &str) -> BlobResult<()> {
    if key.is_empty() {
        return Err(BlobError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn read_all(data: &mut dyn Read) -> BlobResult<Bytes> {
    let mut buffer = Vec::new();
    data.read_to_end(&mut buffer)?;
    Ok(Bytes::from(buffer))
}
