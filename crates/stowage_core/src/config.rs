//! Typed store configuration.
//!
//! # Responsibility
//! - Describe which entity backend, blob backend and logging setup a host
//!   wants, as one JSON document.
//! - Reject obviously unusable settings before anything is opened.
//!
//! Opening the configured backends stays with the caller; this module only
//! owns the shape and its validation.

use crate::blob::S3BlobConfig;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid { field, reason } => write!(f, "invalid config `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Where entities live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EntityBackendConfig {
    Memory,
    File { path: PathBuf },
    /// `path: None` opens a private in-memory SQLite database.
    Sqlite {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl Default for EntityBackendConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Where blobs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BlobBackendConfig {
    Memory,
    S3(S3BlobConfig),
}

impl Default for BlobBackendConfig {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    pub dir: PathBuf,
    #[serde(default)]
    pub mirror_to_stderr: bool,
}

fn default_level() -> String {
    logging::default_log_level().to_string()
}

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub entities: EntityBackendConfig,
    #[serde(default)]
    pub blobs: BlobBackendConfig,
    /// File logging stays off when absent.
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl StoreConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.entities {
            EntityBackendConfig::File { path } if path.as_os_str().is_empty() => {
                return Err(invalid("entities.path", "must not be empty"));
            }
            EntityBackendConfig::Sqlite { path: Some(path) } if path.as_os_str().is_empty() => {
                return Err(invalid("entities.path", "must not be empty; omit it for in-memory"));
            }
            _ => {}
        }

        if let BlobBackendConfig::S3(s3) = &self.blobs {
            if s3.bucket.trim().is_empty() {
                return Err(invalid("blobs.bucket", "must not be empty"));
            }
            if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                return Err(invalid(
                    "blobs.secret_access_key",
                    "access key id and secret must be set together",
                ));
            }
        }

        if let Some(logging) = &self.logging {
            if !logging::is_supported_level(&logging.level) {
                return Err(invalid(
                    "logging.level",
                    format!("unsupported level `{}`", logging.level),
                ));
            }
            if !logging.dir.is_absolute() {
                return Err(invalid("logging.dir", "must be an absolute path"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::{BlobBackendConfig, ConfigError, EntityBackendConfig, StoreConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_document_means_all_in_memory() {
        let config = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config.entities, EntityBackendConfig::Memory);
        assert_eq!(config.blobs, BlobBackendConfig::Memory);
        assert!(config.logging.is_none());
    }

    #[test]
    fn parses_every_section() {
        let config = StoreConfig::from_json_str(
            r#"{
                "entities": {"backend": "sqlite", "path": "/var/lib/app/store.sqlite3"},
                "blobs": {"backend": "s3", "bucket": "media", "endpoint": "http://minio:9000", "allow_http": true},
                "logging": {"level": "WARN", "dir": "/var/log/app"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.entities,
            EntityBackendConfig::Sqlite {
                path: Some(PathBuf::from("/var/lib/app/store.sqlite3"))
            }
        );
        let BlobBackendConfig::S3(s3) = &config.blobs else {
            panic!("expected s3 blobs, got {:?}", config.blobs);
        };
        assert_eq!(s3.bucket, "media");
        assert!(s3.allow_http);
        assert_eq!(config.logging.unwrap().level, "WARN");
    }

    #[test]
    fn rejects_unusable_values() {
        for raw in [
            r#"{"entities": {"backend": "file", "path": ""}}"#,
            r#"{"blobs": {"backend": "s3", "bucket": " "}}"#,
            r#"{"blobs": {"backend": "s3", "bucket": "b", "access_key_id": "id"}}"#,
            r#"{"logging": {"level": "chatty", "dir": "/tmp/logs"}}"#,
            r#"{"logging": {"dir": "relative/logs"}}"#,
        ] {
            assert!(
                matches!(StoreConfig::from_json_str(raw), Err(ConfigError::Invalid { .. })),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        assert!(matches!(
            StoreConfig::from_json_str(r#"{"entities": {"backend": "redis"}}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stowage.json");
        std::fs::write(&path, r#"{"entities": {"backend": "file", "path": "data.json"}}"#)
            .unwrap();

        let config = StoreConfig::from_path(&path).unwrap();
        assert_eq!(
            config.entities,
            EntityBackendConfig::File {
                path: PathBuf::from("data.json")
            }
        );
        assert!(matches!(
            StoreConfig::from_path(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
