//! Durable storage for the incident log.
//!
//! A backend stores the full incident collection as one snapshot and
//! rewrites it atomically on every mutation.

pub mod json;
pub mod schema;
pub mod sqlite;

use thiserror::Error;

use crate::config::{StorageBackendKind, StorageConfig};
use crate::incident::Incident;

pub use self::json::JsonFileBackend;
pub use self::sqlite::SqliteBackend;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid incident document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// What a backend hands back on load.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub incidents: Vec<Incident>,
    /// Persisted ID high-water mark, for backends that keep one.
    pub next_id: Option<u64>,
}

/// A place the incident collection can be loaded from and rewritten to.
pub trait SnapshotBackend: Send + Sync {
    /// Load the stored collection, or an empty snapshot if nothing is stored yet.
    fn load(&self) -> Result<Snapshot, PersistError>;

    /// Replace the stored collection with `incidents`. Must be all-or-nothing.
    fn persist(&self, incidents: &[Incident], next_id: u64) -> Result<(), PersistError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Open the backend selected by the storage configuration.
pub fn open_backend(config: &StorageConfig) -> Result<Box<dyn SnapshotBackend>, PersistError> {
    match config.backend {
        StorageBackendKind::Json => Ok(Box::new(JsonFileBackend::new(&config.path))),
        StorageBackendKind::Sqlite => Ok(Box::new(SqliteBackend::open(&config.path)?)),
    }
}
