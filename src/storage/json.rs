//! Single-document JSON backend.
//!
//! The document is a JSON array of incidents. Writes go to a temporary file
//! in the same directory which is synced and renamed over the target, so a
//! reader never sees a half-written document.
//!
//! The ID high-water mark lives in a `<path>.meta` sidecar. It is written
//! before the document, and only ever grows, so a crash between the two
//! renames can leave it ahead of the document but never behind.

use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PersistError, Snapshot, SnapshotBackend};
use crate::incident::Incident;

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    next_id: u64,
}

pub struct JsonFileBackend {
    path: PathBuf,
    meta_path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut meta = path.clone().into_os_string();
        meta.push(".meta");
        Self {
            path,
            meta_path: PathBuf::from(meta),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    fn load_next_id(&self) -> Result<Option<u64>, PersistError> {
        match fs::File::open(&self.meta_path) {
            Ok(f) => {
                let meta: Meta = serde_json::from_reader(BufReader::new(f))?;
                Ok(Some(meta.next_id))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `value` as pretty JSON to `target` through a synced temp file in `dir`.
fn write_atomic<T: Serialize + ?Sized>(
    dir: &Path,
    target: &Path,
    value: &T,
) -> Result<(), PersistError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
    tmp.as_file_mut().write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}

impl SnapshotBackend for JsonFileBackend {
    fn load(&self) -> Result<Snapshot, PersistError> {
        let next_id = self.load_next_id()?;
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no incident document yet");
                return Ok(Snapshot {
                    incidents: Vec::new(),
                    next_id,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let incidents: Vec<Incident> = serde_json::from_reader(BufReader::new(file))?;
        Ok(Snapshot { incidents, next_id })
    }

    fn persist(&self, incidents: &[Incident], next_id: u64) -> Result<(), PersistError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        write_atomic(&dir, &self.meta_path, &Meta { next_id })?;
        write_atomic(&dir, &self.path, incidents)?;

        debug!(path = %self.path.display(), count = incidents.len(), next_id, "incident document written");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
