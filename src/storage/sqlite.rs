//! SQLite backend.
//!
//! Each incident is stored as its JSON object keyed by ID. A persist
//! rewrites the table and the ID high-water mark in one transaction.

use std::path::{Path, PathBuf};

use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use super::{schema, PersistError, Snapshot, SnapshotBackend};
use crate::incident::Incident;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

const NEXT_ID_KEY: &str = "next_id";

pub struct SqliteBackend {
    pool: Pool,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let manager = SqliteConnectionManager::file(&path).with_init(|c| {
            c.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = FULL;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = R2D2Pool::new(manager)?;

        let conn = pool.get()?;
        schema::migrate(&conn)?;

        Ok(Self { pool, path })
    }
}

impl SnapshotBackend for SqliteBackend {
    fn load(&self) -> Result<Snapshot, PersistError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare("SELECT incident_json FROM incidents ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut incidents = Vec::new();
        for row in rows {
            incidents.push(serde_json::from_str::<Incident>(&row?)?);
        }

        let next_id: Option<i64> = conn
            .query_row(
                "SELECT value FROM incident_meta WHERE key = ?1",
                [NEXT_ID_KEY],
                |row| row.get(0),
            )
            .optional()?;

        Ok(Snapshot {
            incidents,
            next_id: next_id.map(|v| v as u64),
        })
    }

    fn persist(&self, incidents: &[Incident], next_id: u64) -> Result<(), PersistError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM incidents", [])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO incidents (id, incident_json) VALUES (?1, ?2)")?;
            for incident in incidents {
                let json = serde_json::to_string(incident)?;
                insert.execute(params![incident.id as i64, json])?;
            }
        }
        tx.execute(
            "INSERT INTO incident_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![NEXT_ID_KEY, next_id as i64],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
