//! SQLite-backed key-value store for calibration profiles and metric config.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use vigor_core::{KeyValueStore, VigorError};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

fn storage_err(e: rusqlite::Error) -> VigorError {
    VigorError::Storage(e.to_string())
}

impl SqliteStore {
    pub fn default_db_path() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            std::env::var_os("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Lattice Labs")
                .join("Vigor")
                .join("vigor.db")
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var_os("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    std::env::var_os("HOME")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("/tmp"))
                        .join(".local")
                        .join("share")
                })
                .join("vigor")
                .join("vigor.db")
        }
    }

    pub fn new(db_path: PathBuf) -> vigor_core::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> vigor_core::Result<Connection> {
        Connection::open(&self.db_path).map_err(storage_err)
    }

    fn init_schema(&self) -> vigor_core::Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS kv (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(storage_err)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> vigor_core::Result<Option<String>> {
        let conn = self.open()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(storage_err)
    }

    fn set(&self, key: &str, value: &str) -> vigor_core::Result<()> {
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> vigor_core::Result<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(storage_err)?;
        Ok(())
    }
}
