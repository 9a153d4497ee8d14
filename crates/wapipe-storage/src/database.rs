// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and schema.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use tokio_rusqlite::Connection;
use tracing::debug;
use wapipe_core::WapipeError;

const SCHEMA: &str = include_str!("schema.sql");

/// Maps any tokio-rusqlite error into a storage error.
pub(crate) fn map_tr_err<E: std::fmt::Display>(err: E) -> WapipeError {
    WapipeError::Storage {
        source: err.to_string().into(),
    }
}

/// An open SQLite database with the message schema applied.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &str) -> Result<Self, WapipeError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(WapipeError::storage)?;
        }
        let conn = Connection::open(path).await.map_err(map_tr_err)?;
        let db = Self { conn };
        db.prepare().await?;
        debug!(path, "database opened");
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self, WapipeError> {
        let conn = Connection::open_in_memory().await.map_err(map_tr_err)?;
        let db = Self { conn };
        db.prepare().await?;
        Ok(db)
    }

    async fn prepare(&self) -> Result<(), WapipeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.busy_timeout(Duration::from_secs(5))?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoints the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), WapipeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
