// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message stores for the wapipe queue.
//!
//! [`SqliteStore`] is the durable store, [`InMemoryStore`] the in-process
//! one, and [`FallbackStore`] combines the two so a database outage degrades
//! to memory instead of failing enqueues.

pub mod database;
pub mod fallback;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use tracing::{info, warn};
use wapipe_config::StorageConfig;
use wapipe_core::{MessageStore, WapipeError};

pub use database::Database;
pub use fallback::FallbackStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Builds the store stack described by `config`.
///
/// With `durable` set, the SQLite store sits in front of an in-process
/// fallback. If the database cannot be opened at all, the service still
/// starts on memory alone.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn MessageStore>, WapipeError> {
    let memory: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
    if !config.durable {
        info!("durable storage disabled, using in-process store");
        return Ok(memory);
    }
    match SqliteStore::open(&config.database_path).await {
        Ok(sqlite) => {
            info!(path = %config.database_path, "SQLite message store ready");
            Ok(Arc::new(FallbackStore::new(Arc::new(sqlite), memory)))
        }
        Err(e) => {
            warn!(
                path = %config.database_path,
                error = %e,
                "cannot open SQLite message store, using in-process store"
            );
            Ok(memory)
        }
    }
}
