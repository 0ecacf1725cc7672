//! Shared application state for the HTTP layer.
//!
//! Holds paths only. Every request opens its own SQLite connection through
//! `open_db`, so no connection is ever shared between workers.

use std::path::PathBuf;

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::{self, DatabaseError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct CoreState {
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl CoreState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            db_path: config.database_path(),
            uploads_dir: config.uploads_dir(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Create the data directories and bring the schema up to date.
    pub fn initialize(&self) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.uploads_dir)?;
        let conn = db::open_database(&self.db_path)?;
        let schema_version = db::schema_version(&conn)?;
        tracing::info!(path = %self.db_path.display(), schema_version, "Database ready");
        Ok(())
    }

    /// Open a fresh connection for one request.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        Ok(db::open_database(&self.db_path)?)
    }
}
