//! Persistence layer for disciplined
//!
//! Provides single-value stores for state that must survive restarts:
//! - [`Codec`] describing how a value is written, read back, and defaulted
//! - [`FileStore`] keeping the value in a text file
//! - [`SqliteStore`] keeping the value in a keyed row of a SQLite table

mod codec;
mod file;
mod sqlite;
mod traits;

pub use codec::*;
pub use file::*;
pub use sqlite::*;
pub use traits::*;

use std::path::PathBuf;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to deserialize value stored in {location}")]
    Deserialize {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
