//! LNXDrive Cache - Local state persistence
//!
//! SQLite-based cache for:
//! - File metadata and sync state
//! - Delta tokens
//! - Account information
//! - Audit trail

mod pool;
mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteStateRepository;

/// Errors that can occur within the cache/persistence layer
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to open or connect to the underlying SQLite database
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to apply schema migrations
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Failed to serialize or deserialize a stored value
    #[error("serialization error: {0}")]
    SerializationError(String),
}
