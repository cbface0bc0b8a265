//! Write operation serialization.
//!
//! Provides `WriteSerializer` to serialize concurrent writes to the same file
//! through SQLite, ensuring data consistency and proper conflict detection.

use chrono::{DateTime, Utc};
use lnxdrive_cache::{pool::DatabasePool, repository::SqliteStateRepository};
use lnxdrive_core::{
    domain::{newtypes::UniqueId, sync_item::{ItemState, PinPolicy}, SyncItem},
    ports::IStateRepository,
};
use tokio::sync::{mpsc, oneshot};

use crate::error::FuseError;

/// Result type for write operations
pub type Result<T> = std::result::Result<T, FuseError>;

// ============================================================================
// WriteOp enum
// ============================================================================

/// Write operations that can be serialized through the WriteSerializer
///
/// Each variant carries the data needed for the operation plus a oneshot
/// sender for returning the result to the caller.
#[derive(Debug)]
pub enum WriteOp {
    /// Update the state of a sync item
    UpdateState {
        item_id: UniqueId,
        state: ItemState,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Update the pin policy of a sync item, independent of its `ItemState`
    UpdatePin {
        item_id: UniqueId,
        pin: PinPolicy,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Update the inode number of a sync item
    UpdateInode {
        item_id: UniqueId,
        inode: u64,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Update the last accessed timestamp of a sync item
    UpdateLastAccessed {
        item_id: UniqueId,
        accessed: DateTime<Utc>,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Update the hydration progress percentage of a sync item
    UpdateHydrationProgress {
        item_id: UniqueId,
        progress: Option<u8>,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Increment the inode counter and return the next available inode
    IncrementInodeCounter { reply: oneshot::Sender<Result<u64>> },

    /// Save a new sync item to the database
    SaveItem {
        item: Box<SyncItem>,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Delete a sync item from the database
    DeleteItem {
        item_id: UniqueId,
        reply: oneshot::Sender<Result<()>>,
    },
}

// ============================================================================
// WriteSerializerHandle
// ============================================================================

/// Handle for sending write operations to the WriteSerializer
///
/// This handle can be cloned and shared across multiple tasks.
/// All operations are processed sequentially by the WriteSerializer task.
#[derive(Clone)]
pub struct WriteSerializerHandle {
    tx: mpsc::Sender<WriteOp>,
}

impl WriteSerializerHandle {
    /// Sends a write operation to update an item's state
    ///
    /// Returns when the operation has been processed by the serializer.
    pub async fn update_state(&self, item_id: UniqueId, state: ItemState) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::UpdateState {
            item_id,
            state,
            reply: tx,
        };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }

    /// Sends a write operation to update an item's pin policy
    ///
    /// Returns when the operation has been processed by the serializer.
    pub async fn update_pin(&self, item_id: UniqueId, pin: PinPolicy) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::UpdatePin {
            item_id,
            pin,
            reply: tx,
        };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }

    /// Sends a write operation to update an item's inode
    ///
    /// Returns when the operation has been processed by the serializer.
    pub async fn update_inode(&self, item_id: UniqueId, inode: u64) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::UpdateInode {
            item_id,
            inode,
            reply: tx,
        };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }

    /// Sends a write operation to update an item's last accessed timestamp
    ///
    /// Returns when the operation has been processed by the serializer.
    pub async fn update_last_accessed(
        &self,
        item_id: UniqueId,
        accessed: DateTime<Utc>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::UpdateLastAccessed {
            item_id,
            accessed,
            reply: tx,
        };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }

    /// Sends a write operation to update an item's hydration progress
    ///
    /// Returns when the operation has been processed by the serializer.
    pub async fn update_hydration_progress(
        &self,
        item_id: UniqueId,
        progress: Option<u8>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::UpdateHydrationProgress {
            item_id,
            progress,
            reply: tx,
        };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }

    /// Allocates a new inode number by incrementing the counter
    ///
    /// Returns the newly allocated inode number.
    pub async fn increment_inode_counter(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::IncrementInodeCounter { reply: tx };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }

    /// Saves a new sync item to the database
    ///
    /// Returns when the operation has been processed by the serializer.
    pub async fn save_item(&self, item: SyncItem) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::SaveItem {
            item: Box::new(item),
            reply: tx,
        };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }

    /// Deletes a sync item from the database
    ///
    /// Returns when the operation has been processed by the serializer.
    pub async fn delete_item(&self, item_id: UniqueId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let op = WriteOp::DeleteItem { item_id, reply: tx };

        self.tx.send(op).await.map_err(|_| {
            FuseError::DatabaseError("WriteSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| FuseError::DatabaseError("WriteSerializer response lost".to_string()))?
    }
}

// ============================================================================
// WriteSerializer
// ============================================================================

/// Serializes write operations to SQLite to prevent SQLITE_BUSY errors
///
/// The WriteSerializer runs as a tokio task that processes write operations
/// sequentially from an mpsc channel. This ensures that all database writes
/// are serialized, preventing concurrent write contention in SQLite.
///
/// # Architecture
///
/// ```text
/// ┌─────────────┐      WriteOp      ┌──────────────────┐
/// │ FUSE thread │ ─────────────────► │ WriteSerializer  │
/// │   (caller)  │                    │      task        │
/// └─────────────┘                    └──────────────────┘
///       │                                      │
///       │          Result via oneshot          │
///       │ ◄────────────────────────────────────┤
///       │                                      │
///       │                                      ▼
///       │                             ┌─────────────────┐
///       │                             │ SqliteStateRepo │
///       │                             └─────────────────┘
/// ```
///
/// # Example
///
/// ```ignore
/// let pool = DatabasePool::new(db_path).await?;
/// let (serializer, handle) = WriteSerializer::new(pool);
///
/// // Spawn the serializer task
/// tokio::spawn(async move {
///     serializer.run().await;
/// });
///
/// // Use the handle to send operations
/// handle.update_state(item_id, ItemState::Hydrated).await?;
/// ```
pub struct WriteSerializer {
    rx: mpsc::Receiver<WriteOp>,
    repository: SqliteStateRepository,
}

impl WriteSerializer {
    /// Creates a new WriteSerializer with the given database pool
    ///
    /// Returns a tuple of:
    /// - The serializer itself (to be spawned as a task)
    /// - A handle for sending write operations
    ///
    /// The caller must spawn the serializer as a tokio task by calling `run()`.
    pub fn new(pool: DatabasePool) -> (Self, WriteSerializerHandle) {
        // Create an mpsc channel for write operations
        // Buffer size of 100 allows reasonable batching without excessive memory use
        let (tx, rx) = mpsc::channel(100);

        let repository = SqliteStateRepository::new(pool.pool().clone());

        let serializer = Self { rx, repository };
        let handle = WriteSerializerHandle { tx };

        (serializer, handle)
    }

    /// Runs the write serializer loop
    ///
    /// This method processes write operations from the channel sequentially,
    /// ensuring no concurrent writes to SQLite. It runs until the channel
    /// is closed (all senders are dropped).
    ///
    /// # Panics
    ///
    /// This method should not panic under normal circumstances. If a database
    /// operation fails, the error is sent back to the caller via the oneshot
    /// channel rather than panicking.
    pub async fn run(mut self) {
        tracing::info!("WriteSerializer task started");

        while let Some(op) = self.rx.recv().await {
            self.process_operation(op).await;
        }

        tracing::info!("WriteSerializer task stopped (all senders dropped)");
    }

    /// Processes a single write operation
    ///
    /// Executes the operation using the repository and sends the result
    /// back to the caller via the oneshot channel.
    async fn process_operation(&self, op: WriteOp) {
        match op {
            WriteOp::UpdateState {
                item_id,
                state,
                reply,
            } => {
                tracing::trace!(?item_id, ?state, "Processing UpdateState");

                // Get the item, update its state, and save it back
                let result = async {
                    let item = self
                        .repository
                        .get_item(&item_id)
                        .await
                        .map_err(|e| FuseError::DatabaseError(e.to_string()))?
                        .ok_or_else(|| {
                            FuseError::NotFound(format!("Item not found: {}", item_id))
                        })?;

                    // Create a new item with updated state
                    let mut updated_item = item;
                    updated_item
                        .transition_to(state)
                        .map_err(|e| FuseError::InvalidArgument(e.to_string()))?;

                    self.repository
                        .save_item(&updated_item)
                        .await
                        .map_err(|e| FuseError::DatabaseError(e.to_string()))?;

                    Ok(())
                }
                .await;

                let _ = reply.send(result);
            }

            WriteOp::UpdatePin { item_id, pin, reply } => {
                tracing::trace!(?item_id, ?pin, "Processing UpdatePin");

                let result = async {
                    let mut item = self
                        .repository
                        .get_item(&item_id)
                        .await
                        .map_err(|e| FuseError::DatabaseError(e.to_string()))?
                        .ok_or_else(|| {
                            FuseError::NotFound(format!("Item not found: {}", item_id))
                        })?;

                    item.set_pin(pin);

                    self.repository
                        .save_item(&item)
                        .await
                        .map_err(|e| FuseError::DatabaseError(e.to_string()))?;

                    Ok(())
                }
                .await;

                let _ = reply.send(result);
            }

            WriteOp::UpdateInode {
                item_id,
                inode,
                reply,
            } => {
                tracing::trace!(?item_id, inode, "Processing UpdateInode");

                let result = self
                    .repository
                    .update_inode(&item_id, inode)
                    .await
                    .map_err(|e| FuseError::DatabaseError(e.to_string()));

                let _ = reply.send(result);
            }

            WriteOp::UpdateLastAccessed {
                item_id,
                accessed,
                reply,
            } => {
                tracing::trace!(?item_id, ?accessed, "Processing UpdateLastAccessed");

                let result = self
                    .repository
                    .update_last_accessed(&item_id, accessed)
                    .await
                    .map_err(|e| FuseError::DatabaseError(e.to_string()));

                let _ = reply.send(result);
            }

            WriteOp::UpdateHydrationProgress {
                item_id,
                progress,
                reply,
            } => {
                tracing::trace!(?item_id, ?progress, "Processing UpdateHydrationProgress");

                let result = self
                    .repository
                    .update_hydration_progress(&item_id, progress)
                    .await
                    .map_err(|e| FuseError::DatabaseError(e.to_string()));

                let _ = reply.send(result);
            }

            WriteOp::IncrementInodeCounter { reply } => {
                tracing::trace!("Processing IncrementInodeCounter");

                let result = self
                    .repository
                    .get_next_inode()
                    .await
                    .map_err(|e| FuseError::DatabaseError(e.to_string()));

                let _ = reply.send(result);
            }

            WriteOp::SaveItem { item, reply } => {
                tracing::trace!(item_id = ?item.id(), "Processing SaveItem");

                let result = self
                    .repository
                    .save_item(&item)
                    .await
                    .map_err(|e| FuseError::DatabaseError(e.to_string()));

                let _ = reply.send(result);
            }

            WriteOp::DeleteItem { item_id, reply } => {
                tracing::trace!(?item_id, "Processing DeleteItem");

                let result = self
                    .repository
                    .delete_item(&item_id)
                    .await
                    .map_err(|e| FuseError::DatabaseError(e.to_string()));

                let _ = reply.send(result);
            }
        }
    }
}
