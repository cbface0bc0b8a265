//! SyncItem domain entity
//!
//! This module defines the SyncItem entity which represents a file or folder
//! being synchronized between local storage and a remote cloud drive using
//! the Files-On-Demand model.
//!
//! ## State Machine
//!
//! ```text
//!     ┌──────────┐    access     ┌───────────┐   complete   ┌───────────┐
//!     │  Ghost   │ ────────────► │ Hydrating │ ───────────► │ Hydrated  │
//!     │(placeholder)│            │(downloading)│            │ (local)   │
//!     └──────────┘               └───────────┘              └───────────┘
//!          ▲                                                     │
//!          │                                                     │
//!          │    dehydrate                              modify    │
//!          └─────────────────────────────────────────────────────┘
//!                                     │
//!                                     ▼
//!                              ┌────────────┐
//!                              │ DirtyLocal │ ──── conflict ───► Conflict
//!                              │  (dirty)   │
//!                              └────────────┘
//!                                     │
//!                                     │ sync
//!                                     ▼
//!                              ┌───────────┐
//!                              │ Hydrated  │
//!                              └───────────┘
//! ```
//!
//! Every state can transition to `DeletedLocal` except `Conflict`, which must
//! first resolve to `DirtyLocal` (keep local) or `Ghost` (keep remote). `Error`
//! is re-enterable from any state and can itself transition to any state as
//! part of the retry mechanism.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{FileHash, RemoteId, RemotePath, SyncPath, UniqueId};

// ============================================================================
// T025: ItemState enum
// ============================================================================

/// State of a sync item in the Files-On-Demand model
///
/// Represents the hydration state of a file, tracking whether content
/// is available locally or only in the cloud.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Metadata only, content exists only in the cloud (placeholder file)
    #[default]
    Ghost,
    /// Currently downloading content from the cloud
    Hydrating,
    /// Fully synced, content available locally
    Hydrated,
    /// Local changes pending upload to the cloud
    DirtyLocal,
    /// Marked for deletion locally, pending propagation
    DeletedLocal,
    /// Conflict detected between local and remote versions
    Conflict,
    /// Error state with reason
    Error(String),
}

impl ItemState {
    /// Returns true if this item is eligible for LRU dehydration.
    ///
    /// Only plain `Hydrated` content can be reclaimed; content pinned via
    /// `PinPolicy::Always` is held regardless of cache pressure and
    /// `DirtyLocal` content has local changes that have not reached the
    /// cloud yet.
    pub fn can_dehydrate(&self) -> bool {
        matches!(self, ItemState::Hydrated)
    }

    /// Returns true if the item content is available locally
    pub fn is_local(&self) -> bool {
        matches!(self, ItemState::Hydrated | ItemState::DirtyLocal)
    }

    /// Returns true if the item is only a placeholder
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ItemState::Ghost)
    }

    /// Returns true if the item is in an active transfer state
    pub fn is_transferring(&self) -> bool {
        matches!(self, ItemState::Hydrating)
    }

    /// Returns true if the item needs user attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, ItemState::Conflict | ItemState::Error(_))
    }

    /// Returns true if the item has pending changes to sync
    pub fn has_pending_changes(&self) -> bool {
        matches!(self, ItemState::DirtyLocal)
    }

    /// Returns the state name as a string (without error details)
    pub fn name(&self) -> &'static str {
        match self {
            ItemState::Ghost => "GHOST",
            ItemState::Hydrating => "HYDRATING",
            ItemState::Hydrated => "HYDRATED",
            ItemState::DirtyLocal => "DIRTY_LOCAL",
            ItemState::DeletedLocal => "DELETED_LOCAL",
            ItemState::Conflict => "CONFLICT",
            ItemState::Error(_) => "ERROR",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Ghost => write!(f, "ghost"),
            ItemState::Hydrating => write!(f, "hydrating"),
            ItemState::Hydrated => write!(f, "hydrated"),
            ItemState::DirtyLocal => write!(f, "dirty_local"),
            ItemState::DeletedLocal => write!(f, "deleted_local"),
            ItemState::Conflict => write!(f, "conflict"),
            ItemState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

// ============================================================================
// PinPolicy: user intent for whether an item should be hydrated ahead of need
// ============================================================================

/// User-expressed pinning policy for an item, independent of its current
/// `ItemState`. Pinning does not add a state of its own: an `Always`-pinned
/// item still moves through `Ghost`/`Hydrating`/`Hydrated` like any other
/// item, but the dehydration sweep skips it while hydrated (see
/// `ItemState::can_dehydrate`, which callers must combine with this policy).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinPolicy {
    /// No explicit preference; follows the tree's default overlay/cache policy.
    #[default]
    Unset,
    /// Always keep hydrated; never dehydrated by the LRU sweep.
    Always,
    /// Never hydrate proactively; only hydrate on explicit read.
    Never,
    /// Hydrate opportunistically based on access patterns, subject to eviction.
    Smart,
}

// ============================================================================
// T026: ItemMetadata struct
// ============================================================================

/// Unix-style file permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Read permission
    pub read: bool,
    /// Write permission
    pub write: bool,
    /// Execute permission (for directories, this means list)
    pub execute: bool,
}

impl Permissions {
    /// Creates permissions with all flags set to true
    pub fn all() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
        }
    }

    /// Creates read-only permissions
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            execute: false,
        }
    }

    /// Creates permissions from a Unix mode (e.g., 0o644)
    pub fn from_mode(mode: u32) -> Self {
        Self {
            read: (mode & 0o400) != 0,
            write: (mode & 0o200) != 0,
            execute: (mode & 0o100) != 0,
        }
    }

    /// Converts to a Unix mode for the owner bits
    pub fn to_mode(&self) -> u32 {
        let mut mode = 0u32;
        if self.read {
            mode |= 0o400;
        }
        if self.write {
            mode |= 0o200;
        }
        if self.execute {
            mode |= 0o100;
        }
        mode
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::all()
    }
}

/// Metadata about a sync item
///
/// Contains file system metadata and remote-drive-specific information
/// needed for synchronization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Whether this item is a directory
    is_directory: bool,
    /// MIME type of the file (None for directories)
    mime_type: Option<String>,
    /// When the item was originally created
    created_at: DateTime<Utc>,
    /// ETag from the remote drive for optimistic concurrency control
    etag: Option<String>,
    /// File permissions
    permissions: Permissions,
}

impl ItemMetadata {
    /// Creates metadata for a file
    pub fn new_file(mime_type: Option<String>) -> Self {
        Self {
            is_directory: false,
            mime_type,
            created_at: Utc::now(),
            etag: None,
            permissions: Permissions::all(),
        }
    }

    /// Creates metadata for a directory
    pub fn new_directory() -> Self {
        Self {
            is_directory: true,
            mime_type: None,
            created_at: Utc::now(),
            etag: None,
            permissions: Permissions::all(),
        }
    }

    /// Creates metadata with all fields specified
    pub fn new(
        is_directory: bool,
        mime_type: Option<String>,
        created_at: DateTime<Utc>,
        etag: Option<String>,
        permissions: Permissions,
    ) -> Self {
        Self {
            is_directory,
            mime_type,
            created_at,
            etag,
            permissions,
        }
    }

    /// Returns true if this is a directory
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Returns the MIME type
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Returns when the item was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the ETag
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Returns the permissions
    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Sets the ETag
    pub fn set_etag(&mut self, etag: impl Into<String>) {
        self.etag = Some(etag.into());
    }

    /// Clears the ETag
    pub fn clear_etag(&mut self) {
        self.etag = None;
    }

    /// Sets the permissions
    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.permissions = permissions;
    }

    /// Sets the MIME type
    pub fn set_mime_type(&mut self, mime_type: Option<String>) {
        self.mime_type = mime_type;
    }
}

// ============================================================================
// T027: ErrorInfo struct
// ============================================================================

/// Information about an error that occurred during synchronization
///
/// Tracks error details and retry information for failed operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code for categorization (e.g., "NETWORK_ERROR", "AUTH_EXPIRED")
    code: String,
    /// Human-readable error message
    message: String,
    /// Number of retry attempts made
    retry_count: u32,
    /// When the last attempt was made
    last_attempt: DateTime<Utc>,
    /// When the next retry should be attempted (None if no retry scheduled)
    next_retry: Option<DateTime<Utc>>,
}

impl ErrorInfo {
    /// Creates a new ErrorInfo
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retry_count: 0,
            last_attempt: Utc::now(),
            next_retry: None,
        }
    }

    /// Creates an ErrorInfo with a scheduled retry
    pub fn with_retry(
        code: impl Into<String>,
        message: impl Into<String>,
        retry_delay: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            code: code.into(),
            message: message.into(),
            retry_count: 0,
            last_attempt: now,
            next_retry: Some(now + retry_delay),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the retry count
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns when the last attempt was made
    pub fn last_attempt(&self) -> DateTime<Utc> {
        self.last_attempt
    }

    /// Returns when the next retry is scheduled
    pub fn next_retry(&self) -> Option<DateTime<Utc>> {
        self.next_retry
    }

    /// Returns true if a retry is scheduled
    pub fn has_retry_scheduled(&self) -> bool {
        self.next_retry.is_some()
    }

    /// Returns true if it's time to retry
    pub fn should_retry_now(&self) -> bool {
        match self.next_retry {
            Some(next) => Utc::now() >= next,
            None => false,
        }
    }

    /// Increments the retry count and updates the last attempt time
    pub fn record_retry(&mut self) {
        self.retry_count += 1;
        self.last_attempt = Utc::now();
    }

    /// Schedules the next retry with exponential backoff
    ///
    /// Uses the formula: base_delay * 2^retry_count, capped at max_delay
    pub fn schedule_retry_exponential(&mut self, base_delay: Duration, max_delay: Duration) {
        let multiplier = 2i64.saturating_pow(self.retry_count);
        let delay = base_delay * multiplier as i32;
        let capped_delay = if delay > max_delay { max_delay } else { delay };
        self.next_retry = Some(Utc::now() + capped_delay);
    }

    /// Cancels any scheduled retry
    pub fn cancel_retry(&mut self) {
        self.next_retry = None;
    }

    /// Creates a common network error
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::with_retry("NETWORK_ERROR", message, Duration::seconds(30))
    }

    /// Creates a common authentication error
    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::new("AUTH_ERROR", message)
    }

    /// Creates a common rate limit error
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::with_retry("RATE_LIMITED", "Rate limit exceeded", retry_after)
    }

    /// Creates a common conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if self.retry_count > 0 {
            write!(f, " (retries: {})", self.retry_count)?;
        }
        Ok(())
    }
}

// ============================================================================
// T028: SyncItem struct
// ============================================================================

/// Represents a file or folder being synchronized between local storage and
/// a remote cloud drive
///
/// SyncItem is the core domain entity that tracks the synchronization state
/// of individual files and directories using the Files-On-Demand model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Unique identifier for this item within LNXDrive
    id: UniqueId,
    /// Local file system path
    local_path: SyncPath,
    /// Remote item ID (None for new local items not yet uploaded)
    remote_id: Option<RemoteId>,
    /// Remote path on the cloud drive
    remote_path: RemotePath,
    /// Current synchronization state
    state: ItemState,
    /// Content hash from the remote drive (quickXorHash)
    content_hash: Option<FileHash>,
    /// Local content hash (computed locally)
    local_hash: Option<FileHash>,
    /// File size in bytes (0 for directories)
    size_bytes: u64,
    /// When this item was last successfully synced
    last_sync: Option<DateTime<Utc>>,
    /// Last modified time on the local filesystem
    last_modified_local: Option<DateTime<Utc>>,
    /// Last modified time on the remote drive
    last_modified_remote: Option<DateTime<Utc>>,
    /// Item metadata
    metadata: ItemMetadata,
    /// Error information if state is Error
    error_info: Option<ErrorInfo>,
    /// User-expressed pin policy, independent of the current `ItemState`
    #[serde(default)]
    pin: PinPolicy,
}

// ============================================================================
// T029: SyncItem::new() constructor
// ============================================================================

impl SyncItem {
    /// Creates a new SyncItem with validation
    ///
    /// # Arguments
    ///
    /// * `local_path` - The local filesystem path (must be absolute)
    /// * `remote_path` - The remote path on the cloud drive
    /// * `is_directory` - Whether this is a directory
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if:
    /// - The paths are inconsistent (e.g., file path ends with /)
    pub fn new(
        local_path: SyncPath,
        remote_path: RemotePath,
        is_directory: bool,
    ) -> Result<Self, DomainError> {
        // Validate that directory flag is consistent
        // (We can't fully validate path consistency without filesystem access)

        let metadata = if is_directory {
            ItemMetadata::new_directory()
        } else {
            ItemMetadata::new_file(None)
        };

        Ok(Self {
            id: UniqueId::new(),
            local_path,
            remote_id: None,
            remote_path,
            state: ItemState::Ghost,
            content_hash: None,
            local_hash: None,
            size_bytes: 0,
            last_sync: None,
            last_modified_local: None,
            last_modified_remote: None,
            metadata,
            error_info: None,
            pin: PinPolicy::Unset,
        })
    }

    /// Creates a new SyncItem for a file with size and MIME type
    pub fn new_file(
        local_path: SyncPath,
        remote_path: RemotePath,
        size_bytes: u64,
        mime_type: Option<String>,
    ) -> Result<Self, DomainError> {
        let mut item = Self::new(local_path, remote_path, false)?;
        item.size_bytes = size_bytes;
        item.metadata.set_mime_type(mime_type);
        Ok(item)
    }

    /// Creates a new SyncItem for a directory
    pub fn new_directory(
        local_path: SyncPath,
        remote_path: RemotePath,
    ) -> Result<Self, DomainError> {
        Self::new(local_path, remote_path, true)
    }

    /// Creates a SyncItem from remote data (for initial sync from cloud)
    pub fn from_remote(
        local_path: SyncPath,
        remote_path: RemotePath,
        remote_id: RemoteId,
        is_directory: bool,
        size_bytes: u64,
        content_hash: Option<FileHash>,
        last_modified_remote: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let mut item = Self::new(local_path, remote_path, is_directory)?;
        item.remote_id = Some(remote_id);
        item.size_bytes = size_bytes;
        item.content_hash = content_hash;
        item.last_modified_remote = Some(last_modified_remote);
        Ok(item)
    }

    // --- Getters ---

    /// Returns the item's unique identifier
    pub fn id(&self) -> &UniqueId {
        &self.id
    }

    /// Returns the local file path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns the remote ID if set
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    /// Returns the remote path
    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }

    /// Returns the current state
    pub fn state(&self) -> &ItemState {
        &self.state
    }

    /// Returns the content hash from the remote drive
    pub fn content_hash(&self) -> Option<&FileHash> {
        self.content_hash.as_ref()
    }

    /// Returns the local content hash
    pub fn local_hash(&self) -> Option<&FileHash> {
        self.local_hash.as_ref()
    }

    /// Returns the file size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Returns when the item was last synced
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Returns the local last modified time
    pub fn last_modified_local(&self) -> Option<DateTime<Utc>> {
        self.last_modified_local
    }

    /// Returns the remote last modified time
    pub fn last_modified_remote(&self) -> Option<DateTime<Utc>> {
        self.last_modified_remote
    }

    /// Returns the metadata
    pub fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    /// Returns mutable metadata
    pub fn metadata_mut(&mut self) -> &mut ItemMetadata {
        &mut self.metadata
    }

    /// Returns the error info if any
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    /// Returns the item's pin policy
    pub fn pin(&self) -> PinPolicy {
        self.pin
    }

    /// Sets the item's pin policy
    pub fn set_pin(&mut self, pin: PinPolicy) {
        self.pin = pin;
    }

    /// Returns true if this is a directory
    pub fn is_directory(&self) -> bool {
        self.metadata.is_directory()
    }

    /// Returns true if the local and remote hashes match
    pub fn hashes_match(&self) -> bool {
        match (&self.local_hash, &self.content_hash) {
            (Some(local), Some(remote)) => local == remote,
            _ => false,
        }
    }

    // --- Setters ---

    /// Sets the remote ID
    pub fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
    }

    /// Sets the content hash from the remote drive
    pub fn set_content_hash(&mut self, hash: FileHash) {
        self.content_hash = Some(hash);
    }

    /// Sets the local content hash
    pub fn set_local_hash(&mut self, hash: FileHash) {
        self.local_hash = Some(hash);
    }

    /// Sets the file size
    pub fn set_size_bytes(&mut self, size: u64) {
        self.size_bytes = size;
    }

    /// Sets the local last modified time
    pub fn set_last_modified_local(&mut self, time: DateTime<Utc>) {
        self.last_modified_local = Some(time);
    }

    /// Sets the remote last modified time
    pub fn set_last_modified_remote(&mut self, time: DateTime<Utc>) {
        self.last_modified_remote = Some(time);
    }

    /// Updates the last sync time to now
    pub fn mark_synced(&mut self) {
        self.last_sync = Some(Utc::now());
    }

    /// Updates the local path
    pub fn update_local_path(&mut self, path: SyncPath) {
        self.local_path = path;
    }

    /// Updates the remote path
    pub fn update_remote_path(&mut self, path: RemotePath) {
        self.remote_path = path;
    }
}

// ============================================================================
// T030: State transition methods
// ============================================================================

impl SyncItem {
    /// Checks if a state transition is valid
    ///
    /// Valid transitions:
    /// - Ghost -> Hydrating, Error, DeletedLocal
    /// - Hydrating -> Hydrated, Error, DeletedLocal
    /// - Hydrated -> DirtyLocal, Ghost (dehydrate), Error, DeletedLocal
    /// - DirtyLocal -> Hydrated (after sync), Conflict, Error, DeletedLocal
    /// - Conflict -> DirtyLocal (keep local), Ghost (keep remote), Error
    /// - Error -> any state (retry)
    /// - DeletedLocal -> (terminal state, no transitions)
    ///
    /// Every state can reach `DeletedLocal` except `Conflict`, which must
    /// resolve first.
    pub fn can_transition_to(&self, target: &ItemState) -> bool {
        // DeletedLocal is a terminal state
        if matches!(self.state, ItemState::DeletedLocal) {
            return false;
        }

        // Error state can transition to any state (retry mechanism)
        if matches!(self.state, ItemState::Error(_)) {
            return true;
        }

        match (&self.state, target) {
            // Ghost transitions
            (ItemState::Ghost, ItemState::Hydrating) => true,
            (ItemState::Ghost, ItemState::Error(_)) => true,
            (ItemState::Ghost, ItemState::DeletedLocal) => true,

            // Hydrating transitions
            (ItemState::Hydrating, ItemState::Hydrated) => true,
            (ItemState::Hydrating, ItemState::Error(_)) => true,
            (ItemState::Hydrating, ItemState::DeletedLocal) => true,

            // Hydrated transitions
            (ItemState::Hydrated, ItemState::DirtyLocal) => true,
            (ItemState::Hydrated, ItemState::Ghost) => true, // dehydrate
            (ItemState::Hydrated, ItemState::Error(_)) => true,
            (ItemState::Hydrated, ItemState::DeletedLocal) => true,

            // DirtyLocal transitions
            (ItemState::DirtyLocal, ItemState::Hydrated) => true, // after sync
            (ItemState::DirtyLocal, ItemState::Conflict) => true,
            (ItemState::DirtyLocal, ItemState::Error(_)) => true,
            (ItemState::DirtyLocal, ItemState::DeletedLocal) => true,

            // Conflict transitions: must resolve before it can be deleted
            (ItemState::Conflict, ItemState::DirtyLocal) => true, // keep local
            (ItemState::Conflict, ItemState::Ghost) => true,      // keep remote
            (ItemState::Conflict, ItemState::Error(_)) => true,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Attempts to transition to a new state
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: ItemState) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }

        // Clear error info when leaving error state
        if matches!(self.state, ItemState::Error(_)) {
            self.error_info = None;
        }

        // Set error info when entering error state
        if let ItemState::Error(ref reason) = target {
            if self.error_info.is_none() {
                self.error_info = Some(ErrorInfo::new("UNKNOWN", reason.clone()));
            }
        }

        // Update last sync time when transitioning to Hydrated from DirtyLocal
        if matches!(self.state, ItemState::DirtyLocal) && matches!(target, ItemState::Hydrated) {
            self.mark_synced();
        }

        self.state = target;
        Ok(())
    }

    /// Transitions to error state with detailed error info
    pub fn transition_to_error(&mut self, error: ErrorInfo) -> Result<(), DomainError> {
        let target = ItemState::Error(error.message().to_string());
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: "ERROR".to_string(),
            });
        }

        self.error_info = Some(error);
        self.state = target;
        Ok(())
    }

    /// Convenience method to start hydrating (downloading)
    pub fn start_hydrating(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::Hydrating)
    }

    /// Convenience method to complete hydration
    pub fn complete_hydration(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::Hydrated)
    }

    /// Convenience method to dehydrate (convert to placeholder)
    pub fn dehydrate(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::Ghost)
    }

    /// Convenience method to mark as having local changes pending upload
    pub fn mark_modified(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::DirtyLocal)
    }

    /// Convenience method to mark as conflicted
    pub fn mark_conflicted(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::Conflict)
    }

    /// Convenience method to mark as deleted locally
    pub fn mark_deleted(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::DeletedLocal)
    }

    /// Convenience method to resolve a conflict by keeping the local version
    /// (transitions to `DirtyLocal` so the local content is re-uploaded)
    pub fn resolve_conflict_keep_local(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::DirtyLocal)
    }

    /// Convenience method to resolve a conflict by keeping the remote version
    /// (transitions to `Ghost` so the remote content is re-hydrated on demand)
    pub fn resolve_conflict_keep_remote(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::Ghost)
    }

    /// Convenience method to sync a dirty item (transition to Hydrated)
    pub fn complete_sync(&mut self) -> Result<(), DomainError> {
        self.transition_to(ItemState::Hydrated)
    }

    /// Retry from error state to a target state
    pub fn retry_to(&mut self, target: ItemState) -> Result<(), DomainError> {
        if !matches!(self.state, ItemState::Error(_)) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }

        // Record the retry attempt
        if let Some(ref mut error_info) = self.error_info {
            error_info.record_retry();
        }

        self.transition_to(target)
    }
}
