//! Extended attributes handler.
//!
//! Handles extended attributes for file metadata, including hydration state
//! indicators (user.lnxdrive.state, user.lnxdrive.size, etc.).
//!
//! ## Supported Extended Attributes
//!
//! - `user.lnxdrive.state` - Current sync/hydration state (GHOST, HYDRATING, HYDRATED, etc.)
//! - `user.lnxdrive.size` - File size in bytes
//! - `user.lnxdrive.remote_id` - OneDrive item ID
//! - `user.lnxdrive.progress` - Hydration progress (only during Hydrating state)
//! - `user.lnxdrive.error` - Last error message (only when state is Error)

use lnxdrive_core::domain::ItemState;

use crate::inode_entry::InodeEntry;

// ============================================================================
// Constants for xattr namespace
// ============================================================================

/// Extended attribute for the current sync/hydration state.
///
/// Values: "GHOST", "HYDRATING", "HYDRATED", "DIRTY_LOCAL", "DELETED_LOCAL", "CONFLICT", "ERROR"
pub const XATTR_STATE: &str = "user.lnxdrive.state";

/// Extended attribute for the file size in bytes.
///
/// Value: decimal string representation of the size (e.g., "1024")
pub const XATTR_SIZE: &str = "user.lnxdrive.size";

/// Extended attribute for the OneDrive remote item ID.
///
/// Value: the OneDrive item identifier string (only present for items synced with OneDrive)
pub const XATTR_REMOTE_ID: &str = "user.lnxdrive.remote_id";

/// Extended attribute for hydration download progress.
///
/// Value: percentage string "0" to "100" (only present during Hydrating state)
pub const XATTR_PROGRESS: &str = "user.lnxdrive.progress";

/// Extended attribute for the last error message.
///
/// Value: the error text (only present when state is `Error`)
pub const XATTR_ERROR: &str = "user.lnxdrive.error";

// ============================================================================
// Helper functions
// ============================================================================

/// Returns a list of all supported extended attribute names.
///
/// This is used to respond to `listxattr` FUSE operations.
///
/// # Returns
///
/// A vector containing all supported xattr names.
#[must_use]
pub fn list_xattrs() -> Vec<&'static str> {
    vec![
        XATTR_STATE,
        XATTR_SIZE,
        XATTR_REMOTE_ID,
        XATTR_PROGRESS,
        XATTR_ERROR,
    ]
}

/// Gets the value of an extended attribute from an inode entry.
///
/// # Arguments
///
/// * `entry` - The inode entry to read the attribute from
/// * `name` - The name of the extended attribute to read
///
/// # Returns
///
/// - `Some(Vec<u8>)` containing the attribute value if the attribute exists and has a value
/// - `None` if the attribute is not recognized or has no value for this entry
///
/// # Supported Attributes
///
/// - `XATTR_STATE` - Always returns the state name as bytes
/// - `XATTR_SIZE` - Always returns the file size as a decimal string in bytes
/// - `XATTR_REMOTE_ID` - Returns the OneDrive ID if present, None otherwise
/// - `XATTR_PROGRESS` - Returns hydration progress (0-100) when state is Hydrating, None otherwise
///
/// # Arguments
///
/// * `entry` - The inode entry to read the attribute from
/// * `name` - The name of the extended attribute to read
/// * `hydration_progress` - Current hydration progress percentage (0-100), if available
#[must_use]
pub fn get_xattr(entry: &InodeEntry, name: &str, hydration_progress: Option<u8>) -> Option<Vec<u8>> {
    match name {
        XATTR_STATE => Some(entry.state().name().as_bytes().to_vec()),
        XATTR_SIZE => Some(entry.size().to_string().as_bytes().to_vec()),
        XATTR_REMOTE_ID => entry.remote_id().map(|r| r.as_str().as_bytes().to_vec()),
        XATTR_PROGRESS => {
            if matches!(entry.state(), ItemState::Hydrating) {
                let pct = hydration_progress.unwrap_or(0);
                Some(pct.to_string().as_bytes().to_vec())
            } else {
                None
            }
        }
        XATTR_ERROR => match entry.state() {
            ItemState::Error(msg) => Some(msg.as_bytes().to_vec()),
            _ => None,
        },
        _ => None,
    }
}
