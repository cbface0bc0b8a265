//! LNXDrive Sync - Delta synchronization engine
//!
//! Provides:
//! - Incremental delta sync with Microsoft Graph
//! - Adaptive rate limiting
//! - Conflict detection
//! - Bidirectional synchronization
