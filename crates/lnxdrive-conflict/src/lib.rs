//! LNXDrive Conflict - Conflict detection and resolution
//!
//! Provides:
//! - Hash-based conflict detection
//! - Configurable resolution strategies
//! - Automatic resolution for configured patterns
//! - Manual resolution UI integration
