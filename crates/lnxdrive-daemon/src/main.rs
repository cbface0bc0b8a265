//! LNXDrive Daemon - Background synchronization service
//!
//! This binary runs as a systemd user service and handles:
//! - File synchronization with OneDrive
//! - D-Bus interface for UI clients
//! - FUSE filesystem for Files-on-Demand
//! - State persistence and recovery

fn main() {
    println!("LNXDrive Daemon - Not yet implemented");
}
