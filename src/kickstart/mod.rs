//! Files consumed by the kickstart installer
//!
//! Each module renders the file content as a string and writes it in a
//! separate step, so the text can be inspected without touching the disk.

pub mod network;
pub mod packages;
pub mod partitions;
pub mod users;

use crate::utils::error::Result;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Write `content` to `path`, creating parent directories as needed
pub fn write_file(path: &str, content: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    debug!("Wrote {} ({} bytes)", path, content.len());
    Ok(())
}
