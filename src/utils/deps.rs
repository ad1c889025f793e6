//! Host tool checks before touching the disk

use crate::utils::command::{command_exists, CommandRunner, ShellCommand};
use crate::utils::error::{KickstartError, Result};
use std::collections::HashMap;
use tracing::{info, warn};

/// Binary to package mapping for RHEL-like install images
fn binary_to_package() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();
    map.insert("dd", "coreutils");
    map.insert("blockdev", "util-linux");
    map.insert("mkswap", "util-linux");
    map.insert("parted", "parted");
    map.insert("mkfs.xfs", "xfsprogs");
    map.insert("xfs_admin", "xfsprogs");
    map.insert("tune2fs", "e2fsprogs");
    map.insert("mkfs.vfat", "dosfstools");
    map.insert("mkfs.btrfs", "btrfs-progs");
    map
}

/// Distinct programs used by a set of rendered commands, in first-use order
pub fn required_binaries<'a, I>(commands: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ShellCommand>,
{
    let mut bins: Vec<String> = Vec::new();
    for cmd in commands {
        if !bins.contains(&cmd.program) {
            bins.push(cmd.program.clone());
        }
    }
    bins
}

/// Return the required binaries missing from PATH, annotated with the
/// package providing them when known
pub fn check_dependencies(required: &[String]) -> Vec<String> {
    let bin_to_pkg = binary_to_package();

    required
        .iter()
        .filter(|bin| !command_exists(bin))
        .map(|bin| match bin_to_pkg.get(bin.as_str()) {
            Some(pkg) => format!("{} ({})", bin, pkg),
            None => bin.clone(),
        })
        .collect()
}

/// Fail unless every tool of the plan is installed
///
/// In dry-run mode nothing is executed, so missing tools are only reported.
pub fn ensure_dependencies(cmd: &CommandRunner, required: &[String]) -> Result<()> {
    let missing = check_dependencies(required);

    if missing.is_empty() {
        info!("All required host tools are available");
        return Ok(());
    }

    if cmd.is_dry_run() {
        warn!("[dry-run] missing host tools: {}", missing.join(", "));
        return Ok(());
    }

    Err(KickstartError::MissingDependencies(missing))
}
