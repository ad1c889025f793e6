//! Partition table creation with parted

use crate::disk::detection::Firmware;
use crate::disk::layouts::PartitionSchema;
use crate::utils::command::{CommandRunner, ShellCommand};
use crate::utils::error::Result;
use std::thread;
use std::time::Duration;
use tracing::info;

/// Start of the first partition, keeps the first MiB for alignment
pub const FIRST_PARTITION_START: &str = "1024KiB";

/// Offset (MB) the first partition end is computed from
const FIRST_PARTITION_OFFSET_MB: u64 = 1;

/// Commands that destroy the existing partition table
pub fn zero_disk_commands(device: &str) -> Vec<ShellCommand> {
    vec![
        ShellCommand::new(
            "dd",
            [
                "if=/dev/zero".to_string(),
                format!("of={}", device),
                "bs=512".to_string(),
                "count=1".to_string(),
                "conv=notrunc".to_string(),
            ],
        ),
        ShellCommand::new("blockdev", ["--rereadpt", device]),
    ]
}

/// Command writing a fresh, empty label
pub fn label_command(device: &str, firmware: Firmware) -> ShellCommand {
    ShellCommand::new("parted", ["-s", device, "mklabel", firmware.parted_label()])
}

/// Render one `mkpart` per physical partition, with absolute offsets in MB
///
/// Partitions are laid out back to back from [`FIRST_PARTITION_START`]. An
/// LVM schema ends with a single physical volume partition that runs to the
/// end of the usable space; its logical volumes are not partitions.
pub fn render_partition_commands(
    device: &str,
    schema: &PartitionSchema,
    usable_mb: u64,
) -> Vec<ShellCommand> {
    let mut commands = Vec::new();
    let mut end: Option<u64> = None;

    let start_of = |end: Option<u64>| match end {
        None => FIRST_PARTITION_START.to_string(),
        Some(prev) => prev.to_string(),
    };

    for part in schema.partitions() {
        let start = start_of(end);
        let part_end = end.unwrap_or(FIRST_PARTITION_OFFSET_MB) + part.size_mb;
        commands.push(ShellCommand::new(
            "parted",
            [
                "-a".to_string(),
                "optimal".to_string(),
                "-s".to_string(),
                device.to_string(),
                "mkpart".to_string(),
                "primary".to_string(),
                part.filesystem.clone(),
                start,
                part_end.to_string(),
            ],
        ));
        end = Some(part_end);
    }

    if schema.is_lvm() {
        let start = start_of(end);
        let pv_end = FIRST_PARTITION_OFFSET_MB + usable_mb;
        let pv_number = schema.partitions().len() + 1;
        commands.push(ShellCommand::new(
            "parted",
            [
                "-a".to_string(),
                "optimal".to_string(),
                "-s".to_string(),
                device.to_string(),
                "mkpart".to_string(),
                "primary".to_string(),
                start,
                pv_end.to_string(),
            ],
        ));
        commands.push(ShellCommand::new(
            "parted",
            [
                "-s".to_string(),
                device.to_string(),
                "set".to_string(),
                pv_number.to_string(),
                "lvm".to_string(),
                "on".to_string(),
            ],
        ));
    }

    commands
}

/// Zero the first sector and make the kernel forget the old table
pub fn zero_disk(cmd: &CommandRunner, device: &str) -> Result<()> {
    info!("Zeroing disk {}", device);
    cmd.run_all(&zero_disk_commands(device))
}

/// Write a new empty partition label
pub fn init_disk(cmd: &CommandRunner, device: &str, firmware: Firmware) -> Result<()> {
    info!("Making {} label ({})", device, firmware.parted_label());
    cmd.run(&label_command(device, firmware))?;
    Ok(())
}

/// Run the partitioning commands, then wait for the kernel to settle
pub fn apply_partitions(
    cmd: &CommandRunner,
    device: &str,
    commands: &[ShellCommand],
    settle_seconds: u64,
) -> Result<()> {
    info!("Creating {} partitions on {}", commands.len(), device);
    cmd.run_all(commands)?;

    // The kernel re-reads the table asynchronously; mkfs on a partition
    // node that does not exist yet fails.
    if cmd.is_dry_run() {
        info!("[dry-run] would wait {}s for partition table re-read", settle_seconds);
    } else {
        thread::sleep(Duration::from_secs(settle_seconds));
    }

    info!("Partitioning of {} complete", device);
    Ok(())
}
