//! Filesystems the installer does not manage
//!
//! Partitions without a mountpoint are ignored by the kickstart file, so we
//! create (and label) their filesystem ourselves.

use crate::disk::detection::partition_path;
use crate::disk::layouts::{PartitionSchema, SWAP_FILESYSTEM};
use crate::utils::command::{CommandRunner, ShellCommand};
use crate::utils::error::{KickstartError, Result};
use tracing::{info, warn};

fn is_xfs(filesystem: &str) -> bool {
    filesystem.to_lowercase().starts_with("xfs")
}

fn is_ext(filesystem: &str) -> bool {
    filesystem.to_lowercase().starts_with("ext")
}

/// Filesystem creation command for `partition`
pub fn mkfs_command(filesystem: &str, partition: &str) -> ShellCommand {
    let fs = filesystem.to_lowercase();
    match fs.as_str() {
        SWAP_FILESYSTEM | "swap" => ShellCommand::new("mkswap", [partition]),
        "fat32" | "vfat" | "fat" => ShellCommand::new("mkfs.vfat", ["-F32", partition]),
        "btrfs" => ShellCommand::new("mkfs.btrfs", ["-f", partition]),
        _ if is_xfs(&fs) => ShellCommand::new("mkfs.xfs", ["-f", partition]),
        _ if is_ext(&fs) => ShellCommand::new(&format!("mkfs.{}", fs), ["-F", partition]),
        _ => ShellCommand::new(&format!("mkfs.{}", fs), [partition]),
    }
}

/// Label command for `partition`; only xfs and ext filesystems can be labeled
pub fn label_command(filesystem: &str, label: &str, partition: &str) -> Result<ShellCommand> {
    if is_xfs(filesystem) {
        Ok(ShellCommand::new("xfs_admin", ["-L", label, partition]))
    } else if is_ext(filesystem) {
        Ok(ShellCommand::new("tune2fs", ["-L", label, partition]))
    } else {
        Err(KickstartError::LabelUnsupported(filesystem.to_string()))
    }
}

/// Render mkfs/label commands for every partition the installer won't mount
///
/// Commands address physical partitions by their position on disk.
pub fn render_filesystem_commands(
    device: &str,
    schema: &PartitionSchema,
) -> Result<Vec<ShellCommand>> {
    let mut commands = Vec::new();

    for (number, part) in (1u32..).zip(schema.partitions()) {
        let path = partition_path(device, number);

        if part.mountpoint.is_some() {
            if let Some(ref label) = part.label {
                warn!(
                    "Ignoring label {} on {}: the installer creates that filesystem",
                    label, path
                );
            }
            continue;
        }

        commands.push(mkfs_command(&part.filesystem, &path));
        if let Some(ref label) = part.label {
            commands.push(label_command(&part.filesystem, label, &path)?);
        }
    }

    Ok(commands)
}

/// Create filesystems that the installer will not handle
pub fn prepare_unmanaged_filesystems(cmd: &CommandRunner, commands: &[ShellCommand]) -> Result<()> {
    if commands.is_empty() {
        info!("All partitions are handled by the installer");
        return Ok(());
    }

    for command in commands {
        info!("Setting up unmanaged filesystem: {}", command);
        cmd.run(command)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::layouts::SchemaEntry;

    fn entry(index: u32, fs: &str, mountpoint: Option<&str>, label: Option<&str>) -> SchemaEntry {
        SchemaEntry {
            index,
            size_mb: 1000,
            filesystem: fs.to_string(),
            mountpoint: mountpoint.map(str::to_string),
            label: label.map(str::to_string),
            fs_options: None,
        }
    }

    #[test]
    fn mkfs_flags_follow_filesystem() {
        assert_eq!(mkfs_command("xfs", "/dev/sda4").to_string(), "mkfs.xfs -f /dev/sda4");
        assert_eq!(mkfs_command("ext4", "/dev/sda4").to_string(), "mkfs.ext4 -F /dev/sda4");
        assert_eq!(mkfs_command("fat32", "/dev/sda1").to_string(), "mkfs.vfat -F32 /dev/sda1");
        assert_eq!(mkfs_command("linux-swap", "/dev/sda9").to_string(), "mkswap /dev/sda9");
        assert_eq!(mkfs_command("f2fs", "/dev/sda2").to_string(), "mkfs.f2fs /dev/sda2");
    }

    #[test]
    fn labels_use_family_tool() {
        assert_eq!(
            label_command("xfs", "STATEFULRW", "/dev/sda5").unwrap().to_string(),
            "xfs_admin -L STATEFULRW /dev/sda5"
        );
        assert_eq!(
            label_command("ext3", "DATA", "/dev/sda5").unwrap().to_string(),
            "tune2fs -L DATA /dev/sda5"
        );
        assert!(matches!(
            label_command("btrfs", "DATA", "/dev/sda5"),
            Err(KickstartError::LabelUnsupported(_))
        ));
    }

    #[test]
    fn only_unmounted_partitions_are_formatted() {
        let schema = PartitionSchema::Flat {
            partitions: vec![
                entry(0, "fat32", Some("/boot/efi"), None),
                entry(1, "xfs", Some("/boot"), None),
                entry(10, "xfs", Some("/"), Some("ROOT")),
                entry(11, "xfs", None, Some("STATEFULRW")),
                entry(99, "linux-swap", Some("swap"), None),
            ],
        };
        let lines: Vec<String> = render_filesystem_commands("/dev/vda", &schema)
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            lines,
            vec!["mkfs.xfs -f /dev/vda4", "xfs_admin -L STATEFULRW /dev/vda4"]
        );
    }

    #[test]
    fn unsupported_label_fails_rendering() {
        let schema = PartitionSchema::Flat {
            partitions: vec![entry(10, "btrfs", None, Some("DATA"))],
        };
        assert!(render_filesystem_commands("/dev/vda", &schema).is_err());
    }
}
