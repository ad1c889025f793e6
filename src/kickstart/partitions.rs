//! Kickstart mount directives (`%include /tmp/partitions`)

use crate::config::DiskConfig;
use crate::disk::detection::partition_path;
use crate::disk::layouts::{PartitionSchema, SchemaEntry, SWAP_FILESYSTEM};
use crate::disk::lvm::{logical_volume_name, lv_path, PV_PARTITION_NAME};
use crate::kickstart::write_file;
use crate::utils::error::Result;
use tracing::{debug, info};

/// Filesystem keyword the installer expects; parted says `linux-swap`,
/// kickstart says `swap`
pub fn installer_fstype(filesystem: &str) -> &str {
    if filesystem == SWAP_FILESYSTEM {
        "swap"
    } else {
        filesystem
    }
}

fn fs_options_suffix(entry: &SchemaEntry) -> String {
    entry
        .fs_options
        .as_ref()
        .map(|opts| format!(" --fsoptions={}", opts))
        .unwrap_or_default()
}

/// Render the mount directive file
///
/// Physical partitions are referenced by their position on `device`.
/// Logical volumes follow the volume group declaration.
pub fn render_partitions_file(
    device: &str,
    schema: &PartitionSchema,
    disk: &DiskConfig,
) -> String {
    let mut out = String::new();

    for (number, part) in (1u32..).zip(schema.partitions()) {
        if let Some(ref mountpoint) = part.mountpoint {
            out.push_str(&format!(
                "part {} --fstype {} --onpart={}{}\n",
                mountpoint,
                installer_fstype(&part.filesystem),
                partition_path(device, number),
                fs_options_suffix(part)
            ));
        }
    }

    if schema.is_lvm() {
        let vg = &disk.volume_group;
        out.push_str(&format!("part {} --grow --size=1\n", PV_PARTITION_NAME));
        out.push_str(&format!(
            "volgroup {} --pesize={} {}\n",
            vg, disk.pe_size, PV_PARTITION_NAME
        ));

        for vol in schema.volumes() {
            let Some(ref mountpoint) = vol.mountpoint else {
                continue;
            };
            let name = logical_volume_name(mountpoint);
            debug!("{} will be {}", mountpoint, lv_path(vg, &name));
            out.push_str(&format!(
                "logvol {} --vgname {} --fstype {} --name={}{} --size={}\n",
                mountpoint,
                vg,
                installer_fstype(&vol.filesystem),
                name,
                fs_options_suffix(vol),
                vol.size_mb
            ));
        }
    }

    out
}

/// Write the mount directive file for the installer
pub fn write_partitions_file(path: &str, content: &str) -> Result<()> {
    write_file(path, content)?;
    info!("Partitioning done. Please use '%include {}'", path);
    Ok(())
}
