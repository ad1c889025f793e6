//! LVM naming
//!
//! The pre-script only creates the physical partition; the installer builds
//! the volume group and logical volumes from the kickstart directives.

/// Name of the installer-side partition that becomes the physical volume
pub const PV_PARTITION_NAME: &str = "PVGroup";

/// Logical volume name used for the root filesystem
pub const ROOT_VOLUME_NAME: &str = "root";

/// Logical volume name for a mountpoint: `/` is `root`, anything else is
/// the path with its separators removed (`/var/log` -> `varlog`)
pub fn logical_volume_name(mountpoint: &str) -> String {
    if mountpoint == "/" {
        return ROOT_VOLUME_NAME.to_string();
    }
    mountpoint.chars().filter(|c| *c != '/').collect()
}

/// Get the device path for a logical volume
pub fn lv_path(vg_name: &str, lv_name: &str) -> String {
    format!("/dev/{}/{}", vg_name, lv_name)
}

/// Volume group size the installer will end up with, in MiB
///
/// Partition sizes are decimal MB while `logvol --size` is read as MiB,
/// and LVM keeps one extent for metadata.
pub fn volume_group_capacity_mib(pv_mb: u64, pe_size_kib: u32) -> u64 {
    let pe_mib = u64::from(pe_size_kib / 1024).max(1);
    let raw_mib = (u128::from(pv_mb) * 1_000_000 / 1_048_576) as u64;
    (raw_mib / pe_mib).saturating_sub(1) * pe_mib
}

/// How many MiB the logical volumes overshoot the volume group, if any
pub fn volume_group_shortfall_mib(
    volumes_mb: u64,
    pv_mb: u64,
    pe_size_kib: u32,
) -> Option<u64> {
    let capacity = volume_group_capacity_mib(pv_mb, pe_size_kib);
    (volumes_mb > capacity).then(|| volumes_mb - capacity)
}
