//! Machine and disk measurements
//!
//! Everything the allocator needs to know about the host goes through
//! [`DiskInspector`], so the schema logic never touches the OS directly.

use crate::utils::command::{run_command_optional, run_command_output};
use crate::utils::error::{KickstartError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Partition table flavour, derived from the firmware mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Firmware {
    /// UEFI machine, GPT label with an EFI system partition
    Gpt,
    /// Legacy BIOS machine, msdos label
    Mbr,
}

impl Firmware {
    pub fn is_gpt(&self) -> bool {
        matches!(self, Self::Gpt)
    }

    /// Label name as understood by `parted mklabel`
    pub fn parted_label(&self) -> &'static str {
        match self {
            Self::Gpt => "gpt",
            Self::Mbr => "msdos",
        }
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpt => write!(f, "UEFI/GPT"),
            Self::Mbr => write!(f, "BIOS/MBR"),
        }
    }
}

/// Source of host measurements
pub trait DiskInspector {
    /// Installed memory in MB
    fn memory_mb(&self) -> Result<u64>;
    fn firmware(&self) -> Firmware;
    /// Whether we run inside a virtual machine
    fn is_virtual(&self) -> bool;
    /// Path of the disk to install on
    fn target_disk(&self) -> Result<String>;
    /// Size of `disk` in MB (10^6 bytes, parted's `MB` unit)
    fn disk_size_mb(&self, disk: &str) -> Result<u64>;
}

/// Measurements gathered from the running system
#[derive(Debug, Default)]
pub struct SystemInspector {
    /// Disk forced by configuration or command line
    device: Option<String>,
}

/// Deterministic inspector for planning and tests
#[derive(Debug, Clone)]
pub struct FixedInspector {
    pub memory_mb: u64,
    pub firmware: Firmware,
    pub is_virtual: bool,
    pub disk: String,
    pub disk_size_mb: u64,
}

static VIRTUAL_VENDOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)kvm|qemu|vmware|hyper-v|virtualbox|innotek|netperfect_vm")
        .expect("static regex")
});

static INSTALLABLE_DISK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([vsh]\S*)\s+disk\s*$").expect("static regex"));

static PARTED_DISK_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Disk\s+\S+:\s+(\d+)MB").expect("static regex"));

/// Read a sysfs attribute, returning None if not available
fn read_sysfs_attr(device: &str, attr: &str) -> Option<String> {
    let path = format!("/sys/block/{}/{}", device, attr);
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Read a numeric sysfs attribute
fn read_sysfs_u64(device: &str, attr: &str) -> Option<u64> {
    read_sysfs_attr(device, attr).and_then(|s| s.parse().ok())
}

/// Pick the first real disk from `lsblk -nd -o NAME,TYPE` output
///
/// Only hdX/sdX/vdX style names qualify, which skips zram and friends.
pub fn first_installable_disk(lsblk_output: &str) -> Option<String> {
    lsblk_output
        .lines()
        .filter_map(|line| INSTALLABLE_DISK.captures(line.trim()))
        .map(|caps| format!("/dev/{}", &caps[1]))
        .next()
}

/// Extract the disk size in MB from `parted unit mb print` output
pub fn parse_parted_size(output: &str) -> Option<u64> {
    PARTED_DISK_SIZE
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

/// Whether `dmidecode` output names a hypervisor vendor
pub fn is_virtual_vendor(dmidecode_output: &str) -> bool {
    VIRTUAL_VENDOR.is_match(dmidecode_output)
}

/// Parse `MemTotal` from /proc/meminfo content, in MB
pub fn parse_meminfo_mb(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}

impl SystemInspector {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }
}

impl DiskInspector for SystemInspector {
    fn memory_mb(&self) -> Result<u64> {
        let meminfo = fs::read_to_string("/proc/meminfo")?;
        let mem_mb = parse_meminfo_mb(&meminfo).ok_or_else(|| {
            KickstartError::ConfigError("cannot read MemTotal from /proc/meminfo".to_string())
        })?;
        info!("Current system has {} MB of memory", mem_mb);
        Ok(mem_mb)
    }

    fn firmware(&self) -> Firmware {
        if Path::new("/sys/firmware/efi").exists() {
            info!("We're running on a UEFI machine");
            Firmware::Gpt
        } else {
            info!("We're running on a MBR machine");
            Firmware::Mbr
        }
    }

    fn is_virtual(&self) -> bool {
        let is_virtual = run_command_optional("dmidecode", &[])
            .map(|out| is_virtual_vendor(&out))
            .unwrap_or(false);
        info!(
            "Machine type: {}",
            if is_virtual { "virtual" } else { "physical" }
        );
        is_virtual
    }

    fn target_disk(&self) -> Result<String> {
        if let Some(ref device) = self.device {
            if !Path::new(device).exists() {
                return Err(KickstartError::DeviceNotFound(device.clone()));
            }
            info!("Using configured disk {}", device);
            return Ok(device.clone());
        }

        let output = run_command_output("lsblk", &["-nd", "--output", "NAME,TYPE"])
            .map_err(|e| KickstartError::DeviceNotFound(e.to_string()))?;
        let disk = first_installable_disk(&output)
            .ok_or_else(|| KickstartError::DeviceNotFound(output.clone()))?;
        info!("First usable disk is {}", disk);
        Ok(disk)
    }

    fn disk_size_mb(&self, disk: &str) -> Result<u64> {
        info!("Getting {} size", disk);

        let name = Path::new(disk)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| KickstartError::DeviceNotFound(disk.to_string()))?;

        let sysfs_bytes = read_sysfs_u64(&name, "size").map(|sectors| {
            // sysfs always counts 512-byte sectors
            sectors * 512
        });

        let size_mb = match sysfs_bytes {
            Some(bytes) if bytes > 0 => bytes / 1_000_000,
            _ => {
                warn!("No sysfs size for {}, asking parted", disk);
                let output = run_command_output("parted", &["-s", disk, "unit", "mb", "print"])
                    .map_err(|e| KickstartError::DiskSizeUnreadable {
                        device: disk.to_string(),
                        reason: e.to_string(),
                    })?;
                parse_parted_size(&output).ok_or_else(|| KickstartError::DiskSizeUnreadable {
                    device: disk.to_string(),
                    reason: format!("unexpected parted output: {}", output),
                })?
            }
        };

        info!("Disk {} size is {} MB", disk, size_mb);
        Ok(size_mb)
    }
}

impl FixedInspector {
    pub fn new(disk_size_mb: u64, memory_mb: u64, firmware: Firmware) -> Self {
        Self {
            memory_mb,
            firmware,
            is_virtual: true,
            disk: "/dev/vda".to_string(),
            disk_size_mb,
        }
    }

    pub fn physical(mut self) -> Self {
        self.is_virtual = false;
        self
    }

    pub fn with_disk(mut self, disk: &str) -> Self {
        self.disk = disk.to_string();
        self
    }
}

impl DiskInspector for FixedInspector {
    fn memory_mb(&self) -> Result<u64> {
        Ok(self.memory_mb)
    }

    fn firmware(&self) -> Firmware {
        self.firmware
    }

    fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    fn target_disk(&self) -> Result<String> {
        Ok(self.disk.clone())
    }

    fn disk_size_mb(&self, disk: &str) -> Result<u64> {
        if disk != self.disk {
            return Err(KickstartError::DeviceNotFound(disk.to_string()));
        }
        Ok(self.disk_size_mb)
    }
}

/// Get the partition naming prefix for a device
/// e.g., /dev/sda -> /dev/sda, /dev/nvme0n1 -> /dev/nvme0n1p
pub fn partition_prefix(device: &str) -> String {
    if device.contains("nvme") || device.contains("mmcblk") || device.contains("loop") {
        format!("{}p", device)
    } else {
        device.to_string()
    }
}

/// Get partition path for a device and partition number
pub fn partition_path(device: &str, partition_num: u32) -> String {
    format!("{}{}", partition_prefix(device), partition_num)
}

/// Disk space the allocator may hand out, in MB
///
/// 1 MB is kept free at each end of the disk; physical machines also keep
/// `reserve_percent` of the rest unallocated.
pub fn usable_disk_space(disk_mb: u64, is_virtual: bool, reserve_percent: u8) -> u64 {
    let usable = disk_mb.saturating_sub(2);
    if is_virtual || reserve_percent == 0 {
        return usable;
    }
    let keep = 100 - u128::from(reserve_percent.min(100));
    let reduced = (u128::from(usable) * keep / 100) as u64;
    info!(
        "Reducing usable disk space by {}% from {} to {}",
        reserve_percent, usable, reduced
    );
    reduced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_disk_skips_zram_and_partitions() {
        let lsblk = "zram0 disk\nsr0   rom\nsda   disk\nvdb   disk\n";
        assert_eq!(first_installable_disk(lsblk).as_deref(), Some("/dev/sda"));
        assert_eq!(first_installable_disk("zram0 disk\nnvme0n1 disk\n"), None);
    }

    #[test]
    fn parted_size_is_parsed() {
        let out = "Model: Virtio Block Device (virtblk)\n\
                   Disk /dev/vda: 21475MB\n\
                   Sector size (logical/physical): 512B/512B\n";
        assert_eq!(parse_parted_size(out), Some(21475));
        assert_eq!(parse_parted_size("Error: no disk"), None);
    }

    #[test]
    fn detects_hypervisor_vendors() {
        assert!(is_virtual_vendor("Manufacturer: QEMU\nProduct Name: Standard PC"));
        assert!(is_virtual_vendor("Product Name: VirtualBox"));
        assert!(!is_virtual_vendor("Manufacturer: Dell Inc."));
    }

    #[test]
    fn meminfo_is_converted_to_mb() {
        let meminfo = "MemTotal:       16318784 kB\nMemFree:         1000 kB\n";
        assert_eq!(parse_meminfo_mb(meminfo), Some(15936));
    }

    #[test]
    fn usable_space_keeps_margins_and_reserve() {
        assert_eq!(usable_disk_space(20002, true, 5), 20000);
        assert_eq!(usable_disk_space(20002, false, 5), 19000);
        assert_eq!(usable_disk_space(20002, false, 0), 20000);
        assert_eq!(usable_disk_space(1, true, 5), 0);
        assert_eq!(usable_disk_space(u64::MAX, false, 50), (u64::MAX - 2) / 2);
    }

    #[test]
    fn partition_paths_follow_kernel_naming() {
        assert_eq!(partition_path("/dev/sda", 3), "/dev/sda3");
        assert_eq!(partition_path("/dev/nvme0n1", 1), "/dev/nvme0n1p1");
    }

    #[test]
    fn fixed_inspector_only_knows_its_disk() {
        let inspector = FixedInspector::new(20000, 8192, Firmware::Gpt);
        assert_eq!(inspector.target_disk().unwrap(), "/dev/vda");
        assert_eq!(inspector.disk_size_mb("/dev/vda").unwrap(), 20000);
        assert!(inspector.disk_size_mb("/dev/sdz").is_err());
    }
}
