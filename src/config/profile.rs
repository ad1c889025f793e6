//! Pre-script configuration structure

use crate::config::request::PartitionRequest;
use crate::config::targets::Target;
use crate::utils::error::{KickstartError, Result};
use serde::{Deserialize, Serialize};

/// Allocator indices reserved below this offset and at the swap index
/// leave room for this many requests.
pub const MAX_REQUESTS: usize = 89;

/// Main pre-script configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KickstartConfig {
    /// Partitioning target
    pub target: Target,
    /// Put every non-boot partition into one LVM volume group
    pub lvm: bool,
    /// Explicit target disk (skips detection)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Partition list used by the `custom` target
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionRequest>,
    pub disk: DiskConfig,
    pub output: OutputConfig,
    pub hostname: HostnameConfig,
    pub packages: PackagesConfig,
    pub users: UsersConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Share of usable space kept free on physical hardware
    pub physical_reserve_percent: u8,
    /// Delay after partitioning so the kernel re-reads the table
    pub settle_seconds: u64,
    /// EFI system partition size (GPT only)
    pub efi_size_mb: u64,
    pub efi_filesystem: String,
    pub boot_size_mb: u64,
    pub boot_filesystem: String,
    /// LVM volume group name
    pub volume_group: String,
    /// LVM physical extent size in KiB
    pub pe_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub log_file: String,
    pub partitions: String,
    pub packages: String,
    pub hostname: String,
    pub users: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostnameConfig {
    pub physical: String,
    #[serde(rename = "virtual")]
    pub virtual_machine: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Add `physical` packages on physical machines
    pub add_physical: bool,
    /// Exclude `virtual_exclude` packages on virtual machines
    pub remove_virtual: bool,
    pub physical: Vec<String>,
    pub virtual_exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    /// Passwords are hashes (`openssl passwd -6`), not plain text
    pub crypted: bool,
    pub root_password: String,
    pub name: String,
    pub password: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            physical_reserve_percent: 5,
            settle_seconds: 3,
            efi_size_mb: 600,
            efi_filesystem: "fat32".to_string(),
            boot_size_mb: 1024,
            boot_filesystem: "xfs".to_string(),
            volume_group: "vg00".to_string(),
            pe_size: 4096,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_file: "/tmp/prescript.log".to_string(),
            partitions: "/tmp/partitions".to_string(),
            packages: "/tmp/packages".to_string(),
            hostname: "/tmp/hostname".to_string(),
            users: "/tmp/users".to_string(),
        }
    }
}

impl Default for HostnameConfig {
    fn default() -> Self {
        Self {
            physical: "pmv43.npf.local".to_string(),
            virtual_machine: "vmv43.npf.local".to_string(),
        }
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            add_physical: true,
            remove_virtual: true,
            physical: ["lm_sensors", "smartmontools"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            virtual_exclude: [
                "linux-firmware",
                "a*-firmware",
                "i*-firmware",
                "lib*firmware",
                "n*firmware",
                "plymouth",
                "pipewire",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for UsersConfig {
    fn default() -> Self {
        // Output of `openssl passwd -6 MySuperSecretPWD123!` / `MySecretPWD123!`
        Self {
            crypted: true,
            root_password: r"$6$tbqw2foUFoYWayGy$6g13/1NgjNlPvXH7nwRyfg3ROfr6d01MUUbt0I2OubtY/zGHjhn2BveYoo8L.BgGXHNq7jKrTtS5lR8ugirom0".to_string(),
            name: "myuser".to_string(),
            password: r"$6$n4c4LJmfmwTgF80z$bPWqMYIVcMN9cK..MTAIXj.Rp2Q/AzhRd8dK4GXUY7GsVerQD8oP0nds.We.WrYOCX5bw8Yaonef0g6dBZxat.".to_string(),
        }
    }
}

impl KickstartConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: KickstartConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Generate a sample configuration
    pub fn sample() -> Self {
        Self {
            target: Target::Hv,
            ..Self::default()
        }
    }

    /// Partition requests for the selected target
    pub fn requests(&self) -> Vec<PartitionRequest> {
        self.target
            .requests()
            .unwrap_or_else(|| self.partitions.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let requests = self.requests();

        if requests.is_empty() {
            return Err(KickstartError::ValidationError(format!(
                "target {} has no partitions",
                self.target
            )));
        }
        if requests.len() > MAX_REQUESTS {
            return Err(KickstartError::ValidationError(format!(
                "at most {} partitions can be requested, got {}",
                MAX_REQUESTS,
                requests.len()
            )));
        }

        for req in &requests {
            if req.filesystem.trim().is_empty() {
                return Err(KickstartError::ValidationError(
                    "partition filesystem cannot be empty".to_string(),
                ));
            }
            if let Some(ref mp) = req.mountpoint {
                if !mp.starts_with('/') && mp != "swap" {
                    return Err(KickstartError::ValidationError(format!(
                        "mountpoint must be absolute: {}",
                        mp
                    )));
                }
            }
            // Logical volumes are created by the installer, so a filesystem
            // we format ourselves must sit on a real partition.
            if self.lvm && req.mountpoint.is_none() {
                return Err(KickstartError::ValidationError(format!(
                    "partition {} has no mountpoint, which is not supported inside LVM",
                    req.label.as_deref().unwrap_or(&req.filesystem)
                )));
            }
        }

        if self.disk.physical_reserve_percent >= 100 {
            return Err(KickstartError::ValidationError(
                "physical_reserve_percent must be below 100".to_string(),
            ));
        }
        if self.lvm && self.disk.volume_group.trim().is_empty() {
            return Err(KickstartError::ValidationError(
                "volume group name cannot be empty".to_string(),
            ));
        }
        if self.users.name.is_empty() || self.users.name.contains(' ') {
            return Err(KickstartError::ValidationError(format!(
                "invalid user name: {:?}",
                self.users.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::request::RequestSize;

    #[test]
    fn empty_file_gives_script_defaults() {
        let cfg = KickstartConfig::from_toml("").unwrap();
        assert_eq!(cfg, KickstartConfig::default());
        assert_eq!(cfg.target, Target::Anssi);
        assert!(!cfg.lvm);
        assert_eq!(cfg.disk.physical_reserve_percent, 5);
        assert_eq!(cfg.output.partitions, "/tmp/partitions");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sample_round_trips_through_toml() {
        let sample = KickstartConfig::sample();
        let text = toml::to_string_pretty(&sample).unwrap();
        assert_eq!(KickstartConfig::from_toml(&text).unwrap(), sample);
    }

    #[test]
    fn bad_target_is_reported() {
        let err = KickstartConfig::from_toml("target = \"nope\"").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn custom_target_uses_config_partitions() {
        let cfg = KickstartConfig::from_toml(
            r#"
            target = "custom"
            [[partitions]]
            size = true
            filesystem = "ext4"
            mountpoint = "/"
            "#,
        )
        .unwrap();
        let reqs = cfg.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].size, RequestSize::Fill);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn custom_target_without_partitions_is_invalid() {
        let cfg = KickstartConfig {
            target: Target::Custom,
            ..KickstartConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unmounted_partition_rejected_under_lvm() {
        let cfg = KickstartConfig {
            target: Target::Stateless,
            lvm: true,
            ..KickstartConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(KickstartError::ValidationError(_))
        ));
    }
}
