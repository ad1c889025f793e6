//! Built-in partitioning targets
//!
//! Boot, EFI and swap are added by the allocator; targets only list data
//! partitions.

use crate::config::request::{PartitionRequest, RequestSize};
use crate::utils::error::KickstartError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    /// Standard KVM hypervisor
    Hv,
    /// Stateless KVM hypervisor
    HvStateless,
    /// Stateless machine with a separate state partition
    Stateless,
    /// One big root partition
    Generic,
    /// ANSSI-BP028 high profile compatible scheme
    #[default]
    Anssi,
    /// Partitions listed in the configuration file
    Custom,
}

impl Target {
    pub const ALL: [Target; 6] = [
        Target::Hv,
        Target::HvStateless,
        Target::Stateless,
        Target::Generic,
        Target::Anssi,
        Target::Custom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hv => "hv",
            Self::HvStateless => "hv-stateless",
            Self::Stateless => "stateless",
            Self::Generic => "generic",
            Self::Anssi => "anssi",
            Self::Custom => "custom",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Hv => "KVM hypervisor: root + libvirt images filling the disk",
            Self::HvStateless => "Stateless KVM hypervisor with a STATEFULRW partition",
            Self::Stateless => "Stateless machine: root and STATEFULRW share the disk",
            Self::Generic => "One big root partition",
            Self::Anssi => "ANSSI-BP028 high profile compatible scheme",
            Self::Custom => "Partitions from the [[partitions]] config table",
        }
    }

    /// Request list for built-in targets; `None` for [`Target::Custom`]
    pub fn requests(&self) -> Option<Vec<PartitionRequest>> {
        let list = match self {
            Self::Hv => hv(),
            Self::HvStateless => hv_stateless(),
            Self::Stateless => stateless(),
            Self::Generic => generic(),
            Self::Anssi => anssi(),
            Self::Custom => return None,
        };
        Some(list)
    }
}

impl std::str::FromStr for Target {
    type Err = KickstartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Target::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| KickstartError::BadTarget(s.to_string()))
    }
}

impl TryFrom<String> for Target {
    type Error = KickstartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.name().to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn xfs(size: RequestSize, mountpoint: Option<&str>) -> PartitionRequest {
    PartitionRequest::new(size, "xfs", mountpoint)
}

fn hv() -> Vec<PartitionRequest> {
    vec![
        xfs(RequestSize::Fixed(30720), Some("/")),
        xfs(RequestSize::Fill, Some("/var/lib/libvirt/images")),
    ]
}

fn hv_stateless() -> Vec<PartitionRequest> {
    vec![
        xfs(RequestSize::Fixed(30720), Some("/")),
        xfs(RequestSize::Fill, Some("/var/lib/libvirt/images")),
        xfs(RequestSize::Fixed(30720), None).with_label("STATEFULRW"),
    ]
}

fn stateless() -> Vec<PartitionRequest> {
    vec![
        xfs(RequestSize::Fill, Some("/")),
        xfs(RequestSize::Fill, None).with_label("STATEFULRW"),
    ]
}

fn generic() -> Vec<PartitionRequest> {
    vec![xfs(RequestSize::Fill, Some("/"))]
}

fn anssi() -> Vec<PartitionRequest> {
    vec![
        xfs(RequestSize::Fixed(30720), Some("/")),
        xfs(RequestSize::Fixed(40960), Some("/home")).with_fs_options("nodev,nosuid"),
        xfs(RequestSize::Fixed(10240), Some("/tmp")).with_fs_options("nodev,nosuid,noexec"),
        xfs(RequestSize::Fill, Some("/var")).with_fs_options("nodev,nosuid"),
        xfs(RequestSize::Fixed(30720), Some("/var/log")).with_fs_options("nodev,nosuid,noexec"),
        xfs(RequestSize::Fixed(10240), Some("/var/log/audit"))
            .with_fs_options("nodev,nosuid,noexec"),
        xfs(RequestSize::Fixed(10240), Some("/var/tmp")).with_fs_options("nodev,nosuid,noexec"),
    ]
}
