//! Error types for kspart

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KickstartError {
    #[error("Bad target given: {0}")]
    BadTarget(String),

    #[error("Cannot find usable disk: {0}")]
    DeviceNotFound(String),

    #[error("Cannot get {device} size: {reason}")]
    DiskSizeUnreadable { device: String, reason: String },

    #[error(
        "MBR mode cannot hold {requested} data partitions next to boot and swap without LVM (max 2)"
    )]
    MbrPartitionLimit { requested: usize },

    #[error("Percentages add up to more than 100%: {total}")]
    PercentageOvercommit { total: u32 },

    #[error("Partition schema does not fit: {free_mb} MB of free space left")]
    InsufficientSpace { free_mb: i64 },

    #[error("Total required partition space {total_mb} MB exceeds disk space {usable_mb} MB")]
    SchemaTooLarge { total_mb: u64, usable_mb: u64 },

    #[error("Setting label on FS {0} is not implemented")]
    LabelUnsupported(String),

    #[error("Command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Missing required tools: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("This program must be run as root")]
    NotRoot,

    #[error("Interrupted before any disk was modified")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KickstartError>;

/// Pipeline phase, used to report which step failed.
///
/// The numeric exit codes are consumed by the calling kickstart file and
/// must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Target,
    DiskDetection,
    ZeroDisk,
    DiskLabel,
    DiskSize,
    Schema,
    Validation,
    Partitioning,
    Filesystems,
    PartitionsFile,
    PackagesFile,
    HostnameFile,
    UsersFile,
}

impl Phase {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ZeroDisk => 1,
            Self::DiskLabel => 2,
            Self::DiskSize => 3,
            Self::Schema => 4,
            Self::Validation => 5,
            Self::Partitioning => 6,
            Self::Filesystems => 7,
            Self::PartitionsFile => 8,
            Self::PackagesFile => 9,
            Self::DiskDetection | Self::HostnameFile => 10,
            Self::UsersFile => 11,
            Self::Target => 222,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Target => "target selection",
            Self::DiskDetection => "disk detection",
            Self::ZeroDisk => "disk zeroing",
            Self::DiskLabel => "disk labeling",
            Self::DiskSize => "disk size measurement",
            Self::Schema => "partition schema",
            Self::Validation => "schema validation",
            Self::Partitioning => "partitioning",
            Self::Filesystems => "filesystem setup",
            Self::PartitionsFile => "partitions file",
            Self::PackagesFile => "packages file",
            Self::HostnameFile => "hostname file",
            Self::UsersFile => "users file",
        };
        f.write_str(name)
    }
}

/// An error tagged with the phase it happened in
#[derive(Error, Debug)]
#[error("{phase} failed: {source}")]
pub struct PhaseError {
    pub phase: Phase,
    #[source]
    pub source: KickstartError,
}

impl PhaseError {
    pub fn exit_code(&self) -> i32 {
        self.phase.exit_code()
    }
}

/// Attach a [`Phase`] to a fallible step
pub trait InPhase<T> {
    fn in_phase(self, phase: Phase) -> std::result::Result<T, PhaseError>;
}

impl<T> InPhase<T> for Result<T> {
    fn in_phase(self, phase: Phase) -> std::result::Result<T, PhaseError> {
        self.map_err(|source| PhaseError { phase, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_installer_contract() {
        assert_eq!(Phase::ZeroDisk.exit_code(), 1);
        assert_eq!(Phase::Schema.exit_code(), 4);
        assert_eq!(Phase::Validation.exit_code(), 5);
        assert_eq!(Phase::DiskDetection.exit_code(), 10);
        assert_eq!(Phase::UsersFile.exit_code(), 11);
        assert_eq!(Phase::Target.exit_code(), 222);
    }

    #[test]
    fn in_phase_wraps_source() {
        let res: Result<()> = Err(KickstartError::PercentageOvercommit { total: 150 });
        let err = res.in_phase(Phase::Schema).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("150"));
    }
}
