//! Declarative partition requests

use crate::utils::error::KickstartError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested size of a partition, before allocation
///
/// Deserializes from an integer (MB), a `"NN%"` string (share of the space
/// left after fixed sizes) or `true` (fill whatever remains).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSize", into = "RawSize")]
pub enum RequestSize {
    Fixed(u64),
    Percent(u32),
    Fill,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSize {
    Flag(bool),
    Megabytes(u64),
    Text(String),
}

impl TryFrom<RawSize> for RequestSize {
    type Error = KickstartError;

    fn try_from(raw: RawSize) -> Result<Self, Self::Error> {
        match raw {
            RawSize::Flag(true) => Ok(Self::Fill),
            RawSize::Flag(false) => Err(KickstartError::ConfigError(
                "partition size `false` is meaningless, use `true` to fill remaining space"
                    .to_string(),
            )),
            RawSize::Megabytes(0) => Err(KickstartError::ConfigError(
                "partition size must be greater than 0 MB".to_string(),
            )),
            RawSize::Megabytes(mb) => Ok(Self::Fixed(mb)),
            RawSize::Text(text) => text.parse(),
        }
    }
}

impl From<RequestSize> for RawSize {
    fn from(size: RequestSize) -> Self {
        match size {
            RequestSize::Fixed(mb) => Self::Megabytes(mb),
            RequestSize::Percent(p) => Self::Text(format!("{}%", p)),
            RequestSize::Fill => Self::Flag(true),
        }
    }
}

impl std::str::FromStr for RequestSize {
    type Err = KickstartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || KickstartError::ConfigError(format!("invalid partition size: {:?}", s));

        if let Some(pct) = s.strip_suffix('%') {
            let pct: u32 = pct.trim().parse().map_err(|_| bad())?;
            if pct == 0 {
                return Err(bad());
            }
            return Ok(Self::Percent(pct));
        }
        match s {
            "true" | "fill" => Ok(Self::Fill),
            _ => match s.parse::<u64>() {
                Ok(mb) if mb > 0 => Ok(Self::Fixed(mb)),
                _ => Err(bad()),
            },
        }
    }
}

impl fmt::Display for RequestSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(mb) => write!(f, "{} MB", mb),
            Self::Percent(p) => write!(f, "{}%", p),
            Self::Fill => write!(f, "remaining"),
        }
    }
}

/// One entry of the declarative target list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRequest {
    pub size: RequestSize,
    /// Filesystem type, passed through opaquely (e.g. "xfs", "ext4")
    #[serde(alias = "fs")]
    pub filesystem: String,
    /// None: create the filesystem ourselves, the installer never mounts it
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Mount options handed to the installer (`--fsoptions`)
    #[serde(default, alias = "fsoptions", skip_serializing_if = "Option::is_none")]
    pub fs_options: Option<String>,
}

impl PartitionRequest {
    pub fn new(size: RequestSize, filesystem: &str, mountpoint: Option<&str>) -> Self {
        Self {
            size,
            filesystem: filesystem.to_string(),
            mountpoint: mountpoint.map(str::to_string),
            label: None,
            fs_options: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_fs_options(mut self, options: &str) -> Self {
        self.fs_options = Some(options.to_string());
        self
    }
}
