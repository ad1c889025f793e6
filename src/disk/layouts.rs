//! Partition schema allocation
//!
//! Turns the declarative request list plus host measurements into a
//! concrete, ordered partition schema. Layout on disk is
//! `| (efi) | boot | request 1 | ... | request n | swap |`, or
//! `| (efi) | boot | lvm pv |` with every other entry as a logical volume.

use crate::config::{DiskConfig, PartitionRequest, RequestSize};
use crate::disk::detection::Firmware;
use crate::utils::error::{KickstartError, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Schema index of the EFI system partition
pub const EFI_INDEX: u32 = 0;
/// Schema index of /boot
pub const BOOT_INDEX: u32 = 1;
/// Requests are shifted by this much so they never collide with boot/EFI
pub const REQUEST_INDEX_OFFSET: u32 = 10;
/// Swap always sorts last
pub const SWAP_INDEX: u32 = 99;

/// Above this much memory, swap equals memory instead of half of it
const LARGE_MEMORY_MB: u64 = 16384;

/// Filesystem name parted expects for swap
pub const SWAP_FILESYSTEM: &str = "linux-swap";

/// A resolved partition (or logical volume)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaEntry {
    /// Ordering key
    pub index: u32,
    pub size_mb: u64,
    pub filesystem: String,
    pub mountpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_options: Option<String>,
}

impl SchemaEntry {
    fn new(index: u32, size_mb: u64, filesystem: &str, mountpoint: &str) -> Self {
        Self {
            index,
            size_mb,
            filesystem: filesystem.to_string(),
            mountpoint: Some(mountpoint.to_string()),
            label: None,
            fs_options: None,
        }
    }

    fn from_request(index: u32, size_mb: u64, req: &PartitionRequest) -> Self {
        Self {
            index,
            size_mb,
            filesystem: req.filesystem.clone(),
            mountpoint: req.mountpoint.clone(),
            label: req.label.clone(),
            fs_options: req.fs_options.clone(),
        }
    }
}

impl fmt::Display for SchemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} MB {} on {}",
            self.size_mb,
            self.filesystem,
            self.mountpoint.as_deref().unwrap_or("-")
        )?;
        if let Some(ref label) = self.label {
            write!(f, " label={}", label)?;
        }
        if let Some(ref opts) = self.fs_options {
            write!(f, " options={}", opts)?;
        }
        Ok(())
    }
}

/// A fully resolved partition schema
///
/// Either plain partitions, or partitions outside LVM (boot, EFI) plus the
/// logical volumes that share one physical partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PartitionSchema {
    Flat {
        partitions: Vec<SchemaEntry>,
    },
    Lvm {
        partitions: Vec<SchemaEntry>,
        volumes: Vec<SchemaEntry>,
    },
}

impl PartitionSchema {
    /// Entries that are real partitions on the disk
    pub fn partitions(&self) -> &[SchemaEntry] {
        match self {
            Self::Flat { partitions } | Self::Lvm { partitions, .. } => partitions,
        }
    }

    /// Entries living inside the LVM volume group
    pub fn volumes(&self) -> &[SchemaEntry] {
        match self {
            Self::Flat { .. } => &[],
            Self::Lvm { volumes, .. } => volumes,
        }
    }

    pub fn is_lvm(&self) -> bool {
        matches!(self, Self::Lvm { .. })
    }

    /// All entries, partitions first then logical volumes
    pub fn entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.partitions().iter().chain(self.volumes().iter())
    }

    /// Sum of every entry size, logical volumes included
    pub fn total_mb(&self) -> u64 {
        self.entries()
            .map(|e| e.size_mb)
            .fold(0u64, u64::saturating_add)
    }
}

/// Inputs of the allocator besides the request list
#[derive(Debug, Clone)]
pub struct AllocationParams {
    pub usable_mb: u64,
    pub firmware: Firmware,
    pub memory_mb: u64,
    pub lvm: bool,
}

/// Swap size for a given amount of memory
pub fn swap_size_mb(memory_mb: u64) -> u64 {
    if memory_mb > LARGE_MEMORY_MB {
        memory_mb
    } else {
        memory_mb / 2
    }
}

/// Partially built schema, sizes of requests tracked by request position
struct Allocation {
    baseline: Vec<SchemaEntry>,
    inner: Vec<SchemaEntry>,
    sizes: Vec<Option<u64>>,
}

impl Allocation {
    /// Saturates at `u64::MAX`; request sizes come straight from config
    fn allocated(&self) -> u64 {
        self.baseline
            .iter()
            .chain(self.inner.iter())
            .map(|e| e.size_mb)
            .chain(self.sizes.iter().flatten().copied())
            .fold(0u64, u64::saturating_add)
    }

    fn free(&self, usable_mb: u64) -> i64 {
        let free = i128::from(usable_mb) - i128::from(self.allocated());
        i64::try_from(free).unwrap_or(if free < 0 { i64::MIN } else { i64::MAX })
    }

    /// Resolve `(request position, percent)` pairs against the current free space
    fn resolve_percentages(&mut self, percents: &[(usize, u32)], usable_mb: u64) -> Result<()> {
        if percents.is_empty() {
            return Ok(());
        }

        let total: u32 = percents.iter().map(|(_, p)| p).sum();
        if total > 100 {
            return Err(KickstartError::PercentageOvercommit { total });
        }

        let free = self.free(usable_mb);
        if free < 0 {
            return Err(KickstartError::InsufficientSpace { free_mb: free });
        }
        let free = free as u64;

        for &(pos, pct) in percents {
            // pct <= 100, so the share never exceeds `free`
            let size = (u128::from(free) * u128::from(pct) / 100) as u64;
            debug!("Request {} gets {}% of {} MB = {} MB", pos, pct, free, size);
            self.sizes[pos] = Some(size);
        }
        Ok(())
    }
}

/// Compute the partition schema for `requests`
///
/// Fixed sizes are taken as is, percentages apply to the space left after
/// fixed sizes, and fill-remaining requests share whatever is left last.
pub fn compute_schema(
    requests: &[PartitionRequest],
    params: &AllocationParams,
    disk: &DiskConfig,
) -> Result<PartitionSchema> {
    // boot + swap + 2 data partitions already use all 4 MBR primaries
    if !params.firmware.is_gpt() && !params.lvm && requests.len() >= 3 {
        return Err(KickstartError::MbrPartitionLimit {
            requested: requests.len(),
        });
    }

    let mut baseline = Vec::new();
    if params.firmware.is_gpt() {
        baseline.push(SchemaEntry::new(
            EFI_INDEX,
            disk.efi_size_mb,
            &disk.efi_filesystem,
            "/boot/efi",
        ));
    }
    baseline.push(SchemaEntry::new(
        BOOT_INDEX,
        disk.boot_size_mb,
        &disk.boot_filesystem,
        "/boot",
    ));

    let swap = SchemaEntry::new(
        SWAP_INDEX,
        swap_size_mb(params.memory_mb),
        SWAP_FILESYSTEM,
        "swap",
    );
    let inner = if params.lvm {
        vec![swap]
    } else {
        baseline.push(swap);
        Vec::new()
    };

    let mut alloc = Allocation {
        baseline,
        inner,
        sizes: vec![None; requests.len()],
    };

    for (pos, req) in requests.iter().enumerate() {
        if let RequestSize::Fixed(mb) = req.size {
            alloc.sizes[pos] = Some(mb);
        }
    }

    let percents: Vec<(usize, u32)> = requests
        .iter()
        .enumerate()
        .filter_map(|(pos, req)| match req.size {
            RequestSize::Percent(p) => Some((pos, p)),
            _ => None,
        })
        .collect();
    alloc.resolve_percentages(&percents, params.usable_mb)?;

    let fillers: Vec<usize> = requests
        .iter()
        .enumerate()
        .filter(|(_, req)| req.size == RequestSize::Fill)
        .map(|(pos, _)| pos)
        .collect();

    let remaining = alloc.free(params.usable_mb);
    if !fillers.is_empty() && remaining < 0 {
        return Err(KickstartError::InsufficientSpace { free_mb: remaining });
    }

    match fillers.len() {
        0 => {}
        1 => alloc.sizes[fillers[0]] = Some(remaining as u64),
        count => {
            // Splitting by percentage keeps several fillers from each
            // claiming the whole remainder.
            let share = (100 / count) as u32;
            let synthetic: Vec<(usize, u32)> = fillers.iter().map(|&pos| (pos, share)).collect();
            alloc.resolve_percentages(&synthetic, params.usable_mb)?;
        }
    }

    let Allocation {
        mut baseline,
        mut inner,
        sizes,
    } = alloc;

    for (pos, (req, size)) in requests.iter().zip(sizes).enumerate() {
        let size = size.ok_or_else(|| {
            KickstartError::ConfigError(format!("request {} was left without a size", pos))
        })?;
        let entry = SchemaEntry::from_request(pos as u32 + REQUEST_INDEX_OFFSET, size, req);
        if params.lvm {
            inner.push(entry);
        } else {
            baseline.push(entry);
        }
    }

    baseline.sort_by_key(|e| e.index);
    inner.sort_by_key(|e| e.index);

    let schema = if params.lvm {
        PartitionSchema::Lvm {
            partitions: baseline,
            volumes: inner,
        }
    } else {
        PartitionSchema::Flat {
            partitions: baseline,
        }
    };

    info!(
        "Computed {} schema: {} partitions, {} logical volumes, {} MB",
        params.firmware,
        schema.partitions().len(),
        schema.volumes().len(),
        schema.total_mb()
    );
    Ok(schema)
}

/// Print schema summary
pub fn print_schema_summary(schema: &PartitionSchema, usable_mb: u64) {
    println!(
        "\nPartition schema ({} / {} MB):",
        schema.total_mb(),
        usable_mb
    );
    println!(
        "{:<6} {:<8} {:>10} {:<12} {:<24}",
        "INDEX", "KIND", "SIZE", "FS", "MOUNT"
    );
    println!("{}", "-".repeat(64));

    let rows = schema
        .partitions()
        .iter()
        .map(|p| (p, "part"))
        .chain(schema.volumes().iter().map(|v| (v, "lv")));
    for (entry, kind) in rows {
        println!(
            "{:<6} {:<8} {:>10} {:<12} {:<24}",
            entry.index,
            kind,
            format!("{} MB", entry.size_mb),
            entry.filesystem,
            entry.mountpoint.as_deref().unwrap_or("-")
        );
    }
    println!();
}
