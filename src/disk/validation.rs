//! Schema validation against the disk budget

use crate::disk::layouts::PartitionSchema;
use crate::utils::error::{KickstartError, Result};
use tracing::{error, info};

/// Check that the schema fits in `usable_mb`
///
/// Logs every entry for the audit trail and returns the total allocated
/// size. Logical volumes count against the same budget as partitions.
pub fn validate_schema(schema: &PartitionSchema, usable_mb: u64) -> Result<u64> {
    for part in schema.partitions() {
        info!("PART {}: {}", part.index, part);
    }
    for vol in schema.volumes() {
        info!("LV {}: {}", vol.index, vol);
    }

    let total_mb = schema.total_mb();
    if total_mb > usable_mb {
        error!(
            "Total required partition space {} exceeds disk space {}",
            total_mb, usable_mb
        );
        return Err(KickstartError::SchemaTooLarge {
            total_mb,
            usable_mb,
        });
    }

    info!("Total allocated disk size: {} / {}", total_mb, usable_mb);
    Ok(total_mb)
}
