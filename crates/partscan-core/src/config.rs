//! Scan configuration

use crate::security::{validate_sector_size, DEFAULT_MAX_PARTITIONS, DEFAULT_SECTOR_SIZE};
use serde::{Deserialize, Serialize};

/// Engine options recognised by the partition walker
///
/// Missing fields fall back to their defaults when deserialized, so a
/// configuration file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Sector size in bytes (0 selects the 512-byte default)
    pub sector_size: u32,

    /// Ceiling on primary + logical partitions examined in one scan
    pub max_partitions: u32,

    /// Run the partition intersection heuristic before dispatch
    pub partition_intersection_heuristic: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sector_size: 0,
            max_partitions: DEFAULT_MAX_PARTITIONS,
            partition_intersection_heuristic: false,
        }
    }
}

impl ScanConfig {
    /// Set the sector size override
    pub fn with_sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Set the partition ceiling
    pub fn with_max_partitions(mut self, max_partitions: u32) -> Self {
        self.max_partitions = max_partitions;
        self
    }

    /// Enable or disable the intersection heuristic
    pub fn with_intersection_heuristic(mut self, enabled: bool) -> Self {
        self.partition_intersection_heuristic = enabled;
        self
    }

    /// Resolve and validate the sector size actually used for the walk
    pub fn effective_sector_size(&self) -> crate::Result<u32> {
        let sector_size = if self.sector_size == 0 {
            DEFAULT_SECTOR_SIZE
        } else {
            self.sector_size
        };
        validate_sector_size(sector_size)?;
        Ok(sector_size)
    }
}
