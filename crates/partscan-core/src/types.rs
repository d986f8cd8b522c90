//! Core types for partscan

use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous byte range inside the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// Offset from the start of the image in bytes
    pub offset: u64,

    /// Length in bytes
    pub length: u64,
}

impl Extent {
    /// Create a new extent
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Build an extent from an LBA / sector-count pair
    pub fn from_sectors(first_lba: u64, num_lba: u64, sector_size: u32) -> crate::Result<Self> {
        let offset = crate::security::sectors_to_bytes(first_lba, sector_size, "extent offset")?;
        let length = crate::security::sectors_to_bytes(num_lba, sector_size, "extent length")?;
        Ok(Self { offset, length })
    }

    /// One past the last byte, with overflow checking
    pub fn end(&self) -> crate::Result<u64> {
        crate::security::checked_add_u64(self.offset, self.length, "extent end")
    }

    /// True if the extent lies entirely within `[start, limit)`
    pub fn fits_within(&self, start: u64, limit: u64) -> bool {
        self.offset >= start && self.end().map_or(false, |end| end <= limit)
    }

    /// Check if this extent covers no bytes
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:08X}, +{})", self.offset, self.length)
    }
}

/// What the walker believes a dispatched region contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredKind {
    /// Unclassified bytes (the boot sector's bootstrap region)
    Any,
    /// Contents of a primary or logical partition
    Partition,
}

impl fmt::Display for DeclaredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredKind::Any => write!(f, "any"),
            DeclaredKind::Partition => write!(f, "partition"),
        }
    }
}

/// Collaborator answer: keep walking or abort the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Nothing conclusive, continue
    Clean,
    /// Scan must stop now (e.g. a definite detection)
    Stop,
}

impl Verdict {
    /// True if the walk must abort
    pub fn is_stop(self) -> bool {
        self == Verdict::Stop
    }
}

/// Statistics of a completed walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Partitions charged against the budget (all passes)
    pub partitions_examined: u32,

    /// Regions handed to the nested scanner, bootstrap included
    pub regions_dispatched: u32,

    /// EBR records read by the dispatch walk
    pub logical_records: u32,

    /// Heuristic detections reported to the sink
    pub intersections_reported: u32,

    /// Walk stopped early because the partition ceiling was reached
    pub budget_exhausted: bool,

    /// Non-fatal irregularities noticed along the way
    pub anomalies: Vec<String>,
}

/// Terminal result of one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    /// Table walked (possibly partially, see `budget_exhausted`)
    Completed(ScanSummary),

    /// A GPT protective or hybrid marker was found; GPT handling applies
    DeferToOtherFormat,

    /// A collaborator asked for the scan to stop
    Stopped(ScanSummary),
}

impl ScanOutcome {
    /// Summary of the walk, if one took place
    pub fn summary(&self) -> Option<&ScanSummary> {
        match self {
            ScanOutcome::Completed(summary) | ScanOutcome::Stopped(summary) => Some(summary),
            ScanOutcome::DeferToOtherFormat => None,
        }
    }
}

/// A zone (partition) within an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Index of this zone in discovery order
    pub index: usize,

    /// Offset from start of image in bytes
    pub offset: u64,

    /// Length of zone in bytes
    pub length: u64,

    /// Type of zone (e.g., "FAT32 (LBA)", "Linux")
    pub zone_type: String,

    /// True for logical partitions found in an EBR chain
    pub logical: bool,
}

impl Zone {
    /// Create a new zone
    pub fn new(index: usize, extent: Extent, zone_type: String) -> Self {
        Self {
            index,
            offset: extent.offset,
            length: extent.length,
            zone_type,
            logical: false,
        }
    }

    /// Mark the zone as a logical partition
    pub fn with_logical(mut self, logical: bool) -> Self {
        self.logical = logical;
        self
    }

    /// Byte range covered by this zone
    pub fn extent(&self) -> Extent {
        Extent::new(self.offset, self.length)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Zone {} [{} @ 0x{:08X}, {} bytes]",
            self.index, self.zone_type, self.offset, self.length
        )?;
        if self.logical {
            write!(f, " (logical)")?;
        }
        Ok(())
    }
}
