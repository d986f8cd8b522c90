//! # partscan Zones
//!
//! Partition table walking for partscan.
//!
//! This crate implements the MBR (Master Boot Record) walker: it validates
//! the boot sector, follows the EBR chain of the extended partition, and
//! hands the bootstrap region and every partition to a nested scanner. An
//! optional heuristic reports partitions that overlap.
//!
//! ## Example
//!
//! ```rust,no_run
//! use partscan_core::{ScanConfig, ZoneTable};
//! use partscan_pipeline::MmapPipeline;
//! use partscan_zones::MbrZoneTable;
//! use std::path::Path;
//!
//! let mut image = MmapPipeline::open(Path::new("disk.img")).unwrap();
//! let table = MbrZoneTable::parse(&mut image, &ScanConfig::default()).unwrap();
//!
//! println!("Partition table: {}", table.identify());
//! for zone in table.enumerate_zones() {
//!     println!("  {}", zone);
//! }
//! ```

pub mod mbr;

pub use mbr::{check_buffer, check_source, scan, MbrCheck, MbrZoneTable};
