//! # partscan Core
//!
//! Core traits, types, and error handling for the partscan partition walker.
//!
//! This crate provides the foundational abstractions shared by the walker and
//! its collaborators:
//! - **ByteSource**: Byte-addressable backing store (image file, memory, stream)
//! - **NestedScanner**: Recursive content scanner invoked on each discovered region
//! - **DetectionSink**: Receiver for heuristic detections
//! - **ZoneTable**: Read-only view of a discovered partition layout
//! - **IntervalSet**: Overlap checker used by the intersection heuristic
//! - **WalkBudget**: Hard ceiling on the partitions a single scan may examine
//!
//! ## Example
//!
//! ```rust,no_run
//! use partscan_core::{ByteSource, Result};
//!
//! fn first_sector(source: &mut dyn ByteSource) -> Result<[u8; 512]> {
//!     let mut sector = [0u8; 512];
//!     source.read_exact_at(0, &mut sector)?;
//!     Ok(sector)
//! }
//! ```

pub mod budget;
pub mod config;
pub mod error;
pub mod intersection;
pub mod security;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use budget::WalkBudget;
pub use config::ScanConfig;
pub use error::{Error, Result};
pub use intersection::{IntervalSet, Overlap};
pub use security::*;
pub use traits::{ByteSource, DetectionSink, NestedScanner, ZoneTable};
pub use types::{DeclaredKind, Extent, ScanOutcome, ScanSummary, Verdict, Zone};
