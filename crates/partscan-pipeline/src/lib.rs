//! # partscan Pipeline
//!
//! Backing stores for the partscan partition walker.
//!
//! Every pipeline implements [`ByteSource`](partscan_core::ByteSource):
//! - **MemoryPipeline**: Owned in-memory image (tests, small buffers)
//! - **MmapPipeline**: Memory-mapped image file
//! - **StreamPipeline**: Any `Read + Seek` stream
//!
//! ## Example
//!
//! ```rust,no_run
//! use partscan_core::ByteSource;
//! use partscan_pipeline::MmapPipeline;
//! use std::path::Path;
//!
//! let mut image = MmapPipeline::open(Path::new("disk.img")).unwrap();
//! let mut sector = [0u8; 512];
//! image.read_exact_at(0, &mut sector).unwrap();
//! ```

pub mod memory;
pub mod mmap;
pub mod stream;

pub use memory::MemoryPipeline;
pub use mmap::MmapPipeline;
pub use stream::StreamPipeline;
