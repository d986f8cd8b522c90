//! Core traits for partscan

use crate::{
    error::Result,
    types::{DeclaredKind, Extent, Verdict, Zone},
};

/// Trait for byte-addressable backing stores
pub trait ByteSource: Send {
    /// Get the total size of the source in bytes
    fn length(&self) -> u64;

    /// Fill `buf` with the bytes starting at `offset`
    ///
    /// Fails with `Error::ShortRead` if the source ends before `buf` is full,
    /// including when `offset + buf.len()` does not fit in a u64.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Read `length` bytes at `offset` into a new buffer
    fn read_vec_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

/// Trait for the recursive content scanner
pub trait NestedScanner {
    /// Scan `extent` of `source`, which the walker believes holds `kind`
    fn scan(&mut self, source: &mut dyn ByteSource, extent: Extent, kind: DeclaredKind)
        -> Result<Verdict>;
}

/// Trait for the detection-reporting sink
pub trait DetectionSink {
    /// Report a heuristic, non-definitive detection
    fn report_potentially_unwanted(&mut self, label: &str) -> Result<Verdict>;
}

/// Trait for partition tables (zone tables)
pub trait ZoneTable: Send + Sync {
    /// Get a human-readable identifier for this zone table type
    fn identify(&self) -> &str;

    /// Get all zones in this partition table
    fn enumerate_zones(&self) -> &[Zone];

    /// Get a specific zone by index
    fn get_zone(&self, index: usize) -> Option<&Zone> {
        self.enumerate_zones().get(index)
    }
}
