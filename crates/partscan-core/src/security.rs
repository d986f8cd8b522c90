//! Security validation constants and helpers
//!
//! This module defines security limits and validation functions used while
//! walking partition tables taken from untrusted images.

use crate::Error;

/// Default sector size when the configuration leaves it unset
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Minimum sector size we'll accept (must hold a full boot record)
pub const MIN_SECTOR_SIZE: u32 = 512;

/// Maximum sector size we'll accept (4KB - common for advanced format)
pub const MAX_SECTOR_SIZE: u32 = 4096;

/// Default ceiling on primary + logical partitions examined per scan
pub const DEFAULT_MAX_PARTITIONS: u32 = 50;

/// Maximum file size for memory mapping (16 GB - practical limit for most systems)
pub const MAX_MMAP_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Safely multiply two u64 values with overflow checking
///
/// # Security
/// Prevents integer overflow in extent calculations
pub fn checked_multiply_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| Error::extent_overflow(format!("{}: multiplication overflow", context)))
}

/// Safely add two u64 values with overflow checking
pub fn checked_add_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| Error::extent_overflow(format!("{}: addition overflow", context)))
}

/// Convert a sector count to bytes
pub fn sectors_to_bytes(sectors: u64, sector_size: u32, context: &str) -> crate::Result<u64> {
    checked_multiply_u64(sectors, sector_size as u64, context)
}

/// Check that `wanted` bytes at `offset` lie inside a source of `source_len` bytes
///
/// # Security
/// Rejects reads whose end would wrap around u64 as well as reads past the end
pub fn check_read_bounds(source_len: u64, offset: u64, wanted: usize) -> crate::Result<()> {
    match offset.checked_add(wanted as u64) {
        Some(end) if end <= source_len => Ok(()),
        _ => Err(Error::ShortRead {
            offset,
            wanted,
            available: source_len.saturating_sub(offset),
        }),
    }
}

/// Validate sector size is reasonable
pub fn validate_sector_size(sector_size: u32) -> crate::Result<()> {
    if !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&sector_size) {
        return Err(Error::invalid_sector_size(format!(
            "{} (must be {}-{})",
            sector_size, MIN_SECTOR_SIZE, MAX_SECTOR_SIZE
        )));
    }

    // Sector size should be power of 2
    if !sector_size.is_power_of_two() {
        return Err(Error::invalid_sector_size(format!(
            "{} is not a power of 2",
            sector_size
        )));
    }

    Ok(())
}
