//! Structural checks for decoded boot records
//!
//! Both checks are fail-fast: the first violation found is returned.

use super::types::{BootRecord, PartitionEntry};
use partscan_core::{Error, Result};

/// Entries of an EBR whose status is checked; the trailing two are reserved
const EBR_CHECKED_ENTRIES: usize = BootRecord::NUM_ENTRIES - 2;

fn check_status(index: usize, entry: &PartitionEntry) -> Result<()> {
    if !entry.has_valid_status() {
        tracing::debug!("Invalid boot record status 0x{:02X} in entry {}", entry.status, index);
        return Err(Error::InvalidStatus {
            index,
            status: entry.status,
        });
    }
    Ok(())
}

fn check_signature(record: &BootRecord) -> Result<()> {
    if record.signature != BootRecord::SIGNATURE {
        tracing::debug!("Invalid boot record signature 0x{:04X}", record.signature);
        return Err(Error::BadSignature(record.signature));
    }
    Ok(())
}

/// Validate a master boot record against the whole image
///
/// Checks, in order: each entry's status and that its extent ends within
/// `maplen`; the signature; that the image holds at least two sectors.
pub fn check_mbr(record: &BootRecord, maplen: u64, sector_size: u32) -> Result<()> {
    for (index, entry) in record.entries.iter().enumerate() {
        check_status(index, entry)?;

        let extent = entry.extent(sector_size)?;
        let end = extent.end()?;
        if end > maplen {
            tracing::debug!("Partition entry {} {} exceeds image of {} bytes", index, extent, maplen);
            return Err(Error::extent_overflow(format!(
                "partition entry {} ends at byte {} but the image holds {} bytes",
                index, end, maplen
            )));
        }
    }

    check_signature(record)?;

    let sectors = maplen / sector_size as u64;
    if sectors < 2 {
        tracing::debug!("Bootstrap code or file is too small to hold disk image");
        return Err(Error::ImageTooSmall {
            sectors,
            sector_size,
        });
    }

    Ok(())
}

/// Validate an extended boot record
///
/// Only the status of the first two entries and the signature are checked.
/// Extents are bounded by the chain walker against the owning extended
/// partition, and the reserved slots are checked there too.
pub fn check_ebr(record: &BootRecord) -> Result<()> {
    for (index, entry) in record.entries.iter().take(EBR_CHECKED_ENTRIES).enumerate() {
        check_status(index, entry)?;
    }

    check_signature(record)
}
