//! Partition walk error types

use thiserror::Error;

/// The main error type for partscan operations
///
/// Every variant is terminal: the walk that produced it is abandoned and no
/// further regions are dispatched.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the backing store
    #[error("Backing store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing store exhausted before a full record could be read
    #[error("Short read at offset {offset}: wanted {wanted} bytes, {available} available")]
    ShortRead {
        offset: u64,
        wanted: usize,
        available: u64,
    },

    /// Boot record signature is not 0xAA55
    #[error("Invalid boot record signature: expected 0xAA55, got 0x{0:04X}")]
    BadSignature(u16),

    /// Partition entry status byte is neither inactive nor active
    #[error("Invalid status 0x{status:02X} in partition entry {index}")]
    InvalidStatus { index: usize, status: u8 },

    /// Partition extent leaves the region that is allowed to contain it
    #[error("Extent overflow: {0}")]
    ExtentOverflow(String),

    /// EBR chain is structurally broken
    #[error("Malformed EBR chain: {0}")]
    MalformedChain(String),

    /// Image cannot hold a boot sector plus at least one data sector
    #[error("Image too small: {sectors} sector(s) of {sector_size} bytes")]
    ImageTooSmall { sectors: u64, sector_size: u32 },

    /// Image length is not a whole number of sectors
    #[error("Image length {length} is not a multiple of sector size {sector_size}")]
    MisalignedImage { length: u64, sector_size: u32 },

    /// Sector size rejected by the security limits
    #[error("Invalid sector size: {0}")]
    InvalidSectorSize(String),

    /// Internal failure reported by a nested scanner or detection sink
    #[error("Scanner error: {0}")]
    Scanner(String),
}

/// Result type alias for partscan operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an extent overflow error
    pub fn extent_overflow(msg: impl Into<String>) -> Self {
        Error::ExtentOverflow(msg.into())
    }

    /// Create a malformed chain error
    pub fn malformed_chain(msg: impl Into<String>) -> Self {
        Error::MalformedChain(msg.into())
    }

    /// Create an invalid sector size error
    pub fn invalid_sector_size(msg: impl Into<String>) -> Self {
        Error::InvalidSectorSize(msg.into())
    }

    /// Create a scanner error
    pub fn scanner(msg: impl Into<String>) -> Self {
        Error::Scanner(msg.into())
    }

    /// True for errors caused by the image layout rather than the environment
    pub fn is_format_error(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Scanner(_) | Error::InvalidSectorSize(_))
    }
}
