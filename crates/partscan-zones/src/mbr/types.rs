//! MBR/EBR on-disk record layout, partition types and CHS addressing

use partscan_core::{ByteSource, Extent, Result};
use serde::Serialize;
use std::fmt;

/// Number of partition entries in a boot record
pub const PARTITION_ENTRIES: usize = 4;

/// MBR partition type codes
///
/// These are the standard partition type identifiers used in the MBR partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MbrPartitionType {
    /// Empty/unused partition entry
    Empty,
    /// FAT12, CHS
    Fat12,
    /// FAT16 < 32MB, CHS
    Fat16Small,
    /// Extended partition, CHS
    Extended,
    /// FAT16 >= 32MB, CHS
    Fat16,
    /// NTFS/exFAT/HPFS
    Ntfs,
    /// FAT32, CHS
    Fat32Chs,
    /// FAT32, LBA
    Fat32Lba,
    /// FAT16, LBA
    Fat16Lba,
    /// Extended partition, LBA
    ExtendedLba,
    /// Linux swap
    LinuxSwap,
    /// Linux native (ext2/ext3/ext4)
    LinuxNative,
    /// Hybrid MBR marker placed in front of a GPT
    GptHybrid,
    /// GPT protective MBR
    GptProtective,
    /// EFI system partition
    EfiSystem,
    /// Unknown partition type
    Unknown(u8),
}

impl MbrPartitionType {
    /// Create a partition type from a byte value
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::Empty,
            0x01 => Self::Fat12,
            0x04 => Self::Fat16Small,
            0x05 => Self::Extended,
            0x06 => Self::Fat16,
            0x07 => Self::Ntfs,
            0x0B => Self::Fat32Chs,
            0x0C => Self::Fat32Lba,
            0x0E => Self::Fat16Lba,
            0x0F => Self::ExtendedLba,
            0x82 => Self::LinuxSwap,
            0x83 => Self::LinuxNative,
            0xED => Self::GptHybrid,
            0xEE => Self::GptProtective,
            0xEF => Self::EfiSystem,
            _ => Self::Unknown(b),
        }
    }

    /// Get the byte value of this partition type
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::Fat12 => 0x01,
            Self::Fat16Small => 0x04,
            Self::Extended => 0x05,
            Self::Fat16 => 0x06,
            Self::Ntfs => 0x07,
            Self::Fat32Chs => 0x0B,
            Self::Fat32Lba => 0x0C,
            Self::Fat16Lba => 0x0E,
            Self::ExtendedLba => 0x0F,
            Self::LinuxSwap => 0x82,
            Self::LinuxNative => 0x83,
            Self::GptHybrid => 0xED,
            Self::GptProtective => 0xEE,
            Self::EfiSystem => 0xEF,
            Self::Unknown(b) => b,
        }
    }

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &str {
        match self {
            Self::Empty => "Empty",
            Self::Fat12 => "FAT12",
            Self::Fat16Small => "FAT16 (<32MB)",
            Self::Extended => "Extended",
            Self::Fat16 => "FAT16",
            Self::Ntfs => "NTFS/exFAT",
            Self::Fat32Chs => "FAT32 (CHS)",
            Self::Fat32Lba => "FAT32 (LBA)",
            Self::Fat16Lba => "FAT16 (LBA)",
            Self::ExtendedLba => "Extended (LBA)",
            Self::LinuxSwap => "Linux swap",
            Self::LinuxNative => "Linux",
            Self::GptHybrid => "GPT Hybrid",
            Self::GptProtective => "GPT Protective",
            Self::EfiSystem => "EFI System",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// How the walker treats an entry of this type
    pub fn slot_kind(self) -> SlotKind {
        match self {
            Self::Empty => SlotKind::Empty,
            Self::Extended | Self::ExtendedLba => SlotKind::Extended,
            _ => SlotKind::Data,
        }
    }

    /// True for the markers that hand the image over to GPT handling
    pub fn is_gpt_marker(self) -> bool {
        matches!(self, Self::GptProtective | Self::GptHybrid)
    }
}

impl fmt::Display for MbrPartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(b) => write!(f, "Unknown (0x{:02X})", b),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Walker classification of a partition entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Unused slot
    Empty,
    /// Link to (or bounds of) an extended partition
    Extended,
    /// Anything else: an opaque data partition
    Data,
}

/// CHS (Cylinder-Head-Sector) address
///
/// Traditional disk addressing using physical geometry. The walker never
/// uses it for addressing; it is kept so records re-encode byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CHSAddress {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

impl CHSAddress {
    /// Parse CHS address from 3 bytes
    ///
    /// Format:
    /// - Byte 0: Head (0-255)
    /// - Byte 1: Sector (bits 0-5) + Cylinder high (bits 6-7)
    /// - Byte 2: Cylinder low (bits 0-7)
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        let head = bytes[0];
        let sector = bytes[1] & 0x3F; // Lower 6 bits
        let cyl_high = ((bytes[1] & 0xC0) as u16) << 2; // Upper 2 bits
        let cyl_low = bytes[2] as u16;

        Self {
            cylinder: cyl_high | cyl_low,
            head,
            sector,
        }
    }

    /// Convert CHS to bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        let cyl_high = ((self.cylinder >> 8) & 0x03) as u8;
        let cyl_low = (self.cylinder & 0xFF) as u8;

        [self.head, (self.sector & 0x3F) | (cyl_high << 6), cyl_low]
    }
}

impl fmt::Display for CHSAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/H:{}/S:{}", self.cylinder, self.head, self.sector)
    }
}

/// One 16-byte partition table slot
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0x00    1     Status (0x00 inactive, 0x80 active)
/// 0x01    3     CHS of first sector
/// 0x04    1     Partition type
/// 0x05    3     CHS of last sector
/// 0x08    4     First LBA (little-endian)
/// 0x0C    4     Sector count (little-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionEntry {
    pub status: u8,
    pub chs_start: CHSAddress,
    pub partition_type: MbrPartitionType,
    pub chs_end: CHSAddress,
    pub first_lba: u32,
    pub num_lba: u32,
}

impl PartitionEntry {
    /// Size of each partition entry
    pub const SIZE: usize = 16;

    /// Status byte of a non-bootable entry
    pub const STATUS_INACTIVE: u8 = 0x00;

    /// Status byte of a bootable entry
    pub const STATUS_ACTIVE: u8 = 0x80;

    /// An all-zero (empty) entry
    pub fn empty() -> Self {
        Self::new(MbrPartitionType::Empty, 0, 0)
    }

    /// An inactive entry with zeroed CHS fields
    pub fn new(partition_type: MbrPartitionType, first_lba: u32, num_lba: u32) -> Self {
        Self {
            status: Self::STATUS_INACTIVE,
            chs_start: CHSAddress::default(),
            partition_type,
            chs_end: CHSAddress::default(),
            first_lba,
            num_lba,
        }
    }

    /// Decode one slot
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            status: bytes[0],
            chs_start: CHSAddress::from_bytes([bytes[1], bytes[2], bytes[3]]),
            partition_type: MbrPartitionType::from_byte(bytes[4]),
            chs_end: CHSAddress::from_bytes([bytes[5], bytes[6], bytes[7]]),
            first_lba: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            num_lba: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    /// Encode one slot
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.status;
        bytes[1..4].copy_from_slice(&self.chs_start.to_bytes());
        bytes[4] = self.partition_type.to_byte();
        bytes[5..8].copy_from_slice(&self.chs_end.to_bytes());
        bytes[8..12].copy_from_slice(&self.first_lba.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.num_lba.to_le_bytes());
        bytes
    }

    /// Set the status byte
    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    /// True if the status byte is inactive or active
    pub fn has_valid_status(&self) -> bool {
        matches!(self.status, Self::STATUS_INACTIVE | Self::STATUS_ACTIVE)
    }

    /// Walker classification of this entry
    pub fn kind(&self) -> SlotKind {
        self.partition_type.slot_kind()
    }

    /// Byte extent of this entry, relative to the LBA base it is expressed in
    pub fn extent(&self, sector_size: u32) -> Result<Extent> {
        Extent::from_sectors(self.first_lba as u64, self.num_lba as u64, sector_size)
    }
}

/// A decoded MBR or EBR: four slots and the boot signature
///
/// The record occupies the last 66 bytes of its sector:
///
/// ```text
/// Offset (512-byte sector)  Size  Field
/// ------------------------  ----  -----
/// 0x000                     446   Bootstrap code (not part of the record)
/// 0x1BE                     16    Partition entry 1
/// 0x1CE                     16    Partition entry 2
/// 0x1DE                     16    Partition entry 3
/// 0x1EE                     16    Partition entry 4
/// 0x1FE                     2     Boot signature (bytes 0x55 0xAA)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BootRecord {
    pub entries: [PartitionEntry; PARTITION_ENTRIES],
    pub signature: u16,
}

impl BootRecord {
    /// Size of the record on disk
    pub const SIZE: usize = Self::NUM_ENTRIES * PartitionEntry::SIZE + 2;

    /// Number of partition entries in a record
    pub const NUM_ENTRIES: usize = PARTITION_ENTRIES;

    /// The boot signature, in host order
    pub const SIGNATURE: u16 = 0xAA55;

    /// A record with four empty slots and a valid signature
    pub fn new(entries: [PartitionEntry; Self::NUM_ENTRIES]) -> Self {
        Self {
            entries,
            signature: Self::SIGNATURE,
        }
    }

    /// Offset of the record within its sector
    pub fn base_offset(sector_size: u32) -> u64 {
        sector_size as u64 - Self::SIZE as u64
    }

    /// Decode a record from exactly `SIZE` bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut entries = [PartitionEntry::empty(); Self::NUM_ENTRIES];
        for (i, entry) in entries.iter_mut().enumerate() {
            let start = i * PartitionEntry::SIZE;
            let mut slot = [0u8; PartitionEntry::SIZE];
            slot.copy_from_slice(&bytes[start..start + PartitionEntry::SIZE]);
            *entry = PartitionEntry::from_bytes(&slot);
        }

        let sig_offset = Self::NUM_ENTRIES * PartitionEntry::SIZE;
        let signature = u16::from_le_bytes([bytes[sig_offset], bytes[sig_offset + 1]]);

        Self { entries, signature }
    }

    /// Encode the record to its on-disk bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            let start = i * PartitionEntry::SIZE;
            bytes[start..start + PartitionEntry::SIZE].copy_from_slice(&entry.to_bytes());
        }

        let sig_offset = Self::NUM_ENTRIES * PartitionEntry::SIZE;
        bytes[sig_offset..].copy_from_slice(&self.signature.to_le_bytes());
        bytes
    }

    /// Decode the record stored in a sector image
    ///
    /// `sector` must be at least `sector_size` bytes long.
    pub fn from_sector(sector: &[u8], sector_size: u32) -> Result<Self> {
        let base = Self::base_offset(sector_size);
        partscan_core::check_read_bounds(sector.len() as u64, base, Self::SIZE)?;

        let start = base as usize;
        let mut raw = [0u8; Self::SIZE];
        raw.copy_from_slice(&sector[start..start + Self::SIZE]);
        Ok(Self::from_bytes(&raw))
    }

    /// Read and decode the record of the sector at absolute byte offset `sector_offset`
    pub fn read_at(source: &mut dyn ByteSource, sector_offset: u64, sector_size: u32) -> Result<Self> {
        let pos = partscan_core::checked_add_u64(
            sector_offset,
            Self::base_offset(sector_size),
            "boot record position",
        )?;

        let mut raw = [0u8; Self::SIZE];
        source.read_exact_at(pos, &mut raw)?;
        Ok(Self::from_bytes(&raw))
    }

    /// Read and decode the record of sector number `sector`
    pub fn read_sector(source: &mut dyn ByteSource, sector: u64, sector_size: u32) -> Result<Self> {
        let sector_offset = partscan_core::sectors_to_bytes(sector, sector_size, "boot record sector")?;
        Self::read_at(source, sector_offset, sector_size)
    }

    /// Entry 0 carries a GPT protective or hybrid marker
    pub fn has_gpt_marker(&self) -> bool {
        self.entries[0].partition_type.is_gpt_marker()
    }
}
