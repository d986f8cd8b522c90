//! Memory-mapped pipeline for image files

use memmap2::Mmap;
use partscan_core::{check_read_bounds, ByteSource, Result, MAX_MMAP_SIZE};
use std::fs::File;
use std::io;
use std::path::Path;

/// A pipeline backed by a read-only memory-mapped file.
///
/// # Example
///
/// ```rust,no_run
/// use partscan_pipeline::MmapPipeline;
/// use std::path::Path;
///
/// let pipeline = MmapPipeline::open(Path::new("disk.img")).unwrap();
/// println!("{} bytes", pipeline.len());
/// ```
pub struct MmapPipeline {
    mmap: Mmap,
}

impl MmapPipeline {
    /// Open a file with memory mapping
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped
    ///
    /// # Security
    ///
    /// Validates file before mapping:
    /// - Ensures file is a regular file (not device, pipe, etc.)
    /// - Checks file size is within reasonable limits
    /// - Uses read-only mapping to prevent accidental writes
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_file(&file)
    }

    /// Create a memory-mapped pipeline from an existing file
    ///
    /// # Safety
    ///
    /// Uses `unsafe` for memory mapping. The file must not be truncated while
    /// the mapping is alive (caller responsibility).
    pub fn from_file(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;

        // Validate file is a regular file (not device, pipe, directory, etc.)
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Only regular files can be memory-mapped",
            ));
        }

        if metadata.len() > MAX_MMAP_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "File size {} exceeds memory mapping limit {} (16 GB)",
                    metadata.len(),
                    MAX_MMAP_SIZE
                ),
            ));
        }

        // SAFETY: regular file, bounded size, valid descriptor; Mmap is read-only
        let mmap = unsafe { Mmap::map(file)? };
        tracing::debug!("Mapped {} bytes", mmap.len());

        Ok(Self { mmap })
    }

    /// Get the length of the mapped region
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Check if the mapped region is empty
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Get a slice of the entire mapped data
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }
}

impl ByteSource for MmapPipeline {
    fn length(&self) -> u64 {
        self.len()
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_read_bounds(self.len(), offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.mmap[start..start + buf.len()]);
        Ok(())
    }
}
