//! In-memory pipeline

use partscan_core::{check_read_bounds, ByteSource, Result};

/// A pipeline over an owned byte buffer
///
/// # Example
///
/// ```rust
/// use partscan_core::ByteSource;
/// use partscan_pipeline::MemoryPipeline;
///
/// let mut image = MemoryPipeline::new(vec![0u8; 1024]);
/// assert_eq!(image.length(), 1024);
/// assert!(image.read_vec_at(1000, 100).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryPipeline {
    data: Vec<u8>,
}

impl MemoryPipeline {
    /// Wrap a buffer
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Get the underlying bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Give back the underlying buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemoryPipeline {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ByteSource for MemoryPipeline {
    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_read_bounds(self.length(), offset, buf.len())?;
        // Bounds check above guarantees both ends fit in usize
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}
