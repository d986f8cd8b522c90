//! Stream pipeline - positional reads over any seekable stream

use partscan_core::{check_read_bounds, ByteSource, Result};
use std::io::{self, Read, Seek, SeekFrom};

/// A pipeline that serves positional reads from a `Read + Seek` stream.
///
/// The stream length is measured once at construction; reads past it are
/// rejected before the stream is touched.
///
/// # Example
///
/// ```rust
/// use partscan_core::ByteSource;
/// use partscan_pipeline::StreamPipeline;
/// use std::io::Cursor;
///
/// let data = vec![0u8; 1024];
/// let mut pipeline = StreamPipeline::new(Cursor::new(data)).unwrap();
/// assert_eq!(pipeline.length(), 1024);
/// ```
pub struct StreamPipeline<R: Read + Seek + Send> {
    inner: R,
    length: u64,
}

impl<R: Read + Seek + Send> StreamPipeline<R> {
    /// Create a new stream pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot seek to its end
    pub fn new(mut inner: R) -> io::Result<Self> {
        let length = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, length })
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek + Send> ByteSource for StreamPipeline<R> {
    fn length(&self) -> u64 {
        self.length
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_read_bounds(self.length, offset, buf.len())?;
        self.inner.seek(SeekFrom::Start(offset))?;

        // The stream may have shrunk since it was measured
        let wanted = buf.len();
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => partscan_core::Error::ShortRead {
                offset,
                wanted,
                available: 0,
            },
            _ => e.into(),
        })
    }
}
