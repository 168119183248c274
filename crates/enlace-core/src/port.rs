//! Source/sink port handles for sink/source-shaped modules.
//!
//! A sink/source module paces itself: instead of staged slices it receives
//! one [`SourcePort`] per input and one [`SinkPort`] per output and moves
//! whatever it decides to move. The handles wrap either a pipeline stream
//! buffer (LL domain) or a shadow queue's interior ring (DP domain) — the
//! module cannot tell the difference, which is the point.

use crate::params::StreamParams;
use crate::ring::{SharedStreamBuffer, lock_buffer};

/// Read side of one connected port.
#[derive(Debug, Clone)]
pub struct SourcePort {
    buf: SharedStreamBuffer,
}

impl SourcePort {
    /// Wrap a shared buffer as a module-facing source.
    pub fn new(buf: SharedStreamBuffer) -> Self {
        Self { buf }
    }

    /// Negotiated stream parameters of the underlying buffer.
    pub fn params(&self) -> StreamParams {
        *lock_buffer(&self.buf).params()
    }

    /// Bytes ready to read.
    pub fn available(&self) -> usize {
        lock_buffer(&self.buf).available()
    }

    /// Declared minimum chunk the producer commits at once.
    pub fn min_available(&self) -> usize {
        lock_buffer(&self.buf).min_available_hint()
    }

    /// Read and consume up to `dst.len()` bytes. Returns bytes moved.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        lock_buffer(&self.buf).read_into(dst)
    }

    /// Bytes consumed through this side since the last reset.
    pub fn processed_bytes(&self) -> u64 {
        lock_buffer(&self.buf).processed_read_bytes()
    }

    /// Rewind the per-period consumed counter.
    pub fn reset_processed_bytes(&mut self) {
        lock_buffer(&self.buf).reset_processed_read();
    }
}

/// Write side of one connected port.
#[derive(Debug, Clone)]
pub struct SinkPort {
    buf: SharedStreamBuffer,
}

impl SinkPort {
    /// Wrap a shared buffer as a module-facing sink.
    pub fn new(buf: SharedStreamBuffer) -> Self {
        Self { buf }
    }

    /// Negotiated stream parameters of the underlying buffer.
    pub fn params(&self) -> StreamParams {
        *lock_buffer(&self.buf).params()
    }

    /// Bytes of free space.
    pub fn free_space(&self) -> usize {
        lock_buffer(&self.buf).free_space()
    }

    /// Declared minimum space the consumer frees at once.
    pub fn min_free_space(&self) -> usize {
        lock_buffer(&self.buf).min_free_hint()
    }

    /// Write and produce up to `src.len()` bytes. Returns bytes moved.
    pub fn write(&mut self, src: &[u8]) -> usize {
        lock_buffer(&self.buf).write_from(src)
    }

    /// Bytes produced through this side since the last reset.
    pub fn processed_bytes(&self) -> u64 {
        lock_buffer(&self.buf).processed_write_bytes()
    }

    /// Rewind the per-period produced counter.
    pub fn reset_processed_bytes(&mut self) {
        lock_buffer(&self.buf).reset_processed_write();
    }
}
