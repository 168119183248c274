//! Module-local staging buffers for raw-data shaped modules.
//!
//! A raw-data module does not read pipeline rings directly: each period the
//! adapter stages up to one input chunk per source into a contiguous block,
//! hands the module plain slices, and drains produced output back out. The
//! block is charged against the adapter's [`MemoryBudget`] and refunded
//! when dropped (reset or teardown).

use crate::budget::MemoryBudget;
use crate::error::AdapterError;
use crate::ring::StreamBuffer;

/// One contiguous staging block with a logical size and consumed count.
#[derive(Debug)]
pub struct StagingBuffer {
    data: Box<[u8]>,
    /// Bytes currently valid.
    size: usize,
    /// Bytes the module reported consumed from the last staged chunk.
    consumed: usize,
    budget: MemoryBudget,
}

impl StagingBuffer {
    /// Allocate a zeroed block of `capacity` bytes, charging `budget`.
    pub fn allocate(
        what: &'static str,
        capacity: usize,
        budget: &MemoryBudget,
    ) -> Result<Self, AdapterError> {
        budget.charge(what, capacity)?;
        Ok(Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
            consumed: 0,
            budget: budget.clone(),
        })
    }

    /// Capacity of the backing block.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently valid.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Record how many staged bytes are valid.
    pub fn set_size(&mut self, size: usize) {
        debug_assert!(size <= self.data.len());
        self.size = size;
    }

    /// Bytes the module reported consumed.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Record the module's consumed count.
    pub fn set_consumed(&mut self, consumed: usize) {
        self.consumed = consumed;
    }

    /// The valid staged bytes.
    #[inline]
    pub fn valid(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// The whole backing block, for the module to produce into.
    #[inline]
    pub fn block_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Stage `bytes` from `source`'s read cursor (wrap-aware, without
    /// consuming), bounded by this block's capacity. Returns bytes staged.
    pub fn fill_from(&mut self, source: &StreamBuffer, bytes: usize) -> usize {
        let n = bytes.min(self.data.len()).min(source.available());
        source.peek_at(0, &mut self.data[..n]);
        self.size = n;
        self.consumed = 0;
        n
    }

    /// Drain `bytes` of staged data into `sink` at its write cursor
    /// (wrap-aware), bounded by the sink's free space, and commit the
    /// production. Returns bytes drained.
    pub fn drain_to(&self, sink: &mut StreamBuffer, bytes: usize) -> usize {
        let n = bytes.min(self.size).min(sink.free_space());
        sink.write_at(0, &self.data[..n]);
        sink.produce(n);
        n
    }

    /// Zero the block and reset the logical size and consumed count.
    pub fn zero(&mut self) {
        self.data.fill(0);
        self.size = 0;
        self.consumed = 0;
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        self.budget.refund(self.data.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::StreamParams;

    fn ring(cap: usize) -> StreamBuffer {
        StreamBuffer::new(cap, StreamParams::default_pcm())
    }

    #[test]
    fn allocation_charges_and_drop_refunds() {
        let budget = MemoryBudget::with_limit(64);
        {
            let s = StagingBuffer::allocate("in", 48, &budget).unwrap();
            assert_eq!(s.capacity(), 48);
            assert_eq!(budget.remaining(), 16);
            assert!(StagingBuffer::allocate("in2", 32, &budget).is_err());
        }
        assert_eq!(budget.remaining(), 64);
    }

    #[test]
    fn fill_stages_across_the_wrap() {
        let budget = MemoryBudget::unbounded();
        let mut s = StagingBuffer::allocate("in", 8, &budget).unwrap();
        let mut r = ring(8);
        // Park the cursor at 6 so a 5-byte stage wraps.
        r.write_from(&[0; 6]);
        let mut junk = [0u8; 6];
        r.read_into(&mut junk);
        r.write_from(&[1, 2, 3, 4, 5]);

        assert_eq!(s.fill_from(&r, 5), 5);
        assert_eq!(s.valid(), &[1, 2, 3, 4, 5]);
        // Staging peeks; the ring still holds its data.
        assert_eq!(r.available(), 5);
    }

    #[test]
    fn fill_is_bounded_by_capacity_and_availability() {
        let budget = MemoryBudget::unbounded();
        let mut s = StagingBuffer::allocate("in", 4, &budget).unwrap();
        let mut r = ring(16);
        r.write_from(&[7; 10]);
        assert_eq!(s.fill_from(&r, 10), 4);
        let mut tiny = ring(16);
        tiny.write_from(&[7; 2]);
        assert_eq!(s.fill_from(&tiny, 10), 2);
    }

    #[test]
    fn drain_commits_to_the_sink() {
        let budget = MemoryBudget::unbounded();
        let mut s = StagingBuffer::allocate("out", 8, &budget).unwrap();
        s.block_mut()[..4].copy_from_slice(&[9, 9, 8, 8]);
        s.set_size(4);
        let mut sink = ring(8);
        assert_eq!(s.drain_to(&mut sink, 4), 4);
        assert_eq!(sink.available(), 4);
        let mut out = [0u8; 4];
        sink.read_into(&mut out);
        assert_eq!(out, [9, 9, 8, 8]);
    }

    #[test]
    fn zero_clears_state() {
        let budget = MemoryBudget::unbounded();
        let mut s = StagingBuffer::allocate("in", 4, &budget).unwrap();
        let mut r = ring(8);
        r.write_from(&[1, 2, 3]);
        s.fill_from(&r, 3);
        s.set_consumed(3);
        s.zero();
        assert_eq!(s.size(), 0);
        assert_eq!(s.consumed(), 0);
        assert_eq!(&s.block_mut()[..4], &[0, 0, 0, 0]);
    }
}
