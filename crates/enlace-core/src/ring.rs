//! Fixed-capacity circular stream buffer.
//!
//! One [`StreamBuffer`] carries PCM or compressed bytes between two
//! pipeline components. The buffer tracks a read cursor, a write cursor and
//! an available-byte count; all copies in and out are split into a head run
//! (up to the physical end of the ring) and a tail run (from the physical
//! start), each bounded by the counterpart's length. [`peek_at`] and
//! [`write_at`] are that two-segment primitive — every higher-level copy
//! strategy in the adapter reduces to them.
//!
//! [`peek_at`]: StreamBuffer::peek_at
//! [`write_at`]: StreamBuffer::write_at

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::params::StreamParams;
use crate::state::ComponentState;

/// Shared handle to a stream buffer.
///
/// Buffers are owned by the pipeline topology; adapters hold cloned
/// handles for the lifetime of the connection. Lock scopes are bounded to
/// single copy operations.
pub type SharedStreamBuffer = Arc<Mutex<StreamBuffer>>;

/// Lock a shared buffer, recovering from poisoning.
///
/// A panic on another thread mid-copy can at worst leave stale audio bytes
/// behind; cursor arithmetic is never split across a lock.
pub fn lock_buffer(buf: &SharedStreamBuffer) -> MutexGuard<'_, StreamBuffer> {
    buf.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed-capacity byte ring with read/write cursors.
#[derive(Debug)]
pub struct StreamBuffer {
    data: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    avail: usize,
    params: StreamParams,
    /// Lifecycle state of the component producing into this buffer.
    producer_state: ComponentState,
    /// Lifecycle state of the component consuming from this buffer.
    consumer_state: ComponentState,
    /// Bytes consumed since the last counter reset.
    processed_read: u64,
    /// Bytes produced since the last counter reset.
    processed_write: u64,
    /// Declared minimum chunk the producer commits at once.
    min_available_hint: usize,
    /// Declared minimum space the consumer frees at once.
    min_free_hint: usize,
}

impl StreamBuffer {
    /// Create a zeroed buffer of `capacity` bytes with the given params.
    pub fn new(capacity: usize, params: StreamParams) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            avail: 0,
            params,
            // Neighbour states are maintained by the topology on trigger;
            // until it does, assume the neighbours run.
            producer_state: ComponentState::Active,
            consumer_state: ComponentState::Active,
            processed_read: 0,
            processed_write: 0,
            min_available_hint: capacity / 2,
            min_free_hint: capacity / 2,
        }
    }

    /// Create a new buffer and wrap it in a shared handle.
    pub fn shared(capacity: usize, params: StreamParams) -> SharedStreamBuffer {
        Arc::new(Mutex::new(Self::new(capacity, params)))
    }

    /// Total byte capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes available for reading.
    #[inline]
    pub fn available(&self) -> usize {
        self.avail
    }

    /// Bytes available for writing.
    #[inline]
    pub fn free_space(&self) -> usize {
        self.data.len() - self.avail
    }

    /// Contiguous readable run before the read cursor wraps.
    #[inline]
    pub fn read_run_len(&self) -> usize {
        self.avail.min(self.data.len() - self.read_pos)
    }

    /// Contiguous writable run before the write cursor wraps.
    #[inline]
    pub fn write_run_len(&self) -> usize {
        self.free_space().min(self.data.len() - self.write_pos)
    }

    /// Current read cursor offset.
    #[inline]
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Current write cursor offset.
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Negotiated stream parameters.
    #[inline]
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// Replace the negotiated stream parameters.
    pub fn set_params(&mut self, params: StreamParams) {
        self.params = params;
    }

    /// Whole frames available for reading.
    #[inline]
    pub fn available_frames(&self) -> usize {
        self.avail / self.params.frame_bytes()
    }

    /// Whole frames writable.
    #[inline]
    pub fn free_frames(&self) -> usize {
        self.free_space() / self.params.frame_bytes()
    }

    /// Frames that can move from `self` into `sink` this period: whole
    /// frames available here that also fit the sink's free space, each side
    /// measured in its own frame stride.
    pub fn avail_frames_aligned(&self, sink: &StreamBuffer) -> usize {
        self.available_frames().min(sink.free_frames())
    }

    /// State of the component producing into this buffer.
    #[inline]
    pub fn producer_state(&self) -> ComponentState {
        self.producer_state
    }

    /// State of the component consuming from this buffer.
    #[inline]
    pub fn consumer_state(&self) -> ComponentState {
        self.consumer_state
    }

    /// Record the producing component's lifecycle state.
    pub fn set_producer_state(&mut self, state: ComponentState) {
        self.producer_state = state;
    }

    /// Record the consuming component's lifecycle state.
    pub fn set_consumer_state(&mut self, state: ComponentState) {
        self.consumer_state = state;
    }

    /// Read `dst.len()` bytes starting `offset` bytes past the read cursor,
    /// without consuming. Head run up to the ring's end, tail run from its
    /// start; both bounded by `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + dst.len()` exceeds the available bytes.
    pub fn peek_at(&self, offset: usize, dst: &mut [u8]) {
        let n = dst.len();
        assert!(
            offset + n <= self.avail,
            "peek of {} bytes at offset {} exceeds {} available",
            n,
            offset,
            self.avail
        );
        let cap = self.data.len();
        let start = (self.read_pos + offset) % cap;
        let head = n.min(cap - start);
        dst[..head].copy_from_slice(&self.data[start..start + head]);
        if head < n {
            dst[head..].copy_from_slice(&self.data[..n - head]);
        }
    }

    /// Write `src` starting `offset` bytes past the write cursor, without
    /// producing. Two-segment, bounded by `src`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + src.len()` exceeds the free space.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) {
        let n = src.len();
        assert!(
            offset + n <= self.free_space(),
            "write of {} bytes at offset {} exceeds {} free",
            n,
            offset,
            self.free_space()
        );
        let cap = self.data.len();
        let start = (self.write_pos + offset) % cap;
        let head = n.min(cap - start);
        self.data[start..start + head].copy_from_slice(&src[..head]);
        if head < n {
            self.data[..n - head].copy_from_slice(&src[head..]);
        }
    }

    /// Commit `n` previously written bytes: advance the write cursor.
    pub fn produce(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug_assert!(n <= self.free_space());
        self.write_pos = (self.write_pos + n) % self.data.len();
        self.avail += n;
        self.processed_write += n as u64;
    }

    /// Release `n` read bytes: advance the read cursor.
    pub fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug_assert!(n <= self.avail);
        self.read_pos = (self.read_pos + n) % self.data.len();
        self.avail -= n;
        self.processed_read += n as u64;
    }

    /// Read up to `dst.len()` bytes and consume them. Returns bytes moved.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.avail);
        self.peek_at(0, &mut dst[..n]);
        self.consume(n);
        n
    }

    /// Write up to `src.len()` bytes and produce them. Returns bytes moved.
    pub fn write_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free_space());
        self.write_at(0, &src[..n]);
        self.produce(n);
        n
    }

    /// Produce `n` zero-valued bytes (bounded by free space). Returns the
    /// bytes actually written. Used to feed silence downstream during
    /// warm-up.
    pub fn write_zeroes(&mut self, n: usize) -> usize {
        let n = n.min(self.free_space());
        let cap = self.data.len();
        let head = n.min(cap - self.write_pos);
        self.data[self.write_pos..self.write_pos + head].fill(0);
        if head < n {
            self.data[..n - head].fill(0);
        }
        self.produce(n);
        n
    }

    /// Zero the backing storage and rewind both cursors.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.read_pos = 0;
        self.write_pos = 0;
        self.avail = 0;
    }

    /// Bytes consumed from this buffer since the last counter reset.
    #[inline]
    pub fn processed_read_bytes(&self) -> u64 {
        self.processed_read
    }

    /// Bytes produced into this buffer since the last counter reset.
    #[inline]
    pub fn processed_write_bytes(&self) -> u64 {
        self.processed_write
    }

    /// Rewind the consumed-byte counter only (source side of the buffer).
    pub fn reset_processed_read(&mut self) {
        self.processed_read = 0;
    }

    /// Rewind the produced-byte counter only (sink side of the buffer).
    pub fn reset_processed_write(&mut self) {
        self.processed_write = 0;
    }

    /// Rewind both processed-byte counters.
    pub fn reset_processed_counters(&mut self) {
        self.processed_read = 0;
        self.processed_write = 0;
    }

    /// Declared minimum chunk the producer commits at once. Defaults to
    /// half the capacity until the topology declares otherwise.
    #[inline]
    pub fn min_available_hint(&self) -> usize {
        self.min_available_hint
    }

    /// Declared minimum space the consumer frees at once.
    #[inline]
    pub fn min_free_hint(&self) -> usize {
        self.min_free_hint
    }

    /// Declare the transfer granularity of both endpoints. Shadow queues
    /// are sized from these when a cross-domain module connects.
    pub fn set_transfer_hints(&mut self, min_available: usize, min_free: usize) {
        self.min_available_hint = min_available;
        self.min_free_hint = min_free;
    }

    /// Replace the backing storage with a zeroed block of `capacity`
    /// bytes, rewinding both cursors. Used when a re-prepare changes the
    /// buffering geometry of an already-attached local buffer.
    pub fn resize(&mut self, capacity: usize) {
        self.data = vec![0u8; capacity].into_boxed_slice();
        self.read_pos = 0;
        self.write_pos = 0;
        self.avail = 0;
    }
}

/// Move `bytes` from `src`'s read cursor to `dst`'s write cursor,
/// wrap-aware on both sides, and commit the transfer on both.
///
/// # Panics
///
/// Panics if `bytes` exceeds `src.available()` or `dst.free_space()`.
pub fn copy_between(src: &mut StreamBuffer, dst: &mut StreamBuffer, bytes: usize) {
    assert!(bytes <= src.available() && bytes <= dst.free_space());
    let cap = src.data.len();
    let head = bytes.min(cap - src.read_pos);
    // Borrow src's two readable runs directly; dst.write_at handles its
    // own wrap.
    let (front, back) = src.data.split_at(src.read_pos);
    dst.write_at(0, &back[..head]);
    if head < bytes {
        dst.write_at(head, &front[..bytes - head]);
    }
    dst.produce(bytes);
    src.consume(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(cap: usize) -> StreamBuffer {
        StreamBuffer::new(cap, StreamParams::default_pcm())
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut b = buf(16);
        assert_eq!(b.write_from(&[1, 2, 3, 4]), 4);
        assert_eq!(b.available(), 4);
        let mut out = [0u8; 4];
        assert_eq!(b.read_into(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(b.available(), 0);
    }

    #[test]
    fn wrapping_write_splits_head_and_tail() {
        let mut b = buf(8);
        b.write_from(&[0; 6]);
        let mut sink = [0u8; 6];
        b.read_into(&mut sink);
        // Cursors now sit at 6; an 8-byte write must wrap.
        assert_eq!(b.write_from(&[1, 2, 3, 4, 5, 6, 7, 8]), 8);
        assert_eq!(b.read_run_len(), 2);
        let mut out = [0u8; 8];
        b.read_into(&mut out);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut b = buf(8);
        b.write_from(&[9, 8, 7]);
        let mut out = [0u8; 3];
        b.peek_at(0, &mut out);
        assert_eq!(out, [9, 8, 7]);
        assert_eq!(b.available(), 3);
        let mut tail = [0u8; 2];
        b.peek_at(1, &mut tail);
        assert_eq!(tail, [8, 7]);
    }

    #[test]
    fn write_at_offset_then_produce() {
        let mut b = buf(8);
        b.write_at(0, &[1, 1]);
        b.write_at(2, &[2, 2]);
        b.produce(4);
        let mut out = [0u8; 4];
        b.read_into(&mut out);
        assert_eq!(out, [1, 1, 2, 2]);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn overfull_peek_panics() {
        let mut b = buf(8);
        b.write_from(&[1, 2]);
        let mut out = [0u8; 3];
        b.peek_at(0, &mut out);
    }

    #[test]
    fn zeroes_are_produced_wrap_aware() {
        let mut b = buf(8);
        b.write_from(&[0xff; 5]);
        let mut drop5 = [0u8; 5];
        b.read_into(&mut drop5);
        assert_eq!(b.write_zeroes(6), 6);
        let mut out = [0xffu8; 6];
        b.read_into(&mut out);
        assert_eq!(out, [0; 6]);
    }

    #[test]
    fn zeroes_bounded_by_free_space() {
        let mut b = buf(4);
        b.write_from(&[1, 2, 3]);
        assert_eq!(b.write_zeroes(10), 1);
        assert_eq!(b.available(), 4);
    }

    #[test]
    fn frame_helpers_use_negotiated_stride() {
        let params = StreamParams {
            rate: 48_000,
            channels: 2,
            sample_container_bytes: 2,
        };
        let mut src = StreamBuffer::new(64, params);
        let mut sink = StreamBuffer::new(64, params);
        src.write_from(&[0u8; 17]); // 4 whole frames + 1 straggler byte
        sink.write_from(&[0u8; 56]); // 2 whole frames free
        assert_eq!(src.available_frames(), 4);
        assert_eq!(sink.free_frames(), 2);
        assert_eq!(src.avail_frames_aligned(&sink), 2);
    }

    #[test]
    fn copy_between_handles_wrap_on_both_sides() {
        let mut src = buf(8);
        let mut dst = buf(8);
        // Park both cursors near the end so the copy wraps twice.
        src.write_from(&[0; 6]);
        let mut junk = [0u8; 6];
        src.read_into(&mut junk);
        dst.write_from(&[0; 5]);
        dst.read_into(&mut junk[..5]);

        src.write_from(&[10, 20, 30, 40, 50]);
        copy_between(&mut src, &mut dst, 5);
        assert_eq!(src.available(), 0);
        let mut out = [0u8; 5];
        dst.read_into(&mut out);
        assert_eq!(out, [10, 20, 30, 40, 50]);
    }

    #[test]
    fn processed_counters_accumulate_until_reset() {
        let mut b = buf(16);
        b.write_from(&[0; 8]);
        let mut out = [0u8; 4];
        b.read_into(&mut out);
        assert_eq!(b.processed_write_bytes(), 8);
        assert_eq!(b.processed_read_bytes(), 4);
        b.reset_processed_counters();
        assert_eq!(b.processed_write_bytes(), 0);
        assert_eq!(b.processed_read_bytes(), 0);
    }
}
