//! Cross-domain shadow queues.
//!
//! When a module runs in the DP domain (an independently scheduled task,
//! possibly on another core), it must not touch the pipeline's own stream
//! buffers from that context. The adapter instead creates one shadow queue
//! per connected port: a double buffer that exposes the same source/sink
//! face as a stream buffer. The pipeline task moves bytes between the real
//! buffer and the queue each period; the DP task drains or fills the queue
//! on its own schedule.
//!
//! Synchronization lives entirely inside the queue's interior ring: each
//! direction has a single producer and a single consumer, and every access
//! is one bounded critical section. No state outside the queue is shared
//! between the two domains.

use crate::budget::MemoryBudget;
use crate::error::AdapterError;
use crate::params::StreamParams;
use crate::port::{SinkPort, SourcePort};
use crate::ring::{SharedStreamBuffer, StreamBuffer};

/// Placement of a shadow queue's backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Both domains run on the same core; local memory suffices.
    Local,
    /// The module's domain lives on another core; storage must be in
    /// memory visible to both.
    Shared,
}

/// A cross-domain double buffer standing in for one pipeline buffer.
#[derive(Debug)]
pub struct ShadowQueue {
    ring: SharedStreamBuffer,
    params: StreamParams,
    mode: QueueMode,
    charged: usize,
    budget: MemoryBudget,
}

impl ShadowQueue {
    /// Create a queue sized for the shadowed port's transfer granularity:
    /// one producer chunk (`min_available`) plus one consumer chunk
    /// (`min_free_space`) may be in flight at once. The negotiated stream
    /// parameters are copied from the buffer being shadowed.
    pub fn create(
        min_available: usize,
        min_free_space: usize,
        mode: QueueMode,
        params: StreamParams,
        budget: &MemoryBudget,
    ) -> Result<Self, AdapterError> {
        let capacity = min_available + min_free_space;
        budget.charge("shadow queue", capacity)?;
        let mut ring = StreamBuffer::new(capacity, params);
        ring.set_transfer_hints(min_available, min_free_space);
        Ok(Self {
            ring: std::sync::Arc::new(std::sync::Mutex::new(ring)),
            params,
            mode,
            charged: capacity,
            budget: budget.clone(),
        })
    }

    /// The queue's interior ring, for the pipeline-side per-period copy.
    pub fn ring(&self) -> SharedStreamBuffer {
        self.ring.clone()
    }

    /// Module-facing read endpoint.
    pub fn source_port(&self) -> SourcePort {
        SourcePort::new(self.ring.clone())
    }

    /// Module-facing write endpoint.
    pub fn sink_port(&self) -> SinkPort {
        SinkPort::new(self.ring.clone())
    }

    /// Stream parameters copied from the shadowed buffer.
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// Storage placement.
    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Total byte capacity of the interior ring.
    pub fn capacity(&self) -> usize {
        self.charged
    }
}

impl Drop for ShadowQueue {
    fn drop(&mut self) {
        self.budget.refund(self.charged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::lock_buffer;
    use std::thread;

    fn params() -> StreamParams {
        StreamParams::default_pcm()
    }

    #[test]
    fn sized_from_both_transfer_hints() {
        let budget = MemoryBudget::unbounded();
        let q = ShadowQueue::create(192, 256, QueueMode::Local, params(), &budget).unwrap();
        assert_eq!(q.capacity(), 448);
        assert_eq!(lock_buffer(&q.ring()).min_available_hint(), 192);
        assert_eq!(lock_buffer(&q.ring()).min_free_hint(), 256);
    }

    #[test]
    fn creation_failure_leaves_budget_untouched() {
        let budget = MemoryBudget::with_limit(100);
        let err = ShadowQueue::create(64, 64, QueueMode::Shared, params(), &budget).unwrap_err();
        assert!(matches!(err, AdapterError::OutOfMemory { .. }));
        assert_eq!(budget.remaining(), 100);
    }

    #[test]
    fn drop_refunds_the_charge() {
        let budget = MemoryBudget::with_limit(128);
        let q = ShadowQueue::create(64, 64, QueueMode::Local, params(), &budget).unwrap();
        assert_eq!(budget.remaining(), 0);
        drop(q);
        assert_eq!(budget.remaining(), 128);
    }

    #[test]
    fn endpoints_cross_thread_boundaries() {
        let budget = MemoryBudget::unbounded();
        let q = ShadowQueue::create(64, 64, QueueMode::Shared, params(), &budget).unwrap();
        let mut sink = q.sink_port();
        let mut source = q.source_port();

        // Producer in one context, consumer in another, meeting only at
        // the queue.
        let producer = thread::spawn(move || {
            let mut total = 0;
            while total < 96 {
                total += sink.write(&[0xAB; 16]);
            }
        });
        let consumer = thread::spawn(move || {
            let mut got = Vec::new();
            while got.len() < 96 {
                let mut chunk = [0u8; 16];
                let n = source.read(&mut chunk);
                got.extend_from_slice(&chunk[..n]);
            }
            got
        });
        producer.join().unwrap();
        let got = consumer.join().unwrap();
        assert_eq!(got.len(), 96);
        assert!(got.iter().all(|&b| b == 0xAB));
    }
}
