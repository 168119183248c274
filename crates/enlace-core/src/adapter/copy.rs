//! The per-period copy engine.
//!
//! Each period the pipeline calls [`ModuleAdapter::copy`]; the adapter
//! resolves its topology and shape into one of the copy strategies:
//!
//! - one-to-one fast path, many-to-one, one-to-many over the pipeline
//!   rings (audio-stream shape);
//! - staged copy through module-local buffers with deep-buffering warm-up
//!   (raw-data shape);
//! - a single self-paced module call over port handles (sink/source, LL);
//! - byte shuttling between pipeline buffers and shadow queues
//!   (sink/source, DP — the module runs on its own domain).
//!
//! Transient "no data" / "no space" reports from the module are absorbed:
//! the period simply moves nothing and the pipeline carries on.

use tracing::{debug, error};

use crate::error::AdapterError;
use crate::module::{ModuleShape, RawInput, RawOutput, StreamInput, StreamOutput};
use crate::ring::{SharedStreamBuffer, copy_between, lock_buffer};

use super::{ModuleAdapter, ProcessingDomain};

impl ModuleAdapter {
    /// Move one period of data through the module.
    pub fn copy(&mut self) -> Result<(), AdapterError> {
        match self.descriptor.shape {
            ModuleShape::AudioStream => self.copy_stream(),
            ModuleShape::RawData => self.copy_raw(),
            ModuleShape::SinkSource => match self.domain {
                ProcessingDomain::Dp => {
                    self.copy_shadow_queues();
                    Ok(())
                }
                ProcessingDomain::Ll => self.copy_sink_source(),
            },
        }
    }

    /// Run the module's own processing step against its negotiated port
    /// handles. For a DP component this is the entry its scheduling
    /// domain invokes; the pipeline task never runs the module directly
    /// and only shuttles queue bytes via [`ModuleAdapter::copy`].
    pub fn process_module(&mut self) -> Result<(), AdapterError> {
        match self.descriptor.shape {
            ModuleShape::SinkSource => self.copy_sink_source(),
            _ => Err(AdapterError::Unsupported),
        }
    }

    fn copy_stream(&mut self) -> Result<(), AdapterError> {
        // Endpoint gateways drive their own DMA; no buffers involved.
        if self.kind.is_endpoint() {
            return match self.module.process_endpoint() {
                Ok(()) => Ok(()),
                Err(ref e) if e.is_transient() => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        match (self.source_buffers.len(), self.sink_buffers.len()) {
            (1, 1) => self.copy_stream_one_to_one(),
            (_, 1) => self.copy_stream_single_sink(),
            (1, _) => self.copy_stream_single_source(),
            _ => Err(AdapterError::InvalidConfig(
                "audio-stream copy requires a single source or a single sink",
            )),
        }
    }

    /// Fast path: exactly one source, one sink. Frame count is the whole
    /// frames available that also fit the sink; the module is offered the
    /// output only while the downstream component matches our state, so an
    /// inactive consumer still lets the module run for ordering without
    /// receiving anything.
    fn copy_stream_one_to_one(&mut self) -> Result<(), AdapterError> {
        let src_handle = self.source_buffers[0].clone();
        let sink_handle = self.sink_buffers[0].clone();
        let mut src = lock_buffer(&src_handle);
        let mut sink = lock_buffer(&sink_handle);

        let frames = src.avail_frames_aligned(&sink);
        let offered = sink.consumer_state() == self.state;

        let (consumed, produced, result) = {
            let mut inputs = [StreamInput {
                stream: &*src,
                frames,
                consumed: 0,
            }];
            let mut out_slot = [StreamOutput {
                stream: &mut *sink,
                produced: 0,
            }];
            let outputs: &mut [StreamOutput<'_>] = if offered { &mut out_slot } else { &mut [] };
            let result = self.module.process_stream(&mut inputs, outputs);
            (inputs[0].consumed, out_slot[0].produced, result)
        };

        // Commit exactly what the module reported, even when it also
        // signalled a transient condition.
        if consumed > 0 {
            let n = consumed.min(src.available());
            src.consume(n);
        }
        self.total_data_consumed += consumed as u64;
        if produced > 0 {
            let n = produced.min(sink.free_space());
            sink.produce(n);
        }
        self.total_data_produced += produced as u64;

        match result {
            Ok(()) => Ok(()),
            Err(ref e) if e.is_transient() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Many-to-one: one input descriptor per source, each sized against
    /// the single sink's free space; one module invocation.
    fn copy_stream_single_sink(&mut self) -> Result<(), AdapterError> {
        let src_handles = self.source_buffers.clone();
        let sink_handle = self.sink_buffers[0].clone();
        let mut sink = lock_buffer(&sink_handle);
        let mut src_guards: Vec<_> = src_handles.iter().map(lock_buffer).collect();

        let frames: Vec<usize> = src_guards
            .iter()
            .map(|s| s.avail_frames_aligned(&sink))
            .collect();
        let offered = sink.consumer_state() == self.state;

        let (consumed, produced, result) = {
            let mut inputs: Vec<StreamInput<'_>> = src_guards
                .iter()
                .zip(&frames)
                .map(|(guard, &frames)| StreamInput {
                    stream: &**guard,
                    frames,
                    consumed: 0,
                })
                .collect();
            let mut out_slot = [StreamOutput {
                stream: &mut *sink,
                produced: 0,
            }];
            let outputs: &mut [StreamOutput<'_>] = if offered { &mut out_slot } else { &mut [] };
            let result = self.module.process_stream(&mut inputs, outputs);
            let consumed: Vec<usize> = inputs.iter().map(|i| i.consumed).collect();
            (consumed, out_slot[0].produced, result)
        };

        match result {
            Ok(()) => {}
            Err(ref e) if e.is_transient() => debug!(error = %e, "nothing moved this period"),
            Err(e) => return Err(e.into()),
        }

        for (guard, &bytes) in src_guards.iter_mut().zip(&consumed) {
            if bytes > 0 {
                let n = bytes.min(guard.available());
                guard.consume(n);
            }
        }
        // Pin 0 carries the base configuration; totals follow it.
        self.total_data_consumed += consumed.first().copied().unwrap_or(0) as u64;

        if produced > 0 {
            let n = produced.min(sink.free_space());
            sink.produce(n);
        }
        self.total_data_produced += produced as u64;
        Ok(())
    }

    /// One-to-many: the frame count is the minimum aligned across every
    /// sink (or everything available when no sink is connected); every
    /// sink receives an output descriptor.
    fn copy_stream_single_source(&mut self) -> Result<(), AdapterError> {
        let src_handle = self.source_buffers[0].clone();
        let sink_handles = self.sink_buffers.clone();
        let mut src = lock_buffer(&src_handle);
        let mut sink_guards: Vec<_> = sink_handles.iter().map(lock_buffer).collect();

        let frames = if sink_guards.is_empty() {
            src.available_frames()
        } else {
            sink_guards
                .iter()
                .map(|sink| src.avail_frames_aligned(sink))
                .min()
                .unwrap_or(0)
        };
        let offered = src.producer_state() == self.state;

        let (consumed, produced, result) = {
            let mut in_slot = [StreamInput {
                stream: &*src,
                frames,
                consumed: 0,
            }];
            let inputs: &mut [StreamInput<'_>] = if offered { &mut in_slot } else { &mut [] };
            let mut outputs: Vec<StreamOutput<'_>> = sink_guards
                .iter_mut()
                .map(|guard| StreamOutput {
                    stream: &mut **guard,
                    produced: 0,
                })
                .collect();
            let result = self.module.process_stream(inputs, &mut outputs);
            let produced: Vec<usize> = outputs.iter().map(|o| o.produced).collect();
            (in_slot[0].consumed, produced, result)
        };

        match result {
            Ok(()) => {}
            Err(ref e) if e.is_transient() => debug!(error = %e, "nothing moved this period"),
            Err(e) => return Err(e.into()),
        }

        if consumed > 0 {
            let n = consumed.min(src.available());
            src.consume(n);
        }
        self.total_data_consumed += consumed as u64;

        for (guard, &bytes) in sink_guards.iter_mut().zip(&produced) {
            if bytes > 0 {
                let n = bytes.min(guard.free_space());
                guard.produce(n);
            }
        }
        self.total_data_produced += produced.first().copied().unwrap_or(0) as u64;
        Ok(())
    }

    /// Raw-data strategy: stage up to one input chunk per active source,
    /// run the module once over plain slices, then distribute output
    /// through the local sink buffers.
    fn copy_raw(&mut self) -> Result<(), AdapterError> {
        let in_chunk = self.descriptor.input_chunk_bytes;

        // The module may not outrun the slowest local sink buffer.
        let min_free_frames = {
            let local = self.local_buffers();
            local
                .iter()
                .map(|b| lock_buffer(b).free_frames())
                .min()
                .unwrap_or(usize::MAX)
        };

        // Stage inputs from every source whose producer matches our
        // state; staging blocks pack in active-port order.
        let mut staged_ports: Vec<usize> = Vec::new();
        for (port, src_handle) in self.source_buffers.iter().enumerate() {
            let src = lock_buffer(src_handle);
            if src.producer_state() != self.state {
                continue;
            }
            let frames = min_free_frames.min(src.available_frames());
            let bytes = (frames * src.params().frame_bytes()).min(in_chunk);
            let idx = staged_ports.len();
            self.input_staging[idx].fill_from(&src, bytes);
            staged_ports.push(port);
        }

        let (result, consumed, produced) = {
            let module = &mut self.module;
            let mut inputs: Vec<RawInput<'_>> = self.input_staging[..staged_ports.len()]
                .iter()
                .map(|s| RawInput {
                    data: s.valid(),
                    consumed: 0,
                })
                .collect();
            let mut outputs: Vec<RawOutput<'_>> = self
                .output_staging
                .iter_mut()
                .map(|s| RawOutput {
                    data: s.block_mut(),
                    produced: 0,
                })
                .collect();
            let result = module.process_raw(&mut inputs, &mut outputs);
            let consumed: Vec<usize> = inputs.iter().map(|i| i.consumed).collect();
            let produced: Vec<usize> = outputs.iter().map(|o| o.produced).collect();
            (result, consumed, produced)
        };

        match result {
            Ok(()) => {}
            Err(ref e) if e.is_transient() => debug!(error = %e, "nothing processed this period"),
            Err(e) => {
                for staging in &mut self.input_staging {
                    staging.zero();
                }
                for staging in &mut self.output_staging {
                    staging.set_size(0);
                }
                return Err(e.into());
            }
        }

        for (staging, &bytes) in self.output_staging.iter_mut().zip(&produced) {
            staging.set_size(bytes);
        }

        // Consume what the module took, then scrub the staged inputs so
        // stale bytes can never leak into the next period.
        for (idx, &port) in staged_ports.iter().enumerate() {
            let mut src = lock_buffer(&self.source_buffers[port]);
            let bytes = consumed[idx].min(src.available());
            if bytes > 0 {
                src.consume(bytes);
            }
        }
        self.total_data_consumed += consumed.first().copied().unwrap_or(0) as u64;
        for staging in &mut self.input_staging {
            staging.zero();
        }

        self.distribute_output();
        Ok(())
    }

    /// Drain produced output: staged block → local sink buffer → true
    /// sink, the last hop gated by deep-buffering warm-up.
    fn distribute_output(&mut self) {
        let local: Vec<SharedStreamBuffer> = self.local_buffers().clone();

        for (staging, local_handle) in self.output_staging.iter().zip(&local) {
            if staging.size() > 0 {
                let mut local_buf = lock_buffer(local_handle);
                staging.drain_to(&mut local_buf, staging.size());
            }
        }

        let sinks = self.sink_buffers.clone();
        let produced: Vec<usize> = self.output_staging.iter().map(|s| s.size()).collect();
        for (i, (sink, local_handle)) in sinks.iter().zip(&local).enumerate() {
            self.drain_local_to_sink(local_handle, sink, produced.get(i).copied().unwrap_or(0));
            self.output_staging[i].set_size(0);
        }
    }

    /// The warm-up-gated hop from a local accumulation buffer to its true
    /// sink. While warm-up is outstanding and the local buffer has not yet
    /// accumulated past it, the sink gets exactly one period of silence;
    /// the first time the accumulated bytes exceed the requirement,
    /// warm-up ends for the rest of the activation.
    fn drain_local_to_sink(
        &mut self,
        local: &SharedStreamBuffer,
        sink: &SharedStreamBuffer,
        produced: usize,
    ) {
        let mut src = lock_buffer(local);
        let mut dst = lock_buffer(sink);

        if self.warmup_bytes > 0 {
            if self.warmup_bytes >= src.available() {
                let zeroes = dst.write_zeroes(self.period_bytes);
                self.total_data_produced += zeroes as u64;
                return;
            }
            debug!(
                gathered = src.available(),
                "deep buffering ended; real output starts"
            );
            self.warmup_bytes = 0;
        } else if produced == 0 {
            debug!("module produced nothing this period");
            if src.available() < self.period_bytes {
                return;
            }
        }

        let frames = src.avail_frames_aligned(&dst);
        let bytes = frames * src.params().frame_bytes();
        if bytes == 0 {
            return;
        }
        copy_between(&mut src, &mut dst, bytes);
        self.total_data_produced += bytes as u64;
    }

    /// Sink/source strategy (LL): the module paces itself over the port
    /// handles; the adapter only accounts for what it moved.
    fn copy_sink_source(&mut self) -> Result<(), AdapterError> {
        for port in &mut self.source_ports {
            port.reset_processed_bytes();
        }
        for port in &mut self.sink_ports {
            port.reset_processed_bytes();
        }

        let module = &mut self.module;
        let result = module.process_sink_source(&mut self.source_ports, &mut self.sink_ports);

        let failure = match result {
            Ok(()) => None,
            Err(ref e) if e.is_transient() => None,
            Err(e) => {
                error!(error = %e, "sink/source processing failed");
                Some(e)
            }
        };

        for port in &self.source_ports {
            self.total_data_consumed += port.processed_bytes();
        }
        for port in &self.sink_ports {
            self.total_data_produced += port.processed_bytes();
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Sink/source strategy (DP): shuttle bytes between the pipeline
    /// buffers and the shadow queues. The module's own processing runs on
    /// its assigned domain and never from here.
    fn copy_shadow_queues(&mut self) {
        for (queue, src_handle) in self.ll_to_dp_queues.iter().zip(&self.source_buffers) {
            let ring = queue.ring();
            let mut queue_ring = lock_buffer(&ring);
            let mut src = lock_buffer(src_handle);
            let bytes = queue_ring.free_space().min(src.available());
            if bytes > 0 {
                copy_between(&mut src, &mut queue_ring, bytes);
            }
        }

        for (queue, sink_handle) in self.dp_to_ll_queues.iter().zip(&self.sink_buffers) {
            let ring = queue.ring();
            let mut queue_ring = lock_buffer(&ring);
            let mut sink = lock_buffer(sink_handle);
            let bytes = sink.free_space().min(queue_ring.available());
            if bytes > 0 {
                copy_between(&mut queue_ring, &mut sink, bytes);
            }
        }
    }
}
