//! Prepare-time buffering geometry: port discovery, warm-up computation,
//! staging and local-buffer allocation, shadow-queue construction.

use tracing::{debug, info, warn};

use crate::error::{AdapterError, PipelineStatus};
use crate::module::ModuleShape;
use crate::params::StreamParams;
use crate::port::{SinkPort, SourcePort};
use crate::ring::{StreamBuffer, lock_buffer};
use crate::shadow::{QueueMode, ShadowQueue};
use crate::staging::StagingBuffer;
use crate::state::{ComponentState, StateStatus, TriggerCommand};

use super::{ModuleAdapter, ProcessingDomain};

/// Periods needed to hold one full chunk against the period size, with a
/// spare period of margin: one extra on exact division, two when the
/// division leaves a remainder.
fn chunk_periods(chunk: usize, period: usize) -> usize {
    let (big, small) = if chunk > period {
        (chunk, period)
    } else {
        (period, chunk)
    };
    big / small + if big % small != 0 { 2 } else { 1 }
}

impl ModuleAdapter {
    /// Prepare the component for streaming.
    ///
    /// Idempotent: preparing an already-active or already-prepared
    /// component performs no reallocation and returns
    /// [`PipelineStatus::PathStop`] so the pipeline stops walking the
    /// chain (a shared sink may already have been activated through
    /// another source).
    pub fn prepare(&mut self) -> Result<PipelineStatus, AdapterError> {
        debug!("prepare: start");

        let status = match (self.descriptor.shape, self.domain) {
            (ModuleShape::SinkSource, ProcessingDomain::Dp) => self.prepare_shadow_queues()?,
            (ModuleShape::SinkSource, ProcessingDomain::Ll) => self.prepare_sink_source()?,
            (ModuleShape::RawData | ModuleShape::AudioStream, ProcessingDomain::Ll) => {
                self.module.prepare(&[], &[])?
            }
            _ => {
                return Err(AdapterError::InvalidConfig(
                    "processing shape not runnable in this domain",
                ));
            }
        };
        if status == PipelineStatus::PathStop {
            return Ok(PipelineStatus::PathStop);
        }

        // A shared sink may already have pulled this component active
        // through another source.
        if self.state == ComponentState::Active {
            return Ok(PipelineStatus::PathStop);
        }

        // Validate the topology before mutating any state: an invalid
        // configuration must leave the component exactly as it was.
        // Endpoint gateways manage their own transfers and may run
        // bufferless.
        let params = if self.kind.is_endpoint() {
            None
        } else {
            let geometry_buffer = self
                .sink_buffers
                .first()
                .or_else(|| self.source_buffers.first())
                .ok_or(AdapterError::InvalidConfig(
                    "no source and sink buffers connected",
                ))?;
            Some(*lock_buffer(geometry_buffer).params())
        };

        let (next, state_status) = self.state.transition(TriggerCommand::Prepare)?;
        self.state = next;
        if state_status == StateStatus::AlreadySet {
            warn!("component has already been prepared");
            return Ok(PipelineStatus::PathStop);
        }

        let Some(params) = params else {
            return Ok(PipelineStatus::Continue);
        };

        self.warmup_bytes = 0;

        // Period geometry settles from the first sink's negotiated
        // parameters (first source for sink-less topologies).
        self.period_bytes = params.period_bytes(self.period_frames);
        debug!(period_bytes = self.period_bytes, "prepare: period geometry");

        if self.descriptor.shape == ModuleShape::SinkSource {
            return Ok(PipelineStatus::Continue);
        }

        if self.descriptor.shape == ModuleShape::AudioStream
            && self.descriptor.max_sources > 1
            && self.descriptor.max_sinks > 1
        {
            return Err(AdapterError::InvalidConfig(
                "audio-stream modules cannot fan out on both sides",
            ));
        }

        if self.descriptor.shape != ModuleShape::RawData {
            return Ok(PipelineStatus::Continue);
        }

        self.prepare_raw_buffers(params)?;
        debug!("prepare: done");
        Ok(PipelineStatus::Continue)
    }

    /// Port discovery for sink/source modules: hand the module one handle
    /// per connected buffer and let it negotiate.
    fn prepare_sink_source(&mut self) -> Result<PipelineStatus, AdapterError> {
        self.source_ports = self
            .source_buffers
            .iter()
            .cloned()
            .map(SourcePort::new)
            .collect();
        self.sink_ports = self
            .sink_buffers
            .iter()
            .cloned()
            .map(SinkPort::new)
            .collect();
        self.module
            .prepare(&self.source_ports, &self.sink_ports)
            .map_err(AdapterError::from)
    }

    /// DP preparation: discover ports against the real buffers first, then
    /// shadow every port with a cross-domain queue the module will use
    /// instead. A failure partway through destroys every queue already
    /// created in both lists before reporting.
    fn prepare_shadow_queues(&mut self) -> Result<PipelineStatus, AdapterError> {
        let status = self.prepare_sink_source()?;
        if status == PipelineStatus::PathStop {
            return Ok(status);
        }

        match self.build_shadow_queues() {
            Ok(min_period_us) => {
                // Adopt the shortest sink fill time as the component's
                // period unless the module fixed one itself (event-only
                // or variable-rate modules have no continuous deadline).
                if self.period_us.is_none() && min_period_us != u32::MAX {
                    info!(period_us = min_period_us, "module period set");
                    self.period_us = Some(min_period_us);
                }
                Ok(PipelineStatus::Continue)
            }
            Err(e) => {
                self.ll_to_dp_queues.clear();
                self.dp_to_ll_queues.clear();
                self.source_ports.clear();
                self.sink_ports.clear();
                Err(e)
            }
        }
    }

    /// Build both queue lists; on error the caller tears down whatever was
    /// built. Returns the minimum implied sink period in microseconds.
    fn build_shadow_queues(&mut self) -> Result<u32, AdapterError> {
        let mode = if self.shared {
            QueueMode::Shared
        } else {
            QueueMode::Local
        };

        for i in 0..self.source_buffers.len() {
            let (min_available, min_free, params) = {
                let buf = lock_buffer(&self.source_buffers[i]);
                (buf.min_available_hint(), buf.min_free_hint(), *buf.params())
            };
            let queue = ShadowQueue::create(min_available, min_free, mode, params, &self.budget)?;
            // The module reads from the shadow, not the pipeline buffer.
            self.source_ports[i] = queue.source_port();
            self.ll_to_dp_queues.push(queue);
        }

        let mut min_period_us = u32::MAX;
        for i in 0..self.sink_buffers.len() {
            let (min_available, min_free, params) = {
                let buf = lock_buffer(&self.sink_buffers[i]);
                (buf.min_available_hint(), buf.min_free_hint(), *buf.params())
            };
            let queue = ShadowQueue::create(min_available, min_free, mode, params, &self.budget)?;
            self.sink_ports[i] = queue.sink_port();
            self.dp_to_ll_queues.push(queue);

            // Time to fill one queue's free space at the negotiated rate.
            let bytes_per_second = params.frame_bytes() as u64 * u64::from(params.rate);
            if bytes_per_second > 0 {
                let sink_period = (1_000_000 * min_free as u64) / bytes_per_second;
                min_period_us = min_period_us.min(sink_period as u32);
            }
        }
        Ok(min_period_us)
    }

    /// Compute warm-up geometry and allocate staging plus local sink
    /// buffers for a raw-data module. Any failure releases everything
    /// acquired by this call, in reverse order, before reporting.
    fn prepare_raw_buffers(&mut self, params: StreamParams) -> Result<(), AdapterError> {
        let in_chunk = self.descriptor.input_chunk_bytes;
        let out_chunk = self.descriptor.output_chunk_bytes;
        if in_chunk == 0 || out_chunk == 0 {
            return Err(AdapterError::InvalidConfig(
                "raw-data module must declare its chunk sizes",
            ));
        }

        // Warm-up: when the module needs more than one period of input
        // before its first output, downstream would starve. Count the
        // periods it takes to accumulate one input chunk and feed that
        // many periods of silence from the local buffers meanwhile.
        let in_periods = chunk_periods(in_chunk, self.period_bytes);
        if in_chunk != self.period_bytes {
            self.warmup_bytes = in_chunk.min(self.period_bytes) * in_periods;
            debug!(warmup_bytes = self.warmup_bytes, "deep buffering armed");
        }

        // One process call may burst more than a period of output; the
        // local buffer must hold it until the sinks drain at period pace.
        let out_periods = chunk_periods(out_chunk, self.period_bytes);
        self.output_buffer_size = out_chunk.max(self.period_bytes) * out_periods;

        if let Err(e) = self.allocate_raw_buffers(out_chunk, params) {
            self.release_raw_buffers();
            return Err(e);
        }
        Ok(())
    }

    fn allocate_raw_buffers(
        &mut self,
        out_chunk: usize,
        params: StreamParams,
    ) -> Result<(), AdapterError> {
        let local_size = self.output_buffer_size;
        let in_size = self.warmup_bytes.max(self.period_bytes);
        for _ in 0..self.source_buffers.len() {
            self.input_staging
                .push(StagingBuffer::allocate("input staging", in_size, &self.budget)?);
        }
        for _ in 0..self.sink_buffers.len() {
            self.output_staging.push(StagingBuffer::allocate(
                "output staging",
                out_chunk,
                &self.budget,
            )?);
        }

        let stream_params = self.stream_params.as_deref().copied().unwrap_or(params);
        let sink_count = self.sink_buffers.len();
        let mut local = self
            .local_sink_buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if local.is_empty() {
            for _ in 0..sink_count {
                self.budget.charge("local sink buffer", local_size)?;
                local.push(StreamBuffer::shared(local_size, stream_params));
            }
        } else {
            // Re-prepare after a reset: the buffers survive; only their
            // geometry changes. Charge or refund the size delta so a
            // failed charge leaves the accounting consistent.
            for buf in local.iter() {
                let mut b = lock_buffer(buf);
                let old = b.capacity();
                if local_size > old {
                    self.budget.charge("local sink buffer", local_size - old)?;
                    b.resize(local_size);
                } else if local_size < old {
                    self.budget.refund(old - local_size);
                    b.resize(local_size);
                }
                b.set_params(stream_params);
                b.clear();
            }
        }
        Ok(())
    }

    /// Release staging blocks and detach local sink buffers, refunding the
    /// budget. Used by the prepare error path; reset keeps the local
    /// buffers and only zeroes them.
    fn release_raw_buffers(&mut self) {
        self.input_staging.clear();
        self.output_staging.clear();
        let mut local = self
            .local_sink_buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for buf in local.drain(..) {
            self.budget.refund(lock_buffer(&buf).capacity());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::chunk_periods;

    #[test]
    fn exact_division_adds_one_spare_period() {
        assert_eq!(chunk_periods(4096, 1024), 5); // 4 periods + 1 spare
        assert_eq!(chunk_periods(1024, 1024), 2);
    }

    #[test]
    fn inexact_division_adds_two() {
        assert_eq!(chunk_periods(3000, 1024), 4); // floor(2.93) + 2
        assert_eq!(chunk_periods(1024, 3000), 4); // ratio works both ways
    }
}
