//! The processing-module contract.
//!
//! A module is the hosted algorithm; the adapter owns one and drives it
//! through this trait. Exactly one processing shape applies to a module
//! for its lifetime and selects which `process_*` entry the copy engine
//! calls:
//!
//! - [`ModuleShape::AudioStream`] — the module moves exactly one period
//!   per call, reading and writing the pipeline rings through
//!   [`StreamInput`]/[`StreamOutput`] views;
//! - [`ModuleShape::RawData`] — the module works on staged contiguous
//!   chunks with its own internal buffering;
//! - [`ModuleShape::SinkSource`] — the module owns its pacing and moves
//!   bytes through port handles itself.
//!
//! Optional operations default to [`ModuleError::Unsupported`]; callers
//! treat that as "capability absent", never as a fault.

use crate::control::FragmentPosition;
use crate::error::{ModuleError, PipelineStatus};
use crate::params::StreamParams;
use crate::port::{SinkPort, SourcePort};
use crate::ring::StreamBuffer;
use crate::state::TriggerCommand;

/// Processing shape of a module, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleShape {
    /// Copies exactly one period per call.
    AudioStream,
    /// Variable internal buffering over staged chunks.
    RawData,
    /// The module manages its own pacing over port handles.
    SinkSource,
}

/// Static description a module declares before `prepare`.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDescriptor {
    /// Processing shape.
    pub shape: ModuleShape,
    /// Most source ports the module accepts. Default 1.
    pub max_sources: usize,
    /// Most sink ports the module accepts. Default 1.
    pub max_sinks: usize,
    /// Raw shape only: input bytes the module needs per process call.
    pub input_chunk_bytes: usize,
    /// Raw shape only: output bytes one process call may emit.
    pub output_chunk_bytes: usize,
    /// Whether the module can pause; when false a pause trigger keeps it
    /// running and stops chain propagation instead.
    pub supports_pause: bool,
    /// A period fixed by the module itself (event-only or variable-rate
    /// modules); `None` lets the adapter derive one from sink geometry.
    pub period_us: Option<u32>,
}

impl ModuleDescriptor {
    /// A single-source, single-sink descriptor for `shape`.
    pub const fn new(shape: ModuleShape) -> Self {
        Self {
            shape,
            max_sources: 1,
            max_sinks: 1,
            input_chunk_bytes: 0,
            output_chunk_bytes: 0,
            supports_pause: true,
            period_us: None,
        }
    }
}

/// One input offered to an audio-stream module: a view of the source ring
/// plus the frame count the copy engine sized for this period.
#[derive(Debug)]
pub struct StreamInput<'a> {
    /// The source ring; read with [`StreamBuffer::peek_at`], do not
    /// consume — report via `consumed` instead.
    pub stream: &'a StreamBuffer,
    /// Whole frames the module may read this period.
    pub frames: usize,
    /// Bytes actually consumed; the adapter commits exactly this much.
    pub consumed: usize,
}

/// One output offered to an audio-stream module.
#[derive(Debug)]
pub struct StreamOutput<'a> {
    /// The sink ring; write with [`StreamBuffer::write_at`], do not
    /// produce — report via `produced` instead.
    pub stream: &'a mut StreamBuffer,
    /// Bytes actually written; the adapter commits exactly this much.
    pub produced: usize,
}

/// One staged input chunk offered to a raw-data module.
#[derive(Debug)]
pub struct RawInput<'a> {
    /// The staged bytes.
    pub data: &'a [u8],
    /// Bytes the module consumed from `data`.
    pub consumed: usize,
}

/// One output staging block offered to a raw-data module.
#[derive(Debug)]
pub struct RawOutput<'a> {
    /// The staging block to produce into.
    pub data: &'a mut [u8],
    /// Bytes the module produced into `data`.
    pub produced: usize,
}

/// A stream position report from an endpoint module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamPosition {
    /// Bytes moved on the host side.
    pub host_bytes: u64,
    /// Bytes moved on the DAI side.
    pub dai_bytes: u64,
}

/// A hardware timestamp pair from an endpoint module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampData {
    /// Wall-clock reading.
    pub wallclock: u64,
    /// Samples moved at the reading.
    pub sample_count: u64,
}

/// Direction of an endpoint's hardware stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Memory to interface.
    Playback,
    /// Interface to memory.
    Capture,
}

/// Extra operations exposed only by host/DAI endpoint modules.
pub trait EndpointOps {
    /// Endpoint-specific trigger handling, replacing the generic state
    /// machine for endpoint-typed components.
    fn trigger(&mut self, cmd: TriggerCommand) -> Result<PipelineStatus, ModuleError>;

    /// Current stream position.
    fn position(&mut self) -> Result<StreamPosition, ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Hardware stream parameters for `dir`.
    fn hw_params(&mut self, _dir: Direction) -> Result<StreamParams, ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Configure hardware timestamping.
    fn timestamp_config(&mut self) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Start hardware timestamping.
    fn timestamp_start(&mut self) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Stop hardware timestamping.
    fn timestamp_stop(&mut self) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Read the current hardware timestamp.
    fn timestamp_get(&mut self) -> Result<TimestampData, ModuleError> {
        Err(ModuleError::Unsupported)
    }
}

/// The hosted processing algorithm.
pub trait Module: Send {
    /// Static capability description. Called once at adapter creation;
    /// the shape and port bounds it declares are fixed thereafter.
    fn descriptor(&self) -> ModuleDescriptor;

    /// Negotiate and allocate for the connected ports. Sink/source
    /// modules receive their port handles; other shapes receive empty
    /// slices. `Ok(PathStop)` stops chain propagation without error.
    fn prepare(
        &mut self,
        _sources: &[SourcePort],
        _sinks: &[SinkPort],
    ) -> Result<PipelineStatus, ModuleError> {
        Ok(PipelineStatus::Continue)
    }

    /// Audio-stream processing over ring views.
    fn process_stream(
        &mut self,
        _inputs: &mut [StreamInput<'_>],
        _outputs: &mut [StreamOutput<'_>],
    ) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Raw-data processing over staged chunks.
    fn process_raw(
        &mut self,
        _inputs: &mut [RawInput<'_>],
        _outputs: &mut [RawOutput<'_>],
    ) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Self-paced processing over port handles.
    fn process_sink_source(
        &mut self,
        _sources: &mut [SourcePort],
        _sinks: &mut [SinkPort],
    ) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Endpoint processing with no buffers (host/DAI components drive
    /// their own DMA).
    fn process_endpoint(&mut self) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Drop processing state; the module stays instantiated.
    fn reset(&mut self) -> Result<PipelineStatus, ModuleError> {
        Ok(PipelineStatus::Continue)
    }

    /// Release everything; called exactly once at teardown.
    fn free(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Apply one configuration fragment at `offset` within the blob.
    /// For the `First` position, `offset` carries the total blob size so
    /// the module can size its assembly buffer.
    fn set_configuration(
        &mut self,
        _param_id: u32,
        _position: FragmentPosition,
        _offset: usize,
        _fragment: &[u8],
    ) -> Result<(), ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Emit one configuration fragment into `dst`, updating `offset` to
    /// the position within the blob. Returns bytes written.
    fn get_configuration(
        &mut self,
        _position: FragmentPosition,
        _offset: &mut usize,
        _dst: &mut [u8],
    ) -> Result<usize, ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Module-specific trigger handling; `Unsupported` falls back to the
    /// adapter's generic state transition.
    fn trigger(&mut self, _cmd: TriggerCommand) -> Result<PipelineStatus, ModuleError> {
        Err(ModuleError::Unsupported)
    }

    /// Endpoint operations, present only on host/DAI modules.
    fn endpoint_ops(&mut self) -> Option<&mut dyn EndpointOps> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl Module for Bare {
        fn descriptor(&self) -> ModuleDescriptor {
            ModuleDescriptor::new(ModuleShape::AudioStream)
        }
    }

    #[test]
    fn defaults_report_absent_capabilities() {
        let mut m = Bare;
        assert_eq!(
            m.process_raw(&mut [], &mut []),
            Err(ModuleError::Unsupported)
        );
        assert_eq!(
            m.trigger(TriggerCommand::Start),
            Err(ModuleError::Unsupported)
        );
        assert!(m.endpoint_ops().is_none());
        assert_eq!(m.prepare(&[], &[]), Ok(PipelineStatus::Continue));
    }

    #[test]
    fn descriptor_defaults_are_single_port() {
        let d = ModuleDescriptor::new(ModuleShape::RawData);
        assert_eq!(d.max_sources, 1);
        assert_eq!(d.max_sinks, 1);
        assert!(d.supports_pause);
        assert!(d.period_us.is_none());
    }
}
