//! The module adapter: hosts one processing module and bridges it to the
//! pipeline's circular stream buffers.
//!
//! The adapter owns the module, borrows the connected buffers from the
//! topology, and drives the per-period copy, the lifecycle protocol, and
//! the fragmented configuration protocol. Everything the adapter allocates
//! itself — staging buffers, local sink buffers, shadow queues — is
//! charged against a [`MemoryBudget`] and released on reset or teardown.

mod copy;
mod prepare;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use crate::budget::MemoryBudget;
use crate::control::{
    ABI_MAJOR, ControlCommand, ControlKind, ControlRequest, FragmentCursor, FragmentPosition,
    abi_compatible, abi_major,
};
use crate::error::{AdapterError, ModuleError, PipelineStatus};
use crate::module::{Direction, Module, ModuleDescriptor, ModuleShape, StreamPosition, TimestampData};
use crate::params::StreamParams;
use crate::port::{SinkPort, SourcePort};
use crate::ring::{SharedStreamBuffer, lock_buffer};
use crate::shadow::ShadowQueue;
use crate::staging::StagingBuffer;
use crate::state::{ComponentState, StateStatus, TriggerCommand};

/// What kind of pipeline component this adapter instance represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// An ordinary processing component between buffers.
    Generic,
    /// A host gateway; skips buffer copy and drives its own transfers.
    HostEndpoint,
    /// A digital-audio-interface gateway.
    DaiEndpoint,
}

impl ComponentKind {
    /// Host and DAI components bypass the generic copy and trigger paths.
    #[inline]
    pub fn is_endpoint(self) -> bool {
        matches!(self, Self::HostEndpoint | Self::DaiEndpoint)
    }
}

/// Scheduling domain the hosted module executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingDomain {
    /// Low-latency: synchronous with the pipeline's period ticks.
    Ll,
    /// Data-processing: independently scheduled, possibly another core.
    Dp,
}

/// Static configuration for one adapter instance.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Component kind.
    pub kind: ComponentKind,
    /// Scheduling domain of the hosted module.
    pub domain: ProcessingDomain,
    /// Whether the component's storage must be visible across cores.
    pub shared: bool,
    /// Frames the pipeline moves per period.
    pub period_frames: usize,
    /// Allocation budget for adapter-owned resources.
    pub budget: MemoryBudget,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            kind: ComponentKind::Generic,
            domain: ProcessingDomain::Ll,
            shared: false,
            period_frames: 48,
            budget: MemoryBudget::unbounded(),
        }
    }
}

/// Hosts one processing module and connects it to the pipeline.
pub struct ModuleAdapter {
    module: Box<dyn Module>,
    descriptor: ModuleDescriptor,
    kind: ComponentKind,
    domain: ProcessingDomain,
    shared: bool,
    state: ComponentState,
    budget: MemoryBudget,

    /// Connected pipeline buffers, in port order. Borrowed from the
    /// topology, bounded by the module's declared maximums.
    source_buffers: Vec<SharedStreamBuffer>,
    sink_buffers: Vec<SharedStreamBuffer>,

    /// Module-facing port handles for sink/source shaped modules. In the
    /// DP domain these are overridden to point at shadow queues.
    source_ports: Vec<SourcePort>,
    sink_ports: Vec<SinkPort>,

    /// Staging blocks for raw-data shaped modules, one per port.
    input_staging: Vec<StagingBuffer>,
    output_staging: Vec<StagingBuffer>,

    /// Intermediate accumulation buffers between the module's bursty
    /// output and the evenly-paced true sinks. Attach/detach is the only
    /// critical section shared with interrupt context.
    local_sink_buffers: Mutex<Vec<SharedStreamBuffer>>,
    output_buffer_size: usize,

    /// Shadow queues per direction, present only for DP components.
    ll_to_dp_queues: Vec<ShadowQueue>,
    dp_to_ll_queues: Vec<ShadowQueue>,

    /// Cached stream parameters, replaced wholesale on every change.
    stream_params: Option<Box<StreamParams>>,
    period_frames: usize,
    period_bytes: usize,
    period_us: Option<u32>,

    /// Warm-up bytes still required before sinks receive real output.
    warmup_bytes: usize,

    total_data_consumed: u64,
    total_data_produced: u64,

    cfg_cursor: FragmentCursor,
}

impl ModuleAdapter {
    /// Create an adapter hosting `module`. The module's descriptor (shape
    /// and port bounds) is fixed from here on.
    pub fn new(module: Box<dyn Module>, config: AdapterConfig) -> Self {
        let descriptor = module.descriptor();
        debug!(shape = ?descriptor.shape, kind = ?config.kind, "module adapter created");
        Self {
            module,
            descriptor,
            kind: config.kind,
            domain: config.domain,
            shared: config.shared,
            state: ComponentState::Ready,
            budget: config.budget,
            source_buffers: Vec::new(),
            sink_buffers: Vec::new(),
            source_ports: Vec::new(),
            sink_ports: Vec::new(),
            input_staging: Vec::new(),
            output_staging: Vec::new(),
            local_sink_buffers: Mutex::new(Vec::new()),
            output_buffer_size: 0,
            ll_to_dp_queues: Vec::new(),
            dp_to_ll_queues: Vec::new(),
            stream_params: None,
            period_frames: config.period_frames,
            period_bytes: 0,
            period_us: descriptor.period_us,
            warmup_bytes: 0,
            total_data_consumed: 0,
            total_data_produced: 0,
            cfg_cursor: FragmentCursor::default(),
        }
    }

    /// Connect an upstream buffer to the next source port.
    pub fn attach_source(&mut self, buffer: &SharedStreamBuffer) -> Result<(), AdapterError> {
        if self.source_buffers.len() >= self.descriptor.max_sources {
            return Err(AdapterError::InvalidConfig(
                "source port count exceeds module limit",
            ));
        }
        self.source_buffers.push(buffer.clone());
        Ok(())
    }

    /// Connect a downstream buffer to the next sink port.
    pub fn attach_sink(&mut self, buffer: &SharedStreamBuffer) -> Result<(), AdapterError> {
        if self.sink_buffers.len() >= self.descriptor.max_sinks {
            return Err(AdapterError::InvalidConfig(
                "sink port count exceeds module limit",
            ));
        }
        self.sink_buffers.push(buffer.clone());
        Ok(())
    }

    /// Cache a new set of negotiated stream parameters.
    pub fn set_stream_params(&mut self, params: StreamParams) -> Result<(), AdapterError> {
        if !params.is_valid() {
            return Err(AdapterError::InvalidConfig(
                "stream parameters must be nonzero",
            ));
        }
        self.stream_params = Some(Box::new(params));
        Ok(())
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// The hosted module's processing shape.
    #[inline]
    pub fn shape(&self) -> ModuleShape {
        self.descriptor.shape
    }

    /// Bytes one period moves through this component.
    #[inline]
    pub fn period_bytes(&self) -> usize {
        self.period_bytes
    }

    /// The component's period in microseconds, when one has been fixed or
    /// derived.
    #[inline]
    pub fn period_us(&self) -> Option<u32> {
        self.period_us
    }

    /// Warm-up bytes still outstanding; zero once deep buffering is done
    /// or was never needed.
    #[inline]
    pub fn warmup_bytes(&self) -> usize {
        self.warmup_bytes
    }

    /// Total bytes consumed from sources since the last reset.
    #[inline]
    pub fn total_data_consumed(&self) -> u64 {
        self.total_data_consumed
    }

    /// Total bytes produced toward sinks since the last reset.
    #[inline]
    pub fn total_data_produced(&self) -> u64 {
        self.total_data_produced
    }

    /// Connected source port count.
    #[inline]
    pub fn source_count(&self) -> usize {
        self.source_buffers.len()
    }

    /// Connected sink port count.
    #[inline]
    pub fn sink_count(&self) -> usize {
        self.sink_buffers.len()
    }

    /// Shadow queues currently allocated, (pipeline→module, module→pipeline).
    #[inline]
    pub fn shadow_queue_counts(&self) -> (usize, usize) {
        (self.ll_to_dp_queues.len(), self.dp_to_ll_queues.len())
    }

    /// Local sink buffers currently attached.
    pub fn local_buffer_count(&self) -> usize {
        self.local_buffers().len()
    }

    pub(crate) fn local_buffers(&self) -> MutexGuard<'_, Vec<SharedStreamBuffer>> {
        self.local_sink_buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a lifecycle transition.
    ///
    /// Endpoint components delegate to their endpoint ops; a pause lands
    /// on a module that cannot pause forces it active and stops chain
    /// propagation; modules exposing their own trigger capability handle
    /// the command entirely; everyone else takes the generic transition.
    pub fn trigger(&mut self, cmd: TriggerCommand) -> Result<PipelineStatus, AdapterError> {
        debug!(cmd = ?cmd, "trigger");

        if self.kind.is_endpoint() {
            let ops = self.module.endpoint_ops().ok_or(AdapterError::Unsupported)?;
            return ops.trigger(cmd).map_err(AdapterError::from);
        }

        if cmd == TriggerCommand::Pause && !self.descriptor.supports_pause {
            self.state = ComponentState::Active;
            return Ok(PipelineStatus::PathStop);
        }

        match self.module.trigger(cmd) {
            Ok(status) => Ok(status),
            Err(ModuleError::Unsupported) => {
                let (next, status) = self.state.transition(cmd)?;
                self.state = next;
                Ok(match status {
                    StateStatus::Changed => PipelineStatus::Continue,
                    StateStatus::AlreadySet => PipelineStatus::PathStop,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Dispatch one control request. `response` receives payload bytes for
    /// the get commands; the returned count says how many were written.
    pub fn command(
        &mut self,
        req: &ControlRequest<'_>,
        response: &mut [u8],
    ) -> Result<usize, AdapterError> {
        debug!(command = ?req.command, "command");
        match req.command {
            ControlCommand::SetData => {
                self.get_set_data(req, true, &mut [])?;
                Ok(0)
            }
            ControlCommand::GetData => self.get_set_data(req, false, response),
            ControlCommand::SetValue => {
                match self
                    .module
                    .set_configuration(0, FragmentPosition::Single, 0, req.data)
                {
                    Ok(()) | Err(ModuleError::Unsupported) => Ok(0),
                    Err(e) => Err(e.into()),
                }
            }
            ControlCommand::GetValue => {
                let mut offset = 0;
                match self
                    .module
                    .get_configuration(FragmentPosition::Single, &mut offset, response)
                {
                    Ok(n) => Ok(n),
                    Err(ModuleError::Unsupported) => Ok(0),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn get_set_data(
        &mut self,
        req: &ControlRequest<'_>,
        set: bool,
        response: &mut [u8],
    ) -> Result<usize, AdapterError> {
        if !abi_compatible(req.abi_version) {
            error!(
                got = abi_major(req.abi_version),
                "control ABI version mismatch"
            );
            return Err(AdapterError::AbiMismatch {
                got: abi_major(req.abi_version),
                supported: ABI_MAJOR,
            });
        }

        match req.kind {
            ControlKind::Enum => Err(AdapterError::InvalidConfig(
                "enum controls cannot carry data transfers",
            )),
            ControlKind::Binary => {
                let (position, offset) =
                    self.cfg_cursor
                        .locate(req.num_elems, req.elems_remaining, req.msg_index);
                debug!(
                    num_elems = req.num_elems,
                    elems_remaining = req.elems_remaining,
                    msg_index = req.msg_index,
                    position = ?position,
                    "config fragment"
                );
                if set {
                    match self
                        .module
                        .set_configuration(req.param_id, position, offset, req.data)
                    {
                        Ok(()) => Ok(0),
                        Err(ModuleError::Unsupported) => {
                            warn!("module has no configuration op; fragment dropped");
                            Ok(0)
                        }
                        Err(e) => Err(e.into()),
                    }
                } else {
                    let mut off = offset;
                    match self.module.get_configuration(position, &mut off, response) {
                        Ok(n) => Ok(n),
                        Err(ModuleError::Unsupported) => {
                            warn!("module has no configuration op; nothing read");
                            Ok(0)
                        }
                        Err(e) => Err(e.into()),
                    }
                }
            }
        }
    }

    /// Reset to a pre-prepare state: module reset, all adapter-owned
    /// resources released, counters zeroed. Connected pipeline buffers
    /// stay attached; local sink buffers are zeroed but kept.
    pub fn reset(&mut self) -> Result<PipelineStatus, AdapterError> {
        debug!("reset: start");
        match self.module.reset() {
            Ok(PipelineStatus::PathStop) => return Ok(PipelineStatus::PathStop),
            Ok(PipelineStatus::Continue) => {}
            Err(e) => {
                error!(error = %e, "module reset failed");
                return Err(e.into());
            }
        }

        self.input_staging.clear();
        self.output_staging.clear();
        self.ll_to_dp_queues.clear();
        self.dp_to_ll_queues.clear();
        self.source_ports.clear();
        self.sink_ports.clear();
        self.total_data_consumed = 0;
        self.total_data_produced = 0;

        for buf in self.local_buffers().iter() {
            lock_buffer(buf).clear();
        }
        self.stream_params = None;

        let (next, _) = self.state.transition(TriggerCommand::Reset)?;
        self.state = next;
        debug!("reset: done");
        Ok(PipelineStatus::Continue)
    }

    /// Hardware stream parameters from an endpoint module.
    pub fn hw_params(&mut self, dir: Direction) -> Result<StreamParams, AdapterError> {
        match self.module.endpoint_ops() {
            Some(ops) => ops.hw_params(dir).map_err(Into::into),
            None => Err(AdapterError::Unsupported),
        }
    }

    /// Stream position from an endpoint module.
    pub fn position(&mut self) -> Result<StreamPosition, AdapterError> {
        match self.module.endpoint_ops() {
            Some(ops) => ops.position().map_err(Into::into),
            None => Err(AdapterError::Unsupported),
        }
    }

    /// Configure hardware timestamping on an endpoint module.
    pub fn timestamp_config(&mut self) -> Result<(), AdapterError> {
        match self.module.endpoint_ops() {
            Some(ops) => ops.timestamp_config().map_err(Into::into),
            None => Err(AdapterError::Unsupported),
        }
    }

    /// Start hardware timestamping on an endpoint module.
    pub fn timestamp_start(&mut self) -> Result<(), AdapterError> {
        match self.module.endpoint_ops() {
            Some(ops) => ops.timestamp_start().map_err(Into::into),
            None => Err(AdapterError::Unsupported),
        }
    }

    /// Stop hardware timestamping on an endpoint module.
    pub fn timestamp_stop(&mut self) -> Result<(), AdapterError> {
        match self.module.endpoint_ops() {
            Some(ops) => ops.timestamp_stop().map_err(Into::into),
            None => Err(AdapterError::Unsupported),
        }
    }

    /// Read the current hardware timestamp from an endpoint module.
    pub fn timestamp_get(&mut self) -> Result<TimestampData, AdapterError> {
        match self.module.endpoint_ops() {
            Some(ops) => ops.timestamp_get().map_err(Into::into),
            None => Err(AdapterError::Unsupported),
        }
    }
}

impl core::fmt::Debug for ModuleAdapter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleAdapter")
            .field("kind", &self.kind)
            .field("domain", &self.domain)
            .field("shared", &self.shared)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for ModuleAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.module.free() {
            error!(error = %e, "module free failed");
        }
        let mut local = self
            .local_sink_buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for buf in local.drain(..) {
            self.budget.refund(lock_buffer(&buf).capacity());
        }
    }
}
