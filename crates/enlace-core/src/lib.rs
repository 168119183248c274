//! Enlace Core - module adapter and stream buffer engine
//!
//! This crate is the adapter layer of an embedded audio pipeline: it hosts
//! a pluggable processing module and bridges it to the fixed-capacity
//! circular stream buffers that carry audio between pipeline stages under
//! hard per-period deadlines.
//!
//! # Core Abstractions
//!
//! ## Stream plumbing
//!
//! - [`StreamBuffer`] - fixed-capacity byte ring with wrap-around-safe
//!   two-segment copies
//! - [`StreamParams`] - negotiated rate/channel/sample geometry
//! - [`SourcePort`] / [`SinkPort`] - the narrow source/sink face handed to
//!   self-paced modules
//! - [`ShadowQueue`] - cross-domain double buffer standing in for a
//!   pipeline buffer when the module runs on another scheduling domain
//!
//! ## The module contract
//!
//! - [`Module`] - the hosted algorithm, dispatched by its declared
//!   [`ModuleShape`] (audio-stream, raw-data, or sink/source)
//! - [`EndpointOps`] - extra operations for host/DAI gateway modules
//!
//! ## The adapter
//!
//! - [`ModuleAdapter`] - owns one module, drives the per-period copy
//!   strategies, deep-buffering warm-up, the lifecycle state machine, and
//!   the fragmented configuration protocol
//! - [`MemoryBudget`] - allocation budget for everything the adapter owns
//!
//! # Example
//!
//! ```rust,ignore
//! use enlace_core::{AdapterConfig, ModuleAdapter, StreamBuffer, StreamParams, TriggerCommand};
//!
//! let params = StreamParams::default_pcm();
//! let source = StreamBuffer::shared(4096, params);
//! let sink = StreamBuffer::shared(4096, params);
//!
//! let mut adapter = ModuleAdapter::new(Box::new(my_module), AdapterConfig::default());
//! adapter.attach_source(&source)?;
//! adapter.attach_sink(&sink)?;
//! adapter.prepare()?;
//! adapter.trigger(TriggerCommand::Start)?;
//!
//! // every period:
//! adapter.copy()?;
//! ```
//!
//! # Design Principles
//!
//! - **Bounded work per period**: no operation blocks or suspends; every
//!   copy is bounded by buffer geometry settled at prepare time
//! - **Rollback on failure**: resource exhaustion never leaves a partial
//!   allocation behind
//! - **Transient conditions are not errors**: "no data" and "no space"
//!   are absorbed so the pipeline keeps its cadence

pub mod adapter;
pub mod budget;
pub mod control;
pub mod error;
pub mod module;
pub mod params;
pub mod port;
pub mod ring;
pub mod shadow;
pub mod staging;
pub mod state;

// Re-export main types at crate root
pub use adapter::{AdapterConfig, ComponentKind, ModuleAdapter, ProcessingDomain};
pub use budget::MemoryBudget;
pub use control::{
    ABI_MAJOR, ABI_VERSION, ControlCommand, ControlKind, ControlRequest, FragmentCursor,
    FragmentPosition, abi_compatible, abi_version,
};
pub use error::{AdapterError, ModuleError, PipelineStatus};
pub use module::{
    Direction, EndpointOps, Module, ModuleDescriptor, ModuleShape, RawInput, RawOutput,
    StreamInput, StreamOutput, StreamPosition, TimestampData,
};
pub use params::StreamParams;
pub use port::{SinkPort, SourcePort};
pub use ring::{SharedStreamBuffer, StreamBuffer, copy_between, lock_buffer};
pub use shadow::{QueueMode, ShadowQueue};
pub use staging::StagingBuffer;
pub use state::{ComponentState, StateStatus, TriggerCommand};
