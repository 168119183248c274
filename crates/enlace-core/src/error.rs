//! Error taxonomy for the adapter layer.
//!
//! Four classes of failure cross the adapter boundary, each kept distinct
//! so callers can react without string matching:
//!
//! - resource exhaustion — always rolled back to a consistent pre-call
//!   state before being reported;
//! - invalid configuration — rejected with no partial mutation;
//! - unsupported operation — an absent optional capability, not a fault;
//! - transient no-data / no-space conditions — these never surface here at
//!   all: the copy engine absorbs them and reports success-with-no-effect.
//!
//! "Stop propagating downstream" is control flow, not an error. It travels
//! as [`PipelineStatus::PathStop`] in the `Ok` arm.

use thiserror::Error;

use crate::state::{ComponentState, TriggerCommand};

/// Outcome of a lifecycle operation that the pipeline walks along a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Keep walking the chain.
    Continue,
    /// The chain past this component is already handled; stop walking.
    PathStop,
}

/// Errors reported by the module adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// An allocation was refused by the memory budget. Everything acquired
    /// before the failure has been released again.
    #[error("out of memory: {what} needs {requested} bytes")]
    OutOfMemory {
        /// The resource that could not be allocated.
        what: &'static str,
        /// Bytes requested past the budget.
        requested: usize,
    },

    /// Port counts, buffer wiring, or processing mode do not form a
    /// runnable topology.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A state transition that the lifecycle machine does not permit.
    #[error("invalid trigger {cmd:?} in state {state:?}")]
    InvalidTransition {
        /// Current lifecycle state.
        state: ComponentState,
        /// The rejected command.
        cmd: TriggerCommand,
    },

    /// The control payload's ABI version is outside the compatibility
    /// window.
    #[error("control ABI mismatch: got major {got}, supported {supported}")]
    AbiMismatch {
        /// Major version carried by the payload.
        got: u32,
        /// Major version this build speaks.
        supported: u32,
    },

    /// The operation exists in the contract but this module does not
    /// provide it. Callers treat this as "capability absent".
    #[error("operation not supported by this module")]
    Unsupported,

    /// The hosted module failed processing with a non-transient error.
    #[error("module processing failed: {0}")]
    Module(#[from] ModuleError),
}

/// Errors reported by a hosted processing module.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModuleError {
    /// Not enough input to make progress this period. Absorbed by the
    /// copy engine.
    #[error("no data available")]
    NoDataAvailable,

    /// Not enough output space to make progress this period. Absorbed by
    /// the copy engine.
    #[error("no space available")]
    NoSpaceAvailable,

    /// The module does not implement this optional operation.
    #[error("not supported")]
    Unsupported,

    /// The module rejected its configuration payload.
    #[error("bad configuration: {0}")]
    BadConfig(&'static str),

    /// Hard processing failure; propagated to the pipeline.
    #[error("processing failed: {0}")]
    Failed(&'static str),
}

impl ModuleError {
    /// Transient conditions are success-with-no-effect for the pipeline.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NoDataAvailable | Self::NoSpaceAvailable)
    }
}
