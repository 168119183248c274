//! Enlace Modules - reference processing modules
//!
//! One module per processing shape, written against the
//! [`enlace_core::Module`] contract:
//!
//! - [`Volume`] - audio-stream shape: per-sample s16 gain, configured
//!   through the fragmented binary protocol
//! - [`Rechunker`] - raw-data shape: fixed-block passthrough exercising
//!   deep buffering
//! - [`StreamCopier`] - sink/source shape: self-paced byte mover
//!
//! These are the modules the driver registry ships with; they double as
//! the executable documentation for each shape's contract.

pub mod copier;
pub mod rechunk;
pub mod volume;

pub use copier::StreamCopier;
pub use rechunk::Rechunker;
pub use volume::{MAX_GAIN, UNITY_GAIN, Volume};
