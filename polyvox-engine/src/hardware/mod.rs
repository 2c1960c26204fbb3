//! Playback hardware: a software mixing context and the devices that drive it
//!
//! The context models a source/buffer style hardware API: voices own
//! *sources*, decoded chunks are uploaded into *buffers*, and buffers are
//! queued on sources for gapless playback. An output device pulls mixed audio
//! out of the context from its stream callback.

pub mod context;
pub mod device;

pub use context::{BufferId, Context, SourceId, SourceState};
pub use device::{AudioHost, CpalHost, HeadlessHost, OutputDevice};

use thiserror::Error;

/// Error codes reported by the hardware context
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// Unknown buffer or source handle
    #[error("invalid name")]
    InvalidName,

    /// Argument out of range
    #[error("invalid value")]
    InvalidValue,

    /// Operation not allowed in the current state
    #[error("invalid operation")]
    InvalidOperation,

    /// Handle limit reached
    #[error("out of memory")]
    OutOfMemory,
}

/// Result of a hardware call
pub type HwResult<T> = std::result::Result<T, HwError>;
