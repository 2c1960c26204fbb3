//! Error types for polyvox-engine
//!
//! Load failures (format, I/O, decode) abort the load and leave no partial
//! decoder state. Allocation and hardware failures are reported but never
//! fatal: callers proceed without sound.

use crate::hardware::HwError;
use polyvox_common::ResourceId;
use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// Bad signature, chunk order, missing chunk, chained stream or
    /// unsupported sample layout
    #[error("Format error: {0}")]
    Format(String),

    /// File open/read errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec failure that is not recoverable by skipping a packet
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Software hardware context refused a call
    #[error("Hardware error: {0}")]
    Hardware(#[from] HwError),

    /// Output device enumeration or stream errors
    #[error("Audio device error: {0}")]
    Device(String),

    /// No output device is initialized
    #[error("No output device initialized")]
    NoDevice,

    /// A sound for this resource is already registered
    #[error("Sound already exists for resource {0}")]
    AlreadyExists(ResourceId),

    /// No sound registered for this resource
    #[error("No sound registered for resource {0}")]
    NotFound(ResourceId),

    /// Every voice slot is busy and none may be stolen
    #[error("No voice available at priority {priority}")]
    NoVoiceAvailable { priority: u8 },

    /// Resource has not produced any decoded audio yet
    #[error("Resource {0} has no decoded audio ready")]
    NotReady(ResourceId),

    /// Format recognized but not compiled in
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration errors from polyvox-common
    #[error("Configuration error: {0}")]
    Config(#[from] polyvox_common::Error),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;
        match err {
            SymphoniaError::IoError(e) => Error::Io(e),
            SymphoniaError::Unsupported(what) => Error::Unsupported(what.to_string()),
            SymphoniaError::DecodeError(what) => Error::Decode(what.to_string()),
            other => Error::Format(other.to_string()),
        }
    }
}
