//! Error types for the gl2vk shim
//!
//! This module defines the error taxonomy shared by the layout resolver,
//! the recording scheduler and the backends.

use std::fmt;

/// Result type for shim operations
pub type Result<T> = std::result::Result<T, Error>;

/// Shim errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Calls issued in an order the state machine does not accept
    /// (begin while open, end while closed, unknown handle or node)
    ProtocolMisuse(String),

    /// A handle, name or stage that was never registered
    MissingResource(String),

    /// Push-constant or uniform payload larger than allowed
    SizeMismatch(String),

    /// A worker failed to reach its idle state within the retry budget
    Liveness(String),

    /// Pipeline layout requested before any attribute was bound
    IncompletePipeline(String),

    /// Attempt to change a pipeline layout after it was built
    LayoutFrozen(String),

    /// Backend-specific error (Vulkan device, pipeline, submit)
    BackendError(String),
}

impl Error {
    /// Fatal errors abort the current frame instead of being skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::BackendError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ProtocolMisuse(msg) => write!(f, "Protocol misuse: {}", msg),
            Error::MissingResource(msg) => write!(f, "Missing resource: {}", msg),
            Error::SizeMismatch(msg) => write!(f, "Size mismatch: {}", msg),
            Error::Liveness(msg) => write!(f, "Liveness failure: {}", msg),
            Error::IncompletePipeline(msg) => write!(f, "Incomplete pipeline: {}", msg),
            Error::LayoutFrozen(msg) => write!(f, "Layout frozen: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
