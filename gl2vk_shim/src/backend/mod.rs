//! Backend module
//!
//! The downstream GPU interface and the in-memory recording backend.

pub mod backend;
pub mod recording_backend;

pub use backend::*;
pub use recording_backend::{
    CreatedPipeline, RecordedOp, RecordingBackend, SecondaryRecord, Submission,
};
