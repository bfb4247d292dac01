//! Recording scheduler module
//!
//! Command records, the per-node SPSC command log, recording nodes and the
//! scheduler that drives them frame by frame.

pub mod command;
pub mod command_log;
pub mod draw_bindings;
pub mod command_node;
pub mod recording_scheduler;

pub use command::{Command, OpCode, MAX_INLINE_PAYLOAD};
pub use command_log::{CommandLog, PushError};
pub use draw_bindings::{DrawBindings, DrawBindingsId, DrawBindingsTable};
pub use command_node::{CommandNode, NodeState, NodeStats};
pub use recording_scheduler::{ActiveFrame, FinishedFrame, RecordingScheduler};
