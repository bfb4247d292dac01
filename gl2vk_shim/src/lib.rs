/*!
# gl2vk shim

Runs a legacy, stateful GL-style drawing API on top of an explicit
command-buffer GPU API.

The shim is made of two cooperating parts:

- **Layout resolver**: scans shader source for vertex inputs and
  push-constant blocks, issues opaque handles, and turns the "bind buffer,
  point attribute at it" call stream into a frozen vertex-input layout and
  push-constant directory per pipeline.
- **Recording scheduler**: a fixed pool of worker threads, each owning a
  lock-free command log and one secondary command buffer per frame in
  flight. The caller's thread appends commands; workers record them; an
  end-of-frame barrier collects the buffers for submission.

The GPU itself sits behind the `Backend` trait. `RecordingBackend` records
everything in memory; `gl2vk_shim_backend_vulkan` drives a real device.
*/

// Internal modules
mod error;
mod shim;
mod utils;
pub mod log;
pub mod config;
pub mod handles;
pub mod layout;
pub mod backend;
pub mod scheduler;
pub mod frontend;

// Main gl2vk namespace module
pub mod gl2vk {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging hub
    pub use crate::shim::Shim;

    // Configuration
    pub use crate::config::ShimConfig;

    // Client handles
    pub use crate::handles::{AttributeHandle, BufferHandle, PipelineHandle, UniformHandle};

    // Facade
    pub use crate::frontend::{BufferTarget, FrameStatus, Gl2Vk};

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, thread_label};
    }

    // Layout sub-module
    pub mod layout {
        pub use crate::layout::*;
    }

    // Backend sub-module
    pub mod backend {
        pub use crate::backend::*;
    }

    // Scheduler sub-module
    pub mod scheduler {
        pub use crate::scheduler::*;
    }
}
