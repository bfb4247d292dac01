//! Recording nodes
//!
//! A node is one worker thread draining one `CommandLog` into the secondary
//! command buffers it owns (one per frame-in-flight slot).
//!
//! Sleep protocol:
//!
//! - The worker finds its slot empty, stores `EnteringSleep`, then re-checks
//!   the slot. If a command arrived meanwhile it goes back to work, otherwise
//!   it stores `Sleeping` and parks (bounded by `park_timeout`).
//! - The producer publishes the opcode, then loads the worker state and
//!   unparks it when it is `EnteringSleep` or `Sleeping`.
//!
//! Both sides store before they load (`SeqCst`), so at least one of them
//! observes the other and a wake can not be lost. Park tokens cover the
//! window between the `Sleeping` store and the actual park.
//!
//! Backpressure is the mirror image: a producer facing a full log registers
//! itself as waiting, re-checks the slot and parks; the worker unparks it
//! after every pop.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use crate::backend::{Backend, BufferId, PipelineId, RenderPassContext, SecondaryBufferId};
use crate::config::ShimConfig;
use crate::error::{Error, Result};
use crate::layout::StageFlags;
use crate::scheduler::command::{Command, OpCode};
use crate::scheduler::command_log::{CommandLog, PushError};
use crate::scheduler::draw_bindings::{DrawBindingsId, DrawBindingsTable};
use crate::{shim_debug, shim_error, shim_err, shim_trace, shim_warn};

const SOURCE: &str = "gl2vk::CommandNode";

/// Worker lifecycle state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Thread spawned, loop not entered yet
    Inactive = 0,
    AwaitingNextCommand = 1,
    Running = 2,
    /// Slot found empty, re-checking before sleep
    EnteringSleep = 3,
    Sleeping = 4,
    Waking = 5,
    /// Worker exited after `Shutdown`
    Killed = 6,
}

impl NodeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeState::AwaitingNextCommand,
            2 => NodeState::Running,
            3 => NodeState::EnteringSleep,
            4 => NodeState::Sleeping,
            5 => NodeState::Waking,
            6 => NodeState::Killed,
            _ => NodeState::Inactive,
        }
    }
}

/// Counters of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub state: NodeState,
    /// Commands published to the node
    pub pushed: u64,
    /// Commands fully executed by the worker
    pub executed: u64,
    /// Commands skipped as protocol misuse
    pub misuse: u64,
    /// Times the producer had to wait for a free slot
    pub backpressure_stalls: u64,
}

// ============================================================================
// Shared node state
// ============================================================================

struct NodeShared {
    id: usize,
    log: CommandLog,
    state: AtomicU8,
    worker: OnceLock<Thread>,
    producer: Mutex<Option<Thread>>,
    producer_waiting: AtomicBool,
    idle_lock: Mutex<()>,
    idle: Condvar,
    /// Per frame slot: secondary buffer currently open
    open: Box<[AtomicBool]>,
    completed: AtomicU64,
    misuse: AtomicU64,
    stalls: AtomicU64,
    fatal: Mutex<Option<Error>>,
}

impl NodeShared {
    fn new(id: usize, config: &ShimConfig) -> Self {
        Self {
            id,
            log: CommandLog::new(config.log_capacity),
            state: AtomicU8::new(NodeState::Inactive as u8),
            worker: OnceLock::new(),
            producer: Mutex::new(None),
            producer_waiting: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            open: (0..config.frames_in_flight).map(|_| AtomicBool::new(false)).collect(),
            completed: AtomicU64::new(0),
            misuse: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
            fatal: Mutex::new(None),
        }
    }

    fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: NodeState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn any_open(&self) -> bool {
        self.open.iter().any(|flag| flag.load(Ordering::SeqCst))
    }

    fn is_idle(&self) -> bool {
        self.state() == NodeState::Sleeping
            && self.completed.load(Ordering::SeqCst) == self.log.pushed()
            && !self.any_open()
    }

    /// Producer side: wake the worker if it is going to sleep or asleep
    fn wake_worker(&self) {
        if matches!(self.state(), NodeState::EnteringSleep | NodeState::Sleeping) {
            if let Some(worker) = self.worker.get() {
                worker.unpark();
            }
        }
    }

    /// Consumer side: release a producer blocked on a full log
    fn release_producer(&self) {
        if self.producer_waiting.load(Ordering::SeqCst) {
            if let Some(producer) = self.producer.lock().as_ref() {
                producer.unpark();
            }
        }
    }
}

// ============================================================================
// CommandNode (producer-side handle)
// ============================================================================

/// One recording node and its worker thread
pub struct CommandNode {
    shared: Arc<NodeShared>,
    buffers: Vec<SecondaryBufferId>,
    thread: Option<JoinHandle<()>>,
    backpressure_timeout: Duration,
}

impl CommandNode {
    /// Allocate the node's secondary buffers and start its worker
    pub fn spawn(
        id: usize,
        backend: Arc<dyn Backend>,
        bindings: Arc<DrawBindingsTable>,
        config: &ShimConfig,
    ) -> Result<Self> {
        let buffers = (0..config.frames_in_flight)
            .map(|_| backend.allocate_secondary_buffer(id))
            .collect::<Result<Vec<_>>>()?;
        let shared = Arc::new(NodeShared::new(id, config));

        let worker = Worker {
            shared: Arc::clone(&shared),
            backend,
            bindings,
            buffers: buffers.clone(),
            current: None,
            bound_pipeline: None,
            bound_bindings: None,
            park_timeout: config.park_timeout,
        };
        let thread = thread::Builder::new()
            .name(format!("gl2vk-node-{}", id))
            .spawn(move || worker.run())
            .map_err(|e| shim_err!(SOURCE, "Failed to spawn recording node {}: {}", id, e))?;
        let _ = shared.worker.set(thread.thread().clone());

        shim_debug!(SOURCE, "Recording node {} started with {} secondary buffers", id, buffers.len());

        Ok(Self {
            shared,
            buffers,
            thread: Some(thread),
            backpressure_timeout: config.backpressure_timeout,
        })
    }

    pub fn id(&self) -> usize {
        self.shared.id
    }

    pub fn state(&self) -> NodeState {
        self.shared.state()
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            state: self.shared.state(),
            pushed: self.shared.log.pushed(),
            executed: self.shared.completed.load(Ordering::SeqCst),
            misuse: self.shared.misuse.load(Ordering::SeqCst),
            backpressure_stalls: self.shared.stalls.load(Ordering::SeqCst),
        }
    }

    /// Secondary buffer owned for a frame slot
    pub fn buffer(&self, frame_index: usize) -> Option<SecondaryBufferId> {
        self.buffers.get(frame_index).copied()
    }

    /// Whether the secondary buffer of a frame slot is open
    pub fn is_recording(&self, frame_index: usize) -> bool {
        self.shared
            .open
            .get(frame_index)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn is_alive(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Publish a command, blocking while the log is full
    pub fn enqueue(&self, command: Command) -> Result<()> {
        loop {
            if self.shared.state() == NodeState::Killed || !self.is_alive() {
                return Err(Error::ProtocolMisuse(format!(
                    "Recording node {} is shut down",
                    self.id()
                )));
            }
            match self.shared.log.try_push(command) {
                Ok(()) => {
                    self.shared.wake_worker();
                    return Ok(());
                }
                Err(PushError::Empty) => {
                    return Err(Error::ProtocolMisuse("Cannot enqueue an empty command".to_string()));
                }
                Err(PushError::Full) => self.wait_for_slot(),
            }
        }
    }

    fn wait_for_slot(&self) {
        let shared = &self.shared;
        shared.stalls.fetch_add(1, Ordering::Relaxed);
        *shared.producer.lock() = Some(thread::current());
        shared.producer_waiting.store(true, Ordering::SeqCst);
        if !shared.log.next_slot_free() {
            shared.wake_worker();
            thread::park_timeout(self.backpressure_timeout);
        }
        shared.producer_waiting.store(false, Ordering::SeqCst);
    }

    /// Block until the worker is asleep with an empty log and no open buffer
    ///
    /// Waits at most `retry_budget` times `backoff`, then reports a
    /// liveness failure.
    pub fn await_idle(&self, retry_budget: u32, backoff: Duration) -> Result<()> {
        let shared = &self.shared;
        if shared.state() == NodeState::Killed {
            return Err(Error::ProtocolMisuse(format!(
                "Recording node {} is shut down",
                self.id()
            )));
        }

        let mut guard = shared.idle_lock.lock();
        for _ in 0..retry_budget {
            if shared.is_idle() {
                return Ok(());
            }
            shared.idle.wait_for(&mut guard, backoff);
        }
        if shared.is_idle() {
            return Ok(());
        }

        Err(Error::Liveness(format!(
            "Recording node {} not idle after {} retries (state {:?}, {}/{} commands executed)",
            self.id(),
            retry_budget,
            shared.state(),
            shared.completed.load(Ordering::SeqCst),
            shared.log.pushed()
        )))
    }

    /// Take the first fatal backend error the worker hit, if any
    pub fn take_fatal(&self) -> Option<Error> {
        self.shared.fatal.lock().take()
    }

    /// Send `Shutdown` and join the worker thread
    pub fn shutdown(&mut self) {
        if self.thread.is_none() {
            return;
        }
        if let Err(e) = self.enqueue(Command::shutdown()) {
            shim_debug!(SOURCE, "{}", e);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                shim_error!(SOURCE, "Recording node {} panicked", self.id());
            }
        }
    }
}

impl Drop for CommandNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Worker (consumer side)
// ============================================================================

struct Worker {
    shared: Arc<NodeShared>,
    backend: Arc<dyn Backend>,
    bindings: Arc<DrawBindingsTable>,
    buffers: Vec<SecondaryBufferId>,
    /// Frame slot whose buffer is open
    current: Option<usize>,
    bound_pipeline: Option<PipelineId>,
    bound_bindings: Option<DrawBindingsId>,
    park_timeout: Duration,
}

impl Worker {
    fn run(mut self) {
        shim_trace!(SOURCE, "Node {} entering command loop", self.shared.id);
        self.shared.set_state(NodeState::AwaitingNextCommand);

        loop {
            let Some(command) = self.shared.log.try_pop() else {
                self.sleep();
                continue;
            };
            self.shared.release_producer();
            self.shared.set_state(NodeState::Running);
            let keep_running = self.execute(command);
            self.shared.completed.fetch_add(1, Ordering::SeqCst);
            if !keep_running {
                break;
            }
            self.shared.set_state(NodeState::AwaitingNextCommand);
        }

        let _guard = self.shared.idle_lock.lock();
        self.shared.set_state(NodeState::Killed);
        self.shared.idle.notify_all();
        shim_trace!(SOURCE, "Node {} exited", self.shared.id);
    }

    fn sleep(&self) {
        let shared = &self.shared;
        shared.set_state(NodeState::EnteringSleep);
        if shared.log.has_pending() {
            shared.set_state(NodeState::AwaitingNextCommand);
            return;
        }
        {
            let _guard = shared.idle_lock.lock();
            shared.set_state(NodeState::Sleeping);
            shared.idle.notify_all();
        }
        thread::park_timeout(self.park_timeout);
        shared.set_state(NodeState::Waking);
        shared.set_state(NodeState::AwaitingNextCommand);
    }

    /// Execute one command; returns false once the worker must exit
    fn execute(&mut self, command: Command) -> bool {
        let outcome = match command.op {
            OpCode::BeginRecording => {
                self.begin(command.int0 as usize, command.int1 as u32, command.handle0)
            }
            OpCode::EndRecording => self.end(),
            OpCode::Draw => self.draw(&command, false),
            OpCode::DrawIndexed => self.draw(&command, true),
            OpCode::BufferUpload => self.upload(&command),
            OpCode::PushConstants => self.push_constants(&command),
            OpCode::Shutdown => {
                if self.current.is_some() {
                    if let Err(e) = self.end() {
                        self.report(e);
                    }
                }
                return false;
            }
            OpCode::None => Ok(()),
        };
        if let Err(e) = outcome {
            self.report(e);
        }
        true
    }

    fn report(&self, error: Error) {
        if error.is_fatal() {
            shim_error!(SOURCE, "Node {}: {}", self.shared.id, error);
            let mut fatal = self.shared.fatal.lock();
            if fatal.is_none() {
                *fatal = Some(error);
            }
        } else {
            self.shared.misuse.fetch_add(1, Ordering::SeqCst);
            shim_warn!(SOURCE, "Node {}: {} (command skipped)", self.shared.id, error);
        }
    }

    fn open_buffer(&self, what: &str) -> Result<SecondaryBufferId> {
        match self.current {
            Some(frame) => Ok(self.buffers[frame]),
            None => Err(Error::ProtocolMisuse(format!("{} with no open command buffer", what))),
        }
    }

    fn begin(&mut self, frame_index: usize, image_index: u32, pipeline: u64) -> Result<()> {
        let Some(buffer) = self.buffers.get(frame_index).copied() else {
            return Err(Error::ProtocolMisuse(format!(
                "BeginRecording for frame slot {} (only {} slots)",
                frame_index,
                self.buffers.len()
            )));
        };
        if let Some(open) = self.current {
            return Err(Error::ProtocolMisuse(format!(
                "BeginRecording for frame slot {} while slot {} is still recording",
                frame_index, open
            )));
        }

        self.backend
            .begin_secondary_buffer(buffer, RenderPassContext { frame_index, image_index })?;
        self.shared.open[frame_index].store(true, Ordering::SeqCst);
        self.current = Some(frame_index);
        self.bound_pipeline = None;
        self.bound_bindings = None;

        if pipeline != 0 {
            self.backend.bind_pipeline(buffer, PipelineId(pipeline))?;
            self.bound_pipeline = Some(PipelineId(pipeline));
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let Some(frame_index) = self.current.take() else {
            return Err(Error::ProtocolMisuse("EndRecording with no open command buffer".to_string()));
        };
        self.shared.open[frame_index].store(false, Ordering::SeqCst);
        self.backend.end_secondary_buffer(self.buffers[frame_index])
    }

    fn draw(&mut self, command: &Command, indexed: bool) -> Result<()> {
        let buffer = self.open_buffer(if indexed { "DrawIndexed" } else { "Draw" })?;
        let id = DrawBindingsId(command.handle0);
        let bindings = self
            .bindings
            .get(id)
            .ok_or_else(|| Error::MissingResource(format!("Unknown draw bindings {}", id.0)))?;
        if indexed && bindings.index_buffer.is_none() {
            return Err(Error::ProtocolMisuse("DrawIndexed without an index buffer".to_string()));
        }

        if self.bound_pipeline != Some(bindings.pipeline) {
            self.backend.bind_pipeline(buffer, bindings.pipeline)?;
            self.bound_pipeline = Some(bindings.pipeline);
        }
        if self.bound_bindings != Some(id) {
            if !bindings.vertex_buffers.is_empty() {
                self.backend.bind_vertex_buffers(buffer, &bindings.vertex_buffers)?;
            }
            if let Some((index_buffer, index_type)) = bindings.index_buffer {
                self.backend.bind_index_buffer(buffer, index_buffer, index_type)?;
            }
            self.bound_bindings = Some(id);
        }

        let count = command.int0 as u32;
        let first = command.int1 as u32;
        if indexed {
            self.backend.draw_indexed(buffer, count, first)
        } else {
            self.backend.draw(buffer, count, first)
        }
    }

    fn upload(&self, command: &Command) -> Result<()> {
        let buffer = self.open_buffer("BufferUpload")?;
        self.backend.copy_buffer(
            buffer,
            BufferId(command.handle0),
            BufferId(command.handle1),
            command.int0,
        )
    }

    fn push_constants(&self, command: &Command) -> Result<()> {
        let buffer = self.open_buffer("PushConstants")?;
        self.backend.push_constants(
            buffer,
            PipelineId(command.handle0),
            StageFlags::from_bits_truncate(command.int0 as u32),
            command.int1 as u32,
            command.payload(),
        )
    }
}

#[cfg(test)]
#[path = "command_node_tests.rs"]
mod tests;
