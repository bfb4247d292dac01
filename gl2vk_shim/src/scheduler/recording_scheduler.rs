/// Recording scheduler
///
/// Owns a fixed pool of recording nodes and a selection cursor. The producer
/// thread routes commands to the selected node, opens every node's
/// secondary buffer at the start of a frame, and at the end of the frame
/// closes them, waits for every node to go idle and hands the finished
/// buffers back in node order.
///
/// Nodes that miss the end-of-frame barrier are left out of that frame's
/// submission. Once such frames run `liveness_escalation_threshold` times
/// in a row, the failure becomes a fatal error.

use std::sync::Arc;
use crate::backend::{Backend, PipelineId, SecondaryBufferId};
use crate::config::ShimConfig;
use crate::error::{Error, Result};
use crate::scheduler::command::Command;
use crate::scheduler::command_node::{CommandNode, NodeStats};
use crate::scheduler::draw_bindings::{DrawBindings, DrawBindingsId, DrawBindingsTable};
use crate::{shim_debug, shim_error, shim_info, shim_warn, shim_warn_err};

const SOURCE: &str = "gl2vk::RecordingScheduler";

/// Frame the scheduler is currently recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveFrame {
    pub frame_index: usize,
    pub image_index: u32,
}

/// Buffers recorded for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedFrame {
    pub frame_index: usize,
    pub image_index: u32,
    /// Secondary buffers to execute, in node order
    pub secondaries: Vec<SecondaryBufferId>,
    /// Nodes that missed the barrier this frame
    pub stalled_nodes: Vec<usize>,
}

pub struct RecordingScheduler {
    nodes: Vec<CommandNode>,
    bindings: Arc<DrawBindingsTable>,
    config: ShimConfig,
    selected: usize,
    frame_index: usize,
    active: Option<ActiveFrame>,
    active_pipeline: Option<PipelineId>,
    liveness_strikes: u32,
    shut_down: bool,
}

impl RecordingScheduler {
    /// Spawn `config.node_count` nodes recording through `backend`
    pub fn new(backend: Arc<dyn Backend>, config: &ShimConfig) -> Result<Self> {
        if config.node_count == 0 || config.frames_in_flight == 0 {
            return Err(Error::ProtocolMisuse(format!(
                "Scheduler needs at least one node and one frame in flight (got {} nodes, {} frames)",
                config.node_count, config.frames_in_flight
            )));
        }

        let bindings = Arc::new(DrawBindingsTable::new());
        let nodes = (0..config.node_count)
            .map(|id| CommandNode::spawn(id, Arc::clone(&backend), Arc::clone(&bindings), config))
            .collect::<Result<Vec<_>>>()?;

        shim_info!(
            SOURCE,
            "Recording scheduler started: {} nodes, {} frames in flight, {} log slots per node",
            config.node_count,
            config.frames_in_flight,
            config.log_capacity
        );

        Ok(Self {
            nodes,
            bindings,
            config: config.clone(),
            selected: 0,
            frame_index: 0,
            active: None,
            active_pipeline: None,
            liveness_strikes: 0,
            shut_down: false,
        })
    }

    // ===== NODE SELECTION =====

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn selected_node(&self) -> usize {
        self.selected
    }

    /// Route subsequent commands to `node`
    pub fn select_node(&mut self, node: usize) -> Result<()> {
        if node >= self.nodes.len() {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!(
                "Node {} out of range (node count {})",
                node,
                self.nodes.len()
            ))));
        }
        self.selected = node;
        Ok(())
    }

    /// Advance the cursor round-robin; returns the new node
    pub fn select_next_node(&mut self) -> usize {
        self.selected = (self.selected + 1) % self.nodes.len();
        self.selected
    }

    pub fn node_stats(&self, node: usize) -> Option<NodeStats> {
        self.nodes.get(node).map(|n| n.stats())
    }

    /// Secondary buffer a node owns for a frame slot
    pub fn secondary_buffer(&self, node: usize, frame_index: usize) -> Option<SecondaryBufferId> {
        self.nodes.get(node).and_then(|n| n.buffer(frame_index))
    }

    // ===== COMMANDS =====

    /// Intern the bindings a draw needs
    pub fn intern_bindings(&self, bindings: DrawBindings) -> DrawBindingsId {
        self.bindings.intern(bindings)
    }

    pub fn draw_bindings(&self) -> &DrawBindingsTable {
        &self.bindings
    }

    /// Pipeline every node binds right after opening its buffer, from the
    /// next `begin_frame` on
    pub fn set_active_pipeline(&mut self, pipeline: Option<PipelineId>) {
        self.active_pipeline = pipeline;
    }

    /// Append a command to the selected node's log
    pub fn enqueue(&self, command: Command) -> Result<()> {
        self.enqueue_to(self.selected, command)
    }

    /// Append a command to a specific node's log
    pub fn enqueue_to(&self, node: usize, command: Command) -> Result<()> {
        if self.shut_down {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(
                "Scheduler is shut down".to_string()
            )));
        }
        let target = self.nodes.get(node).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("Node {} out of range", node)))
        })?;
        target.enqueue(command)
    }

    /// Block until `node` is idle (bounded by the configured retry budget)
    pub fn await_node(&self, node: usize) -> Result<()> {
        let target = self.nodes.get(node).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("Node {} out of range", node)))
        })?;
        target
            .await_idle(self.config.await_retry_budget, self.config.await_backoff)
            .map_err(|e| shim_warn_err!(SOURCE, e))
    }

    // ===== FRAMES =====

    /// Frame-in-flight slot the next frame records into
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn active_frame(&self) -> Option<ActiveFrame> {
        self.active
    }

    /// Open every node's buffer for the current frame slot
    pub fn begin_frame(&mut self, image_index: u32) -> Result<()> {
        if let Some(active) = self.active {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!(
                "begin_frame while frame slot {} is recording",
                active.frame_index
            ))));
        }
        let frame_index = self.frame_index;
        for node in 0..self.nodes.len() {
            self.enqueue_to(node, Command::begin_recording(frame_index, image_index, self.active_pipeline))?;
        }
        self.active = Some(ActiveFrame { frame_index, image_index });
        Ok(())
    }

    /// Close every node's buffer, wait for the nodes and collect the buffers
    ///
    /// Returns the first fatal error a worker hit during the frame, or a
    /// `BackendError` once nodes kept missing the barrier for
    /// `liveness_escalation_threshold` consecutive frames. The frame slot
    /// advances in every case.
    pub fn end_frame(&mut self) -> Result<FinishedFrame> {
        let Some(active) = self.active.take() else {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(
                "end_frame without begin_frame".to_string()
            )));
        };
        self.frame_index = (self.frame_index + 1) % self.config.frames_in_flight;

        for node in 0..self.nodes.len() {
            self.enqueue_to(node, Command::end_recording())?;
        }

        let mut secondaries = Vec::with_capacity(self.nodes.len());
        let mut stalled_nodes = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            match self.await_node(id) {
                Ok(()) => {
                    if let Some(buffer) = node.buffer(active.frame_index) {
                        secondaries.push(buffer);
                    }
                }
                Err(Error::Liveness(_)) => stalled_nodes.push(id),
                Err(e) => return Err(e),
            }
        }

        if let Some(fatal) = self.nodes.iter().find_map(|n| n.take_fatal()) {
            shim_error!(SOURCE, "Frame slot {} failed: {}", active.frame_index, fatal);
            return Err(fatal);
        }

        if stalled_nodes.is_empty() {
            self.liveness_strikes = 0;
        } else {
            self.liveness_strikes += 1;
            shim_warn!(
                SOURCE,
                "Nodes {:?} missed the frame barrier ({} consecutive frames)",
                stalled_nodes,
                self.liveness_strikes
            );
            if self.liveness_strikes >= self.config.liveness_escalation_threshold {
                let error = Error::BackendError(format!(
                    "Recording nodes {:?} stalled for {} consecutive frames",
                    stalled_nodes, self.liveness_strikes
                ));
                shim_error!(SOURCE, "{}", error);
                return Err(error);
            }
        }

        shim_debug!(
            SOURCE,
            "Frame slot {} recorded: {} secondary buffers for image {}",
            active.frame_index,
            secondaries.len(),
            active.image_index
        );

        Ok(FinishedFrame {
            frame_index: active.frame_index,
            image_index: active.image_index,
            secondaries,
            stalled_nodes,
        })
    }

    /// Consecutive frames with at least one stalled node
    pub fn liveness_strikes(&self) -> u32 {
        self.liveness_strikes
    }

    // ===== SHUTDOWN =====

    /// Stop every worker and join its thread
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for node in &mut self.nodes {
            node.shutdown();
        }
        shim_info!(SOURCE, "Recording scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for RecordingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "recording_scheduler_tests.rs"]
mod tests;
