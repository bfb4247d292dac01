/// Recording backend (no GPU required)
///
/// Implements `Backend` by recording every call in memory. Used by the unit
/// and integration tests to observe exactly what the workers recorded into
/// each secondary buffer and what was submitted per frame. Also usable as a
/// headless backend for dry runs.

use std::time::Duration;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use crate::backend::backend::{
    AcquiredImage, Backend, BufferId, BufferUsage, PipelineDesc, PipelineId, RenderPassContext,
    SecondaryBufferId,
};
use crate::error::{Error, Result};
use crate::layout::{IndexType, PipelineLayout, StageFlags};

// ============================================================================
// Recorded data
// ============================================================================

/// One recording call captured in a secondary buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    BindPipeline(PipelineId),
    BindVertexBuffers(Vec<BufferId>),
    BindIndexBuffer(BufferId, IndexType),
    Draw { vertex_count: u32, first_vertex: u32 },
    DrawIndexed { index_count: u32, first_index: u32 },
    CopyBuffer { src: BufferId, dst: BufferId, size: u64 },
    PushConstants { pipeline: PipelineId, stages: StageFlags, offset: u32, data: Vec<u8> },
}

impl RecordedOp {
    /// Whether this op is a draw call
    pub fn is_draw(&self) -> bool {
        matches!(self, RecordedOp::Draw { .. } | RecordedOp::DrawIndexed { .. })
    }
}

/// State of one secondary buffer
#[derive(Debug, Clone, Default)]
pub struct SecondaryRecord {
    /// Node that allocated the buffer
    pub node_id: usize,
    /// Whether the buffer is currently open for recording
    pub open: bool,
    /// Context of the last `begin`
    pub context: Option<RenderPassContext>,
    /// Ops recorded since the last `begin`
    pub ops: Vec<RecordedOp>,
    /// Number of times the buffer was begun
    pub begin_count: u32,
}

/// One `submit_and_present` call
#[derive(Debug, Clone)]
pub struct Submission {
    pub frame_index: usize,
    pub image_index: u32,
    pub secondaries: Vec<SecondaryBufferId>,
    /// Snapshot of each secondary buffer's ops at submission time
    pub ops: Vec<Vec<RecordedOp>>,
}

/// A pipeline created through the backend
#[derive(Debug, Clone)]
pub struct CreatedPipeline {
    pub vertex_source: String,
    pub fragment_source: String,
    pub layout: PipelineLayout,
}

#[derive(Debug)]
struct StoredBuffer {
    usage: BufferUsage,
    data: Vec<u8>,
}

#[derive(Default)]
struct State {
    secondaries: Vec<SecondaryRecord>,
    buffers: FxHashMap<u64, StoredBuffer>,
    next_buffer_id: u64,
    pipelines: Vec<CreatedPipeline>,
    submissions: Vec<Submission>,
    next_image: u32,
    stale_acquires: u32,
    fail_draws: bool,
}

// ============================================================================
// RecordingBackend
// ============================================================================

/// In-memory `Backend` implementation
pub struct RecordingBackend {
    state: Mutex<State>,
    image_count: u32,
    max_push_constants_size: u32,
    draw_delay: Option<Duration>,
}

impl RecordingBackend {
    /// Create a backend with 3 swapchain images and a 128-byte push-constant limit
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            image_count: 3,
            max_push_constants_size: 128,
            draw_delay: None,
        }
    }

    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.image_count = image_count.max(1);
        self
    }

    pub fn with_max_push_constants_size(mut self, size: u32) -> Self {
        self.max_push_constants_size = size;
        self
    }

    /// Make every draw call block for `delay` (simulates a slow worker)
    pub fn with_draw_delay(mut self, delay: Duration) -> Self {
        self.draw_delay = Some(delay);
        self
    }

    /// The next `count` acquisitions report a stale surface
    pub fn set_stale_acquires(&self, count: u32) {
        self.state.lock().stale_acquires = count;
    }

    /// Make draw calls fail with a backend error
    pub fn set_fail_draws(&self, fail: bool) {
        self.state.lock().fail_draws = fail;
    }

    // ===== INSPECTION =====

    /// Snapshot of a secondary buffer
    pub fn secondary(&self, id: SecondaryBufferId) -> Option<SecondaryRecord> {
        self.state.lock().secondaries.get(id.0 as usize).cloned()
    }

    /// Secondary buffers allocated by `node_id`, in allocation order
    pub fn secondaries_of_node(&self, node_id: usize) -> Vec<SecondaryBufferId> {
        self.state
            .lock()
            .secondaries
            .iter()
            .enumerate()
            .filter(|(_, record)| record.node_id == node_id)
            .map(|(index, _)| SecondaryBufferId(index as u64))
            .collect()
    }

    /// Number of secondary buffers currently open
    pub fn open_secondary_count(&self) -> usize {
        self.state.lock().secondaries.iter().filter(|r| r.open).count()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn pipelines(&self) -> Vec<CreatedPipeline> {
        self.state.lock().pipelines.clone()
    }

    /// Contents and usage of a buffer, if it exists
    pub fn buffer_contents(&self, id: BufferId) -> Option<(BufferUsage, Vec<u8>)> {
        self.state
            .lock()
            .buffers
            .get(&id.0)
            .map(|b| (b.usage, b.data.clone()))
    }

    // ===== HELPERS =====

    fn record(&self, buffer: SecondaryBufferId, op: RecordedOp) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .secondaries
            .get_mut(buffer.0 as usize)
            .ok_or_else(|| Error::BackendError(format!("unknown secondary buffer {}", buffer.0)))?;
        if !record.open {
            return Err(Error::BackendError(format!(
                "recording into closed secondary buffer {}",
                buffer.0
            )));
        }
        record.ops.push(op);
        Ok(())
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for RecordingBackend {
    fn acquire_presentable_image(&self, _frame_index: usize) -> Result<AcquiredImage> {
        let mut state = self.state.lock();
        if state.stale_acquires > 0 {
            state.stale_acquires -= 1;
            return Ok(AcquiredImage::Stale);
        }
        let image = state.next_image;
        state.next_image = (image + 1) % self.image_count;
        Ok(AcquiredImage::Image(image))
    }

    fn allocate_secondary_buffer(&self, node_id: usize) -> Result<SecondaryBufferId> {
        let mut state = self.state.lock();
        state.secondaries.push(SecondaryRecord {
            node_id,
            ..SecondaryRecord::default()
        });
        Ok(SecondaryBufferId(state.secondaries.len() as u64 - 1))
    }

    fn begin_secondary_buffer(&self, buffer: SecondaryBufferId, context: RenderPassContext) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .secondaries
            .get_mut(buffer.0 as usize)
            .ok_or_else(|| Error::BackendError(format!("unknown secondary buffer {}", buffer.0)))?;
        if record.open {
            return Err(Error::BackendError(format!("secondary buffer {} already open", buffer.0)));
        }
        record.open = true;
        record.context = Some(context);
        record.ops.clear();
        record.begin_count += 1;
        Ok(())
    }

    fn end_secondary_buffer(&self, buffer: SecondaryBufferId) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .secondaries
            .get_mut(buffer.0 as usize)
            .ok_or_else(|| Error::BackendError(format!("unknown secondary buffer {}", buffer.0)))?;
        if !record.open {
            return Err(Error::BackendError(format!("secondary buffer {} not open", buffer.0)));
        }
        record.open = false;
        Ok(())
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineId> {
        let mut state = self.state.lock();
        state.pipelines.push(CreatedPipeline {
            vertex_source: desc.vertex_source.to_string(),
            fragment_source: desc.fragment_source.to_string(),
            layout: desc.layout.clone(),
        });
        Ok(PipelineId(state.pipelines.len() as u64))
    }

    fn bind_pipeline(&self, buffer: SecondaryBufferId, pipeline: PipelineId) -> Result<()> {
        self.record(buffer, RecordedOp::BindPipeline(pipeline))
    }

    fn bind_vertex_buffers(&self, buffer: SecondaryBufferId, buffers: &[BufferId]) -> Result<()> {
        self.record(buffer, RecordedOp::BindVertexBuffers(buffers.to_vec()))
    }

    fn bind_index_buffer(&self, buffer: SecondaryBufferId, index_buffer: BufferId, index_type: IndexType) -> Result<()> {
        self.record(buffer, RecordedOp::BindIndexBuffer(index_buffer, index_type))
    }

    fn draw(&self, buffer: SecondaryBufferId, vertex_count: u32, first_vertex: u32) -> Result<()> {
        if let Some(delay) = self.draw_delay {
            std::thread::sleep(delay);
        }
        if self.state.lock().fail_draws {
            return Err(Error::BackendError("injected draw failure".to_string()));
        }
        self.record(buffer, RecordedOp::Draw { vertex_count, first_vertex })
    }

    fn draw_indexed(&self, buffer: SecondaryBufferId, index_count: u32, first_index: u32) -> Result<()> {
        if let Some(delay) = self.draw_delay {
            std::thread::sleep(delay);
        }
        if self.state.lock().fail_draws {
            return Err(Error::BackendError("injected draw failure".to_string()));
        }
        self.record(buffer, RecordedOp::DrawIndexed { index_count, first_index })
    }

    fn copy_buffer(&self, buffer: SecondaryBufferId, src: BufferId, dst: BufferId, size: u64) -> Result<()> {
        self.record(buffer, RecordedOp::CopyBuffer { src, dst, size })
    }

    fn push_constants(
        &self,
        buffer: SecondaryBufferId,
        pipeline: PipelineId,
        stages: StageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.record(buffer, RecordedOp::PushConstants {
            pipeline,
            stages,
            offset,
            data: data.to_vec(),
        })
    }

    fn submit_and_present(&self, frame_index: usize, secondaries: &[SecondaryBufferId], image_index: u32) -> Result<()> {
        let mut state = self.state.lock();
        let mut ops = Vec::with_capacity(secondaries.len());
        for id in secondaries {
            let record = state
                .secondaries
                .get(id.0 as usize)
                .ok_or_else(|| Error::BackendError(format!("unknown secondary buffer {}", id.0)))?;
            if record.open {
                return Err(Error::BackendError(format!(
                    "submitting secondary buffer {} while still open",
                    id.0
                )));
            }
            ops.push(record.ops.clone());
        }
        state.submissions.push(Submission {
            frame_index,
            image_index,
            secondaries: secondaries.to_vec(),
            ops,
        });
        Ok(())
    }

    fn create_buffer(&self, usage: BufferUsage, size: u64) -> Result<BufferId> {
        let mut state = self.state.lock();
        state.next_buffer_id += 1;
        let id = state.next_buffer_id;
        state.buffers.insert(id, StoredBuffer {
            usage,
            data: vec![0; size as usize],
        });
        Ok(BufferId(id))
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let stored = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| Error::BackendError(format!("unknown buffer {}", buffer.0)))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > stored.data.len() {
            return Err(Error::BackendError(format!(
                "write of {} bytes at {} overflows buffer {} ({} bytes)",
                data.len(),
                offset,
                buffer.0,
                stored.data.len()
            )));
        }
        stored.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        self.state.lock().buffers.remove(&buffer.0);
    }

    fn max_push_constants_size(&self) -> u32 {
        self.max_push_constants_size
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "recording_backend_tests.rs"]
mod tests;
