/// Downstream GPU backend interface
///
/// Everything the shim needs from an explicit command-buffer API. Device,
/// surface and swapchain bootstrap happen before a backend is handed to the
/// shim; shader text-to-binary compilation is the backend's concern.

use crate::error::Result;
use crate::layout::{IndexType, PipelineLayout, StageFlags};

// ============================================================================
// Backend object ids
// ============================================================================

/// Secondary (worker-recorded) command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecondaryBufferId(pub u64);

/// GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Immutable pipeline object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u64);

// ============================================================================
// Descriptors
// ============================================================================

/// Result of acquiring a presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquiredImage {
    /// Image index ready for rendering
    Image(u32),
    /// The surface changed (resize, minimize); skip this frame
    Stale,
}

/// Context a secondary buffer is opened against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassContext {
    /// Frame-in-flight slot
    pub frame_index: usize,
    /// Swapchain image being rendered
    pub image_index: u32,
}

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Copy source
    Staging,
}

/// Everything needed to create a pipeline object
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc<'a> {
    /// Vertex shader source (backend compiles it)
    pub vertex_source: &'a str,
    /// Fragment shader source (backend compiles it)
    pub fragment_source: &'a str,
    /// Frozen vertex-input and push-constant layout
    pub layout: &'a PipelineLayout,
}

// ============================================================================
// Backend trait
// ============================================================================

/// GPU backend used by the frontend and the recording workers
///
/// Recording methods taking a `SecondaryBufferId` are called from worker
/// threads. Each secondary buffer is only ever touched by the worker that
/// allocated it, so implementations only need to synchronize shared pools
/// per node, not per buffer.
pub trait Backend: Send + Sync {
    /// Acquire the next presentable image for the given frame slot (may block)
    fn acquire_presentable_image(&self, frame_index: usize) -> Result<AcquiredImage>;

    /// Allocate a secondary command buffer owned by `node_id`
    fn allocate_secondary_buffer(&self, node_id: usize) -> Result<SecondaryBufferId>;

    /// Reset and open a secondary buffer for recording inside the render pass
    fn begin_secondary_buffer(&self, buffer: SecondaryBufferId, context: RenderPassContext) -> Result<()>;

    /// Close a secondary buffer
    fn end_secondary_buffer(&self, buffer: SecondaryBufferId) -> Result<()>;

    /// Create an immutable pipeline object
    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineId>;

    /// Bind a pipeline in a secondary buffer
    fn bind_pipeline(&self, buffer: SecondaryBufferId, pipeline: PipelineId) -> Result<()>;

    /// Bind vertex buffers, `buffers[i]` at binding `i`
    fn bind_vertex_buffers(&self, buffer: SecondaryBufferId, buffers: &[BufferId]) -> Result<()>;

    /// Bind an index buffer
    fn bind_index_buffer(&self, buffer: SecondaryBufferId, index_buffer: BufferId, index_type: IndexType) -> Result<()>;

    /// Record a non-indexed draw
    fn draw(&self, buffer: SecondaryBufferId, vertex_count: u32, first_vertex: u32) -> Result<()>;

    /// Record an indexed draw
    fn draw_indexed(&self, buffer: SecondaryBufferId, index_count: u32, first_index: u32) -> Result<()>;

    /// Record a buffer-to-buffer copy
    fn copy_buffer(&self, buffer: SecondaryBufferId, src: BufferId, dst: BufferId, size: u64) -> Result<()>;

    /// Record a push-constant update
    fn push_constants(
        &self,
        buffer: SecondaryBufferId,
        pipeline: PipelineId,
        stages: StageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()>;

    /// Execute the given secondary buffers (in order) inside one primary
    /// submission, then present `image_index`
    fn submit_and_present(&self, frame_index: usize, secondaries: &[SecondaryBufferId], image_index: u32) -> Result<()>;

    /// Create a host-visible buffer
    fn create_buffer(&self, usage: BufferUsage, size: u64) -> Result<BufferId>;

    /// Write into a host-visible buffer
    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()>;

    /// Destroy a buffer (must not be in use by the GPU)
    fn destroy_buffer(&self, buffer: BufferId);

    /// Size limit of the merged push-constant block
    fn max_push_constants_size(&self) -> u32 {
        128
    }

    /// Block until the GPU is idle
    fn wait_idle(&self) -> Result<()>;
}
