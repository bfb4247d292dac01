/// Gl2Vk - legacy-style drawing facade
///
/// Accepts the stateful GL-style call stream (compile shaders, bind a
/// buffer, point attributes at it, set uniforms, draw) and turns it into
/// frozen pipeline layouts plus commands for the recording scheduler.
///
/// All calls are made from one thread. Recording happens on the
/// scheduler's worker threads; this type only resolves state and routes
/// commands to the selected node.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::backend::{AcquiredImage, Backend, BufferId, BufferUsage, PipelineDesc, PipelineId};
use crate::config::ShimConfig;
use crate::error::{Error, Result};
use crate::handles::{AttributeHandle, BufferHandle, PipelineHandle, UniformHandle};
use crate::layout::{parse_stage, IndexType, LayoutResolver, ShaderKind, StageHandles};
use crate::scheduler::{Command, DrawBindings, FinishedFrame, NodeStats, RecordingScheduler};
use crate::utils::HandleAllocator;
use crate::{shim_debug, shim_error, shim_info, shim_warn, shim_warn_err};

const SOURCE: &str = "gl2vk::Gl2Vk";

/// Buffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex data (the current buffer slot)
    Array,
    /// Index data
    ElementArray,
}

impl From<BufferTarget> for BufferUsage {
    fn from(target: BufferTarget) -> Self {
        match target {
            BufferTarget::Array => BufferUsage::Vertex,
            BufferTarget::ElementArray => BufferUsage::Index,
        }
    }
}

/// Outcome of `begin_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Every node is recording for this swapchain image
    Recording { image_index: u32 },
    /// The surface was stale; nothing is recording and `end_frame` must not
    /// be called
    Skipped,
}

#[derive(Debug, Default)]
struct StageSources {
    vertex: Option<String>,
    fragment: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct BufferRecord {
    storage: Option<(BufferId, u64)>,
}

pub struct Gl2Vk {
    backend: Arc<dyn Backend>,
    resolver: LayoutResolver,
    scheduler: RecordingScheduler,
    buffer_handles: HandleAllocator,
    buffers: FxHashMap<BufferHandle, BufferRecord>,
    /// Backend buffers replaced by `buffer_data`, destroyed once the GPU is idle
    retired: Vec<BufferId>,
    sources: FxHashMap<PipelineHandle, StageSources>,
    built: FxHashMap<PipelineHandle, PipelineId>,
    array_buffer: Option<BufferHandle>,
    element_buffer: Option<BufferHandle>,
    current_pipeline: Option<PipelineHandle>,
    shut_down: bool,
}

impl Gl2Vk {
    /// Create the facade and start the recording nodes
    pub fn new(backend: Arc<dyn Backend>, config: ShimConfig) -> Result<Self> {
        let scheduler = RecordingScheduler::new(Arc::clone(&backend), &config)?;
        Ok(Self {
            backend,
            resolver: LayoutResolver::new(),
            scheduler,
            buffer_handles: HandleAllocator::new(),
            buffers: FxHashMap::default(),
            retired: Vec::new(),
            sources: FxHashMap::default(),
            built: FxHashMap::default(),
            array_buffer: None,
            element_buffer: None,
            current_pipeline: None,
            shut_down: false,
        })
    }

    pub fn resolver(&self) -> &LayoutResolver {
        &self.resolver
    }

    pub fn scheduler(&self) -> &RecordingScheduler {
        &self.scheduler
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    pub fn create_pipeline(&mut self) -> PipelineHandle {
        let pipeline = self.resolver.create_pipeline();
        self.sources.insert(pipeline, StageSources::default());
        pipeline
    }

    /// Scan a shader stage and register its inputs and push-constant fields
    ///
    /// The vertex stage must be compiled before the fragment stage.
    pub fn compile_stage(&mut self, pipeline: PipelineHandle, kind: ShaderKind, source: &str) -> Result<StageHandles> {
        let handles = self.resolver.register_stage(pipeline, parse_stage(kind, source))?;
        let sources = self.sources.entry(pipeline).or_default();
        match kind {
            ShaderKind::Vertex => sources.vertex = Some(source.to_string()),
            ShaderKind::Fragment => sources.fragment = Some(source.to_string()),
        }
        Ok(handles)
    }

    pub fn attribute_handle(&self, pipeline: PipelineHandle, name: &str) -> Result<AttributeHandle> {
        self.resolver.attribute_handle(pipeline, name)
    }

    pub fn uniform_handle(&self, pipeline: PipelineHandle, name: &str) -> Result<UniformHandle> {
        self.resolver.uniform_handle(pipeline, name)
    }

    /// Make `pipeline` the target of subsequent draws
    pub fn use_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        if self.resolver.pipeline(pipeline).is_none() {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", pipeline))));
        }
        self.current_pipeline = Some(pipeline);
        self.scheduler.set_active_pipeline(self.built.get(&pipeline).copied());
        Ok(())
    }

    /// Backend pipeline of `pipeline`, building its layout and pipeline
    /// object on first use
    fn prepare_pipeline(&mut self, pipeline: PipelineHandle) -> Result<PipelineId> {
        if let Some(id) = self.built.get(&pipeline) {
            return Ok(*id);
        }

        let sources = self.sources.get(&pipeline).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", pipeline)))
        })?;
        let (Some(vertex_source), Some(fragment_source)) = (&sources.vertex, &sources.fragment) else {
            return Err(shim_warn_err!(SOURCE, Error::IncompletePipeline(format!(
                "{} needs both a vertex and a fragment stage",
                pipeline
            ))));
        };

        let max_push = self.backend.max_push_constants_size();
        let layout = self.resolver.build_layout(pipeline, max_push)?;
        let id = self.backend.create_pipeline(&PipelineDesc {
            vertex_source,
            fragment_source,
            layout,
        })?;
        self.built.insert(pipeline, id);

        if self.current_pipeline == Some(pipeline) {
            self.scheduler.set_active_pipeline(Some(id));
        }
        shim_info!(SOURCE, "{} built as backend pipeline {}", pipeline, id.0);
        Ok(id)
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    pub fn create_buffer(&mut self) -> BufferHandle {
        let handle = BufferHandle(self.buffer_handles.alloc());
        self.buffers.insert(handle, BufferRecord { storage: None });
        handle
    }

    /// Make `buffer` the current vertex buffer slot
    pub fn bind_buffer_slot(&mut self, buffer: BufferHandle) -> Result<()> {
        self.check_buffer(buffer)?;
        self.array_buffer = Some(buffer);
        Ok(())
    }

    /// Make `buffer` the index buffer used by `draw_elements`
    pub fn bind_element_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.check_buffer(buffer)?;
        self.element_buffer = Some(buffer);
        Ok(())
    }

    fn check_buffer(&self, buffer: BufferHandle) -> Result<()> {
        if self.buffers.contains_key(&buffer) {
            Ok(())
        } else {
            Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", buffer))))
        }
    }

    fn bound(&self, target: BufferTarget) -> Result<BufferHandle> {
        let bound = match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::ElementArray => self.element_buffer,
        };
        bound.ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("no buffer bound to {:?}", target)))
        })
    }

    /// Upload `data` into the buffer bound to `target`
    ///
    /// Storage is reused when large enough; otherwise new storage is created
    /// and the old one is destroyed after the next frame.
    pub fn buffer_data(&mut self, target: BufferTarget, data: &[u8]) -> Result<()> {
        let handle = self.bound(target)?;
        let size = data.len() as u64;
        let record = self.buffers.get(&handle).copied().ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", handle)))
        })?;

        let id = match record.storage {
            Some((id, capacity)) if capacity >= size => id,
            previous => {
                let id = self.backend.create_buffer(target.into(), size.max(1))?;
                if let Some((old, _)) = previous {
                    self.retired.push(old);
                }
                self.buffers.insert(handle, BufferRecord { storage: Some((id, size.max(1))) });
                id
            }
        };
        self.backend.write_buffer(id, 0, data)
    }

    fn storage(&self, buffer: BufferHandle) -> Result<BufferId> {
        match self.buffers.get(&buffer) {
            Some(BufferRecord { storage: Some((id, _)) }) => Ok(*id),
            Some(_) => Err(shim_warn_err!(SOURCE, Error::MissingResource(format!(
                "{} has no data",
                buffer
            )))),
            None => Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", buffer)))),
        }
    }

    /// Record a GPU copy of `size` bytes from `src` to `dst` on the selected node
    pub fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: u64) -> Result<()> {
        self.require_frame("copy_buffer")?;
        let command = Command::buffer_upload(self.storage(src)?, self.storage(dst)?, size);
        self.scheduler.enqueue(command)
    }

    /// Source the attribute behind `handle` from the current buffer slot
    pub fn set_attribute_pointer(&mut self, handle: AttributeHandle, byte_size: u32, byte_offset: u32, stride: u32) -> Result<()> {
        let slot = self.bound(BufferTarget::Array)?;
        self.resolver.bind_attribute(slot.raw(), handle, byte_size, byte_offset, stride)
    }

    // ========================================================================
    // Uniforms
    // ========================================================================

    /// Record a push-constant update for the uniform behind `handle`
    pub fn set_uniform_bytes(&mut self, handle: UniformHandle, bytes: &[u8]) -> Result<()> {
        self.require_frame("set_uniform")?;
        let binding = self.resolver.uniform(handle)?;
        if bytes.len() as u32 > binding.size {
            return Err(shim_warn_err!(SOURCE, Error::SizeMismatch(format!(
                "{} is {} bytes, got {}",
                handle,
                binding.size,
                bytes.len()
            ))));
        }
        let pipeline = self.prepare_pipeline(binding.pipeline)?;
        let command = Command::push_constants(pipeline, binding.stages, binding.offset, bytes)?;
        self.scheduler.enqueue(command)
    }

    pub fn set_uniform_f32(&mut self, handle: UniformHandle, values: &[f32]) -> Result<()> {
        self.set_uniform_bytes(handle, bytemuck::cast_slice(values))
    }

    // ========================================================================
    // Draws
    // ========================================================================

    fn require_frame(&self, what: &str) -> Result<()> {
        if self.scheduler.active_frame().is_some() {
            Ok(())
        } else {
            Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!(
                "{} outside begin_frame/end_frame",
                what
            ))))
        }
    }

    fn draw_bindings(&mut self, index_buffer: Option<(BufferId, IndexType)>) -> Result<DrawBindings> {
        let pipeline = self.current_pipeline.ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::MissingResource("draw with no pipeline in use".to_string()))
        })?;
        let pipeline_id = self.prepare_pipeline(pipeline)?;

        let slots = self
            .resolver
            .pipeline(pipeline)
            .and_then(|p| p.layout())
            .map(|layout| layout.buffer_slots.clone())
            .unwrap_or_default();
        let vertex_buffers = slots
            .into_iter()
            .map(|slot| self.storage(BufferHandle(slot)))
            .collect::<Result<Vec<_>>>()?;

        Ok(DrawBindings {
            pipeline: pipeline_id,
            vertex_buffers,
            index_buffer,
        })
    }

    /// Draw `count` vertices starting at `first` on the selected node
    pub fn draw_arrays(&mut self, count: u32, first: u32) -> Result<()> {
        self.require_frame("draw_arrays")?;
        let bindings = self.draw_bindings(None)?;
        let id = self.scheduler.intern_bindings(bindings);
        self.scheduler.enqueue(Command::draw(id, count, first))
    }

    /// Draw `count` indices from the bound element buffer on the selected node
    pub fn draw_elements(&mut self, count: u32, index_type: IndexType, first_index: u32) -> Result<()> {
        self.require_frame("draw_elements")?;
        let element_buffer = self.bound(BufferTarget::ElementArray)?;
        let index_buffer = self.storage(element_buffer)?;
        let bindings = self.draw_bindings(Some((index_buffer, index_type)))?;
        let id = self.scheduler.intern_bindings(bindings);
        self.scheduler.enqueue(Command::draw_indexed(id, count, first_index))
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn node_count(&self) -> usize {
        self.scheduler.node_count()
    }

    pub fn select_node(&mut self, node: usize) -> Result<()> {
        self.scheduler.select_node(node)
    }

    pub fn select_next_node(&mut self) -> usize {
        self.scheduler.select_next_node()
    }

    pub fn node_stats(&self, node: usize) -> Option<NodeStats> {
        self.scheduler.node_stats(node)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Acquire the next image and open every node's buffer for it
    pub fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.shut_down {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse("begin_frame after shutdown".to_string())));
        }
        if self.scheduler.active_frame().is_some() {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(
                "begin_frame while a frame is recording".to_string()
            )));
        }

        match self.backend.acquire_presentable_image(self.scheduler.frame_index())? {
            AcquiredImage::Stale => {
                shim_warn!(SOURCE, "Surface is stale, skipping frame");
                Ok(FrameStatus::Skipped)
            }
            AcquiredImage::Image(image_index) => {
                self.scheduler.begin_frame(image_index)?;
                Ok(FrameStatus::Recording { image_index })
            }
        }
    }

    /// Close every node's buffer, wait for the nodes, then submit and present
    pub fn end_frame(&mut self) -> Result<FinishedFrame> {
        let finished = self.scheduler.end_frame()?;
        self.backend.submit_and_present(
            finished.frame_index,
            &finished.secondaries,
            finished.image_index,
        )?;

        if !self.retired.is_empty() {
            self.backend.wait_idle()?;
            for buffer in self.retired.drain(..) {
                self.backend.destroy_buffer(buffer);
            }
        }
        Ok(finished)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop the recording nodes and release every buffer
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.scheduler.shutdown();

        if let Err(e) = self.backend.wait_idle() {
            shim_error!(SOURCE, "wait_idle failed during shutdown: {}", e);
        }
        let live = self.buffers.values().filter_map(|record| record.storage.map(|(id, _)| id));
        let buffers: Vec<BufferId> = self.retired.drain(..).chain(live).collect();
        for buffer in &buffers {
            self.backend.destroy_buffer(*buffer);
        }
        self.buffers.clear();
        shim_debug!(SOURCE, "Shut down, {} buffers released", buffers.len());
    }
}

impl Drop for Gl2Vk {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "gl2vk_tests.rs"]
mod tests;
