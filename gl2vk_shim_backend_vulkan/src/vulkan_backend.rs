/// VulkanBackend - Backend implementation over ash
///
/// Each recording node gets its own command pool, so workers record their
/// secondary buffers without touching a shared pool. The main thread owns
/// one primary buffer per frame in flight and replays the secondaries
/// inside a single render pass.

use ash::vk;
use gl2vk_shim::gl2vk::backend::{
    AcquiredImage, Backend, BufferId, BufferUsage, PipelineDesc, PipelineId, RenderPassContext,
    SecondaryBufferId,
};
use gl2vk_shim::gl2vk::layout::{IndexType, StageFlags};
use gl2vk_shim::gl2vk::{Error, Result};
use gl2vk_shim::{shim_debug, shim_err, shim_warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{index_type_to_vk, stage_flags_to_vk};
use crate::vulkan_pipeline::Pipeline;

/// Secondary command buffer and the frame slot it was last opened for
struct Secondary {
    command_buffer: vk::CommandBuffer,
    frame_index: AtomicUsize,
}

/// Per-frame-in-flight submission objects
struct FrameSync {
    primary: vk::CommandBuffer,
    in_flight: vk::Fence,
    image_available: vk::Semaphore,
}

/// Copy recorded by a worker, replayed in the primary before the render pass
#[derive(Debug, Clone, Copy)]
struct PendingCopy {
    src: BufferId,
    dst: BufferId,
    size: u64,
}

/// Vulkan implementation of the shim backend
pub struct VulkanBackend {
    ctx: Arc<VulkanContext>,
    primary_pool: vk::CommandPool,
    frames: Vec<FrameSync>,
    /// Signaled by the submission, waited on by present (one per swapchain image)
    render_finished: Vec<vk::Semaphore>,
    node_pools: Mutex<FxHashMap<usize, vk::CommandPool>>,
    secondaries: RwLock<FxHashMap<u64, Secondary>>,
    pipelines: RwLock<FxHashMap<u64, Pipeline>>,
    buffers: RwLock<FxHashMap<u64, Buffer>>,
    pending_copies: Mutex<Vec<Vec<PendingCopy>>>,
    next_secondary_id: AtomicU64,
    next_pipeline_id: AtomicU64,
    next_buffer_id: AtomicU64,
}

impl VulkanBackend {
    /// Create the backend over a host-provided device and swapchain
    ///
    /// # Arguments
    ///
    /// * `ctx` - Device, queue, swapchain and render pass handles
    /// * `frames_in_flight` - Must match `ShimConfig::frames_in_flight`
    pub fn new(ctx: VulkanContext, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::ProtocolMisuse("frames_in_flight must be at least 1".to_string()));
        }

        // Fill an empty backend so Drop releases whatever was created on failure
        let mut backend = Self {
            ctx: Arc::new(ctx),
            primary_pool: vk::CommandPool::null(),
            frames: Vec::with_capacity(frames_in_flight),
            render_finished: Vec::new(),
            node_pools: Mutex::new(FxHashMap::default()),
            secondaries: RwLock::new(FxHashMap::default()),
            pipelines: RwLock::new(FxHashMap::default()),
            buffers: RwLock::new(FxHashMap::default()),
            pending_copies: Mutex::new(vec![Vec::new(); frames_in_flight]),
            next_secondary_id: AtomicU64::new(1),
            next_pipeline_id: AtomicU64::new(1),
            next_buffer_id: AtomicU64::new(1),
        };

        unsafe {
            let device = &backend.ctx.device;

            backend.primary_pool = create_command_pool(device, backend.ctx.graphics_queue_family)?;

            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(backend.primary_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(frames_in_flight as u32);
            let primaries = device.allocate_command_buffers(&alloc_info)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to allocate primary command buffers: {:?}", e))?;

            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let semaphore_info = vk::SemaphoreCreateInfo::default();

            for primary in primaries {
                let in_flight = device.create_fence(&fence_info, None)
                    .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to create fence: {:?}", e))?;
                let image_available = match device.create_semaphore(&semaphore_info, None) {
                    Ok(semaphore) => semaphore,
                    Err(e) => {
                        device.destroy_fence(in_flight, None);
                        return Err(shim_err!("gl2vk::vulkan", "Failed to create semaphore: {:?}", e));
                    }
                };
                backend.frames.push(FrameSync { primary, in_flight, image_available });
            }

            for _ in 0..backend.ctx.image_count() {
                let semaphore = device.create_semaphore(&semaphore_info, None)
                    .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to create semaphore: {:?}", e))?;
                backend.render_finished.push(semaphore);
            }
        }

        shim_debug!(
            "gl2vk::vulkan",
            "Vulkan backend ready ({} frames in flight, {} swapchain images)",
            frames_in_flight,
            backend.ctx.image_count()
        );

        Ok(backend)
    }

    fn frame(&self, frame_index: usize) -> Result<&FrameSync> {
        self.frames.get(frame_index).ok_or_else(|| {
            Error::ProtocolMisuse(format!(
                "frame slot {} out of range ({} frames in flight)",
                frame_index,
                self.frames.len()
            ))
        })
    }

    fn secondary(&self, buffer: SecondaryBufferId) -> Result<vk::CommandBuffer> {
        self.secondaries
            .read()
            .get(&buffer.0)
            .map(|secondary| secondary.command_buffer)
            .ok_or_else(|| Error::MissingResource(format!("unknown secondary buffer {}", buffer.0)))
    }

    fn vk_buffer(&self, buffer: BufferId) -> Result<vk::Buffer> {
        self.buffers
            .read()
            .get(&buffer.0)
            .map(|stored| stored.buffer)
            .ok_or_else(|| Error::MissingResource(format!("unknown buffer {}", buffer.0)))
    }

    /// Record this frame's hoisted copies, followed by a barrier for vertex input
    unsafe fn record_pending_copies(&self, command_buffer: vk::CommandBuffer, frame_index: usize) {
        let copies = match self.pending_copies.lock().get_mut(frame_index) {
            Some(copies) => std::mem::take(copies),
            None => return,
        };
        if copies.is_empty() {
            return;
        }

        let buffers = self.buffers.read();
        let mut recorded = 0;
        for copy in copies {
            let (Some(src), Some(dst)) = (buffers.get(&copy.src.0), buffers.get(&copy.dst.0)) else {
                shim_warn!(
                    "gl2vk::vulkan",
                    "Dropping copy {} -> {}: buffer destroyed before submission",
                    copy.src.0,
                    copy.dst.0
                );
                continue;
            };
            let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size: copy.size };
            self.ctx.device.cmd_copy_buffer(command_buffer, src.buffer, dst.buffer, &[region]);
            recorded += 1;
        }

        if recorded > 0 {
            let barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::INDEX_READ);
            self.ctx.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_INPUT,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }

    unsafe fn record_primary(
        &self,
        frame: &FrameSync,
        frame_index: usize,
        secondaries: &[vk::CommandBuffer],
        framebuffer: vk::Framebuffer,
    ) -> Result<()> {
        let device = &self.ctx.device;

        device.reset_command_buffer(frame.primary, vk::CommandBufferResetFlags::empty())
            .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to reset primary command buffer: {:?}", e))?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.begin_command_buffer(frame.primary, &begin_info)
            .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to begin primary command buffer: {:?}", e))?;

        // Copies are illegal inside a render pass
        self.record_pending_copies(frame.primary, frame_index);

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: self.ctx.clear_color },
        }];
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.ctx.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.ctx.extent,
            })
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(
            frame.primary,
            &render_pass_begin,
            vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
        );
        if !secondaries.is_empty() {
            device.cmd_execute_commands(frame.primary, secondaries);
        }
        device.cmd_end_render_pass(frame.primary);

        device.end_command_buffer(frame.primary)
            .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to end primary command buffer: {:?}", e))
    }
}

unsafe fn create_command_pool(device: &ash::Device, queue_family: u32) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family);
    device.create_command_pool(&pool_info, None)
        .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to create command pool: {:?}", e))
}

impl Backend for VulkanBackend {
    fn acquire_presentable_image(&self, frame_index: usize) -> Result<AcquiredImage> {
        let frame = self.frame(frame_index)?;
        unsafe {
            // The slot's previous submission must be done before its buffers are reset
            self.ctx.device.wait_for_fences(&[frame.in_flight], true, u64::MAX)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to wait for frame fence: {:?}", e))?;

            match self.ctx.swapchain_loader.acquire_next_image(
                self.ctx.swapchain,
                u64::MAX,
                frame.image_available,
                vk::Fence::null(),
            ) {
                Ok((image_index, _suboptimal)) => Ok(AcquiredImage::Image(image_index)),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    shim_warn!("gl2vk::vulkan", "Swapchain out of date, skipping frame slot {}", frame_index);
                    Ok(AcquiredImage::Stale)
                }
                Err(e) => Err(shim_err!("gl2vk::vulkan", "Failed to acquire swapchain image: {:?}", e)),
            }
        }
    }

    fn allocate_secondary_buffer(&self, node_id: usize) -> Result<SecondaryBufferId> {
        let mut pools = self.node_pools.lock();
        let pool = match pools.get(&node_id) {
            Some(&pool) => pool,
            None => {
                let pool = unsafe { create_command_pool(&self.ctx.device, self.ctx.graphics_queue_family)? };
                pools.insert(node_id, pool);
                pool
            }
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::SECONDARY)
            .command_buffer_count(1);
        let command_buffer = unsafe {
            self.ctx.device.allocate_command_buffers(&alloc_info)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to allocate secondary command buffer: {:?}", e))?
        };
        let command_buffer = command_buffer
            .into_iter()
            .next()
            .ok_or_else(|| shim_err!("gl2vk::vulkan", "Driver returned no secondary command buffer"))?;

        let id = self.next_secondary_id.fetch_add(1, Ordering::Relaxed);
        self.secondaries.write().insert(
            id,
            Secondary { command_buffer, frame_index: AtomicUsize::new(0) },
        );
        Ok(SecondaryBufferId(id))
    }

    fn begin_secondary_buffer(&self, buffer: SecondaryBufferId, context: RenderPassContext) -> Result<()> {
        let framebuffer = self.ctx.framebuffer(context.image_index).ok_or_else(|| {
            Error::MissingResource(format!("no framebuffer for swapchain image {}", context.image_index))
        })?;

        let command_buffer = {
            let secondaries = self.secondaries.read();
            let secondary = secondaries
                .get(&buffer.0)
                .ok_or_else(|| Error::MissingResource(format!("unknown secondary buffer {}", buffer.0)))?;
            secondary.frame_index.store(context.frame_index, Ordering::Relaxed);
            secondary.command_buffer
        };

        unsafe {
            self.ctx.device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to reset secondary command buffer: {:?}", e))?;

            let inheritance = vk::CommandBufferInheritanceInfo::default()
                .render_pass(self.ctx.render_pass)
                .subpass(0)
                .framebuffer(framebuffer);
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(
                    vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE
                        | vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                )
                .inheritance_info(&inheritance);

            self.ctx.device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to begin secondary command buffer: {:?}", e))
        }
    }

    fn end_secondary_buffer(&self, buffer: SecondaryBufferId) -> Result<()> {
        let command_buffer = self.secondary(buffer)?;
        unsafe {
            self.ctx.device.end_command_buffer(command_buffer)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to end secondary command buffer: {:?}", e))
        }
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineId> {
        let pipeline = Pipeline::create(&self.ctx, desc)?;
        let id = self.next_pipeline_id.fetch_add(1, Ordering::Relaxed);
        self.pipelines.write().insert(id, pipeline);
        shim_debug!("gl2vk::vulkan", "Created pipeline {}", id);
        Ok(PipelineId(id))
    }

    fn bind_pipeline(&self, buffer: SecondaryBufferId, pipeline: PipelineId) -> Result<()> {
        let command_buffer = self.secondary(buffer)?;
        let vk_pipeline = self.pipelines
            .read()
            .get(&pipeline.0)
            .map(|stored| stored.pipeline)
            .ok_or_else(|| Error::MissingResource(format!("unknown pipeline {}", pipeline.0)))?;
        unsafe {
            self.ctx.device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, vk_pipeline);
        }
        Ok(())
    }

    fn bind_vertex_buffers(&self, buffer: SecondaryBufferId, buffers: &[BufferId]) -> Result<()> {
        if buffers.is_empty() {
            return Ok(());
        }
        let command_buffer = self.secondary(buffer)?;
        let vk_buffers = buffers
            .iter()
            .map(|&id| self.vk_buffer(id))
            .collect::<Result<Vec<_>>>()?;
        let offsets = vec![0u64; vk_buffers.len()];
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(command_buffer, 0, &vk_buffers, &offsets);
        }
        Ok(())
    }

    fn bind_index_buffer(&self, buffer: SecondaryBufferId, index_buffer: BufferId, index_type: IndexType) -> Result<()> {
        let command_buffer = self.secondary(buffer)?;
        let vk_buffer = self.vk_buffer(index_buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(command_buffer, vk_buffer, 0, index_type_to_vk(index_type));
        }
        Ok(())
    }

    fn draw(&self, buffer: SecondaryBufferId, vertex_count: u32, first_vertex: u32) -> Result<()> {
        let command_buffer = self.secondary(buffer)?;
        unsafe {
            self.ctx.device.cmd_draw(command_buffer, vertex_count, 1, first_vertex, 0);
        }
        Ok(())
    }

    fn draw_indexed(&self, buffer: SecondaryBufferId, index_count: u32, first_index: u32) -> Result<()> {
        let command_buffer = self.secondary(buffer)?;
        unsafe {
            self.ctx.device.cmd_draw_indexed(command_buffer, index_count, 1, first_index, 0, 0);
        }
        Ok(())
    }

    fn copy_buffer(&self, buffer: SecondaryBufferId, src: BufferId, dst: BufferId, size: u64) -> Result<()> {
        let frame_index = self.secondaries
            .read()
            .get(&buffer.0)
            .map(|secondary| secondary.frame_index.load(Ordering::Relaxed))
            .ok_or_else(|| Error::MissingResource(format!("unknown secondary buffer {}", buffer.0)))?;

        {
            let buffers = self.buffers.read();
            for id in [src, dst] {
                let stored = buffers
                    .get(&id.0)
                    .ok_or_else(|| Error::MissingResource(format!("unknown buffer {}", id.0)))?;
                if size > stored.size {
                    return Err(Error::SizeMismatch(format!(
                        "copy of {} bytes exceeds buffer {} ({} bytes)",
                        size, id.0, stored.size
                    )));
                }
            }
        }

        // Recorded into the frame's primary ahead of the render pass
        let mut pending = self.pending_copies.lock();
        let copies = pending
            .get_mut(frame_index)
            .ok_or_else(|| Error::ProtocolMisuse(format!("frame slot {} out of range", frame_index)))?;
        copies.push(PendingCopy { src, dst, size });
        Ok(())
    }

    fn push_constants(
        &self,
        buffer: SecondaryBufferId,
        pipeline: PipelineId,
        stages: StageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        let command_buffer = self.secondary(buffer)?;
        let layout = self.pipelines
            .read()
            .get(&pipeline.0)
            .map(|stored| stored.pipeline_layout)
            .ok_or_else(|| Error::MissingResource(format!("unknown pipeline {}", pipeline.0)))?;
        unsafe {
            self.ctx.device.cmd_push_constants(command_buffer, layout, stage_flags_to_vk(stages), offset, data);
        }
        Ok(())
    }

    fn submit_and_present(&self, frame_index: usize, secondaries: &[SecondaryBufferId], image_index: u32) -> Result<()> {
        let frame = self.frame(frame_index)?;
        let framebuffer = self.ctx.framebuffer(image_index).ok_or_else(|| {
            Error::MissingResource(format!("no framebuffer for swapchain image {}", image_index))
        })?;
        let render_finished = *self.render_finished.get(image_index as usize).ok_or_else(|| {
            Error::MissingResource(format!("no semaphore for swapchain image {}", image_index))
        })?;
        let vk_secondaries = secondaries
            .iter()
            .map(|&id| self.secondary(id))
            .collect::<Result<Vec<_>>>()?;

        unsafe {
            self.record_primary(frame, frame_index, &vk_secondaries, framebuffer)?;

            let wait_semaphores = [frame.image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let command_buffers = [frame.primary];
            let signal_semaphores = [render_finished];
            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            // Reset only once the submission is certain, or the next acquire waits forever
            self.ctx.device.reset_fences(&[frame.in_flight])
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to reset frame fence: {:?}", e))?;
            self.ctx.device.queue_submit(self.ctx.graphics_queue, &[submit_info], frame.in_flight)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to submit frame: {:?}", e))?;

            let swapchains = [self.ctx.swapchain];
            let image_indices = [image_index];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&signal_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);

            match self.ctx.swapchain_loader.queue_present(self.ctx.graphics_queue, &present_info) {
                Ok(false) => Ok(()),
                Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    shim_warn!("gl2vk::vulkan", "Swapchain needs recreation after presenting image {}", image_index);
                    Ok(())
                }
                Err(e) => Err(shim_err!("gl2vk::vulkan", "Failed to present image {}: {:?}", image_index, e)),
            }
        }
    }

    fn create_buffer(&self, usage: BufferUsage, size: u64) -> Result<BufferId> {
        let buffer = Buffer::create(&self.ctx, usage, size)?;
        let id = self.next_buffer_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.write().insert(id, buffer);
        Ok(BufferId(id))
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let buffers = self.buffers.read();
        let stored = buffers
            .get(&buffer.0)
            .ok_or_else(|| Error::MissingResource(format!("unknown buffer {}", buffer.0)))?;
        stored.write(offset, data)
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if self.buffers.write().remove(&buffer.0).is_none() {
            shim_warn!("gl2vk::vulkan", "destroy_buffer: unknown buffer {}", buffer.0);
        }
    }

    fn max_push_constants_size(&self) -> u32 {
        self.ctx.max_push_constants_size
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx.device.device_wait_idle()
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to wait idle: {:?}", e))
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            self.buffers.get_mut().clear();
            self.pipelines.get_mut().clear();

            // Destroying a pool frees every buffer allocated from it
            self.secondaries.get_mut().clear();
            for (_, pool) in self.node_pools.get_mut().drain() {
                self.ctx.device.destroy_command_pool(pool, None);
            }

            for frame in self.frames.drain(..) {
                self.ctx.device.destroy_fence(frame.in_flight, None);
                self.ctx.device.destroy_semaphore(frame.image_available, None);
            }
            for semaphore in self.render_finished.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            if self.primary_pool != vk::CommandPool::null() {
                self.ctx.device.destroy_command_pool(self.primary_pool, None);
            }
        }
    }
}
