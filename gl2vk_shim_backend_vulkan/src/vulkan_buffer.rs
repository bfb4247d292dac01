/// Buffer - host-visible Vulkan buffer

use ash::vk;
use gl2vk_shim::gl2vk::backend::BufferUsage;
use gl2vk_shim::gl2vk::{Error, Result};
use gl2vk_shim::shim_err;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::buffer_usage_to_vk;

/// Vulkan buffer with its mapped allocation
pub(crate) struct Buffer {
    /// Shared device context
    ctx: Arc<VulkanContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    /// Buffer size
    pub(crate) size: u64,
}

impl Buffer {
    /// Create a CPU-to-GPU buffer and bind its memory
    pub(crate) fn create(ctx: &Arc<VulkanContext>, usage: BufferUsage, size: u64) -> Result<Self> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(size.max(1))
                .usage(buffer_usage_to_vk(usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to create buffer of size {} bytes: {:?}", size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = {
                let mut allocator = match ctx.allocator.lock() {
                    Ok(allocator) => allocator,
                    Err(_) => {
                        ctx.device.destroy_buffer(buffer, None);
                        return Err(shim_err!("gl2vk::vulkan", "Allocator mutex poisoned"));
                    }
                };
                allocator.allocate(&AllocationCreateDesc {
                    name: "gl2vk buffer",
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    return Err(shim_err!("gl2vk::vulkan", "Out of GPU memory for buffer (required: {:.2} MB): {}", size_mb, e));
                }
            };

            let created = Self {
                ctx: Arc::clone(ctx),
                buffer,
                allocation: Some(allocation),
                size,
            };

            // Drop frees the allocation and the buffer if binding fails
            let (memory, offset) = match &created.allocation {
                Some(allocation) => (allocation.memory(), allocation.offset()),
                None => return Err(shim_err!("gl2vk::vulkan", "Buffer lost its allocation")),
            };
            ctx.device.bind_buffer_memory(created.buffer, memory, offset)
                .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to bind buffer memory: {:?}", e))?;

            Ok(created)
        }
    }

    /// Copy bytes into the mapped memory
    pub(crate) fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(Error::SizeMismatch(format!(
                "write of {} bytes at {} overflows buffer ({} bytes)",
                data.len(),
                offset,
                self.size
            )));
        }

        let allocation = self.allocation.as_ref()
            .ok_or_else(|| shim_err!("gl2vk::vulkan", "Buffer write failed: no GPU allocation"))?;
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::BackendError("Buffer is not CPU-accessible".to_string()))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr.add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
