/*!
# gl2vk shim - Vulkan backend

Implements the shim's `Backend` trait on top of ash and gpu-allocator.

The host application creates the instance, device, swapchain, render pass
and framebuffers, then hands them over in a [`VulkanContext`]. The backend
owns command pools, synchronization objects, buffers and pipelines from
there on.

# Example

```no_run
use std::sync::Arc;
use gl2vk_shim::gl2vk::{Gl2Vk, ShimConfig};
use gl2vk_shim_backend_vulkan::{VulkanBackend, VulkanContext};

fn start(ctx: VulkanContext) -> gl2vk_shim::gl2vk::Result<Gl2Vk> {
    let config = ShimConfig::default();
    let backend = VulkanBackend::new(ctx, config.frames_in_flight)?;
    Gl2Vk::new(Arc::new(backend), config)
}
```
*/

mod vulkan_backend;
mod vulkan_buffer;
mod vulkan_context;
mod vulkan_format;
mod vulkan_pipeline;

pub use vulkan_backend::VulkanBackend;
pub use vulkan_context::{ShaderCompiler, VulkanContext};
