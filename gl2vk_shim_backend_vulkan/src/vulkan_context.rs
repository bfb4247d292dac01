/// VulkanContext - device objects handed over by the host
///
/// Instance, device, surface and swapchain bootstrap belong to the host
/// application. The backend only needs the handles below to record, submit
/// and present.

use ash::vk;
use gl2vk_shim::gl2vk::layout::ShaderKind;
use gl2vk_shim::gl2vk::Result;
use gpu_allocator::vulkan::Allocator;
use std::sync::{Arc, Mutex};

/// Turns shader text into SPIR-V words
///
/// Compilation is the host's concern (shaderc, glslang, a prebuilt cache...).
pub type ShaderCompiler = Box<dyn Fn(ShaderKind, &str) -> Result<Vec<u32>> + Send + Sync>;

/// Device-level state shared by every backend object
pub struct VulkanContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator (shared with the host, requires mutex for thread safety)
    pub allocator: Arc<Mutex<Allocator>>,

    /// Graphics queue used for submit and present
    pub graphics_queue: vk::Queue,

    /// Graphics queue family index (command pools are created on it)
    pub graphics_queue_family: u32,

    /// Swapchain extension loader
    pub swapchain_loader: ash::khr::swapchain::Device,

    /// Swapchain the frames are presented to
    pub swapchain: vk::SwapchainKHR,

    /// Swapchain extent (static viewport and scissor of every pipeline)
    pub extent: vk::Extent2D,

    /// Single-subpass render pass with one color attachment
    pub render_pass: vk::RenderPass,

    /// One framebuffer per swapchain image, indexed by image index
    pub framebuffers: Vec<vk::Framebuffer>,

    /// Clear color for the render pass
    pub clear_color: [f32; 4],

    /// Device limit `maxPushConstantsSize`
    pub max_push_constants_size: u32,

    /// Shader text to SPIR-V
    pub shader_compiler: ShaderCompiler,
}

impl VulkanContext {
    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Framebuffer of a swapchain image
    pub(crate) fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}
