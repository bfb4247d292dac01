/// Shim-to-Vulkan enum conversions

use ash::vk;
use gl2vk_shim::gl2vk::backend::BufferUsage;
use gl2vk_shim::gl2vk::layout::{IndexType, StageFlags, VertexFormat};

pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        // Float formats
        VertexFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        VertexFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        VertexFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        // Integer formats (signed)
        VertexFormat::R32_SINT => vk::Format::R32_SINT,
        VertexFormat::R32G32_SINT => vk::Format::R32G32_SINT,
        VertexFormat::R32G32B32_SINT => vk::Format::R32G32B32_SINT,
        VertexFormat::R32G32B32A32_SINT => vk::Format::R32G32B32A32_SINT,
        // Integer formats (unsigned)
        VertexFormat::R32_UINT => vk::Format::R32_UINT,
        VertexFormat::R32G32_UINT => vk::Format::R32G32_UINT,
        VertexFormat::R32G32B32_UINT => vk::Format::R32G32B32_UINT,
        VertexFormat::R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,
        // Byte formats
        VertexFormat::R8_UINT => vk::Format::R8_UINT,
        VertexFormat::R8G8_UINT => vk::Format::R8G8_UINT,
        VertexFormat::R8G8B8_UINT => vk::Format::R8G8B8_UINT,
        VertexFormat::R8G8B8A8_UINT => vk::Format::R8G8B8A8_UINT,
    }
}

pub(crate) fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

pub(crate) fn stage_flags_to_vk(flags: StageFlags) -> vk::ShaderStageFlags {
    let mut vk_flags = vk::ShaderStageFlags::empty();
    if flags.contains(StageFlags::VERTEX) {
        vk_flags |= vk::ShaderStageFlags::VERTEX;
    }
    if flags.contains(StageFlags::FRAGMENT) {
        vk_flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    vk_flags
}

/// Every buffer can take part in a copy in both directions
pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let transfer = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | transfer,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER | transfer,
        BufferUsage::Staging => transfer,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
