/// Pipeline layout descriptors
///
/// Output of `LayoutResolver::build_layout`: everything a backend needs to
/// create an immutable pipeline object besides the shader binaries.

use bitflags::bitflags;
use crate::layout::type_table::VertexFormat;
use crate::layout::shader_stage::ShaderKind;

bitflags! {
    /// Shader stages that can see a push-constant range
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageFlags: u32 {
        const VERTEX = 1;
        const FRAGMENT = 2;
    }
}

impl From<ShaderKind> for StageFlags {
    fn from(kind: ShaderKind) -> Self {
        match kind {
            ShaderKind::Vertex => StageFlags::VERTEX,
            ShaderKind::Fragment => StageFlags::FRAGMENT,
        }
    }
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices (max 65535 vertices)
    U16,
    /// 32-bit indices
    U32,
}

impl IndexType {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute location in shader
    pub location: u32,
    /// Binding index
    pub binding: u32,
    /// Format of the attribute (data type and component count)
    pub format: VertexFormat,
    /// Offset in bytes from the start of the vertex
    pub offset: u32,
}

/// Vertex binding description (always per-vertex rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    /// Binding index
    pub binding: u32,
    /// Stride in bytes between consecutive elements
    pub stride: u32,
}

/// Push constant range descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    /// Shader stages that can access these push constants
    pub stages: StageFlags,
    /// Offset in bytes
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// Frozen layout of one pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineLayout {
    /// One binding per binding group, ordered by buffer slot
    pub bindings: Vec<VertexBinding>,
    /// One attribute per bound location
    pub attributes: Vec<VertexAttribute>,
    /// Vertex range first, fragment range second; empty ranges omitted
    pub push_constant_ranges: Vec<PushConstantRange>,
    /// Client buffer slot feeding each binding index
    /// (`buffer_slots[binding]` is the slot bound at that binding)
    pub buffer_slots: Vec<u32>,
}

impl PipelineLayout {
    /// Total push-constant bytes across all stages
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_ranges.iter().map(|r| r.offset + r.size).max().unwrap_or(0)
    }
}
