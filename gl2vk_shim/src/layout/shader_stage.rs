/// Parsed shader stage declarations

use crate::layout::type_table::{GlslType, VertexFormat};

/// Pipeline stage a shader source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

/// One top-level `layout(location = N) in TYPE NAME;` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    /// Location from the explicit layout qualifier
    pub location: u32,
    /// Identifier
    pub name: String,
    /// Declared type
    pub ty: GlslType,
    /// Offset in the stage's dense layout (textual declaration order)
    pub offset: u32,
}

impl AttributeDecl {
    pub fn size(&self) -> u32 {
        self.ty.size_bytes()
    }

    pub fn format(&self) -> VertexFormat {
        self.ty.format()
    }
}

/// One field of a push-constant block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub ty: GlslType,
    /// Offset inside this stage's block (running sum of prior field sizes)
    pub offset: u32,
}

impl UniformField {
    pub fn size(&self) -> u32 {
        self.ty.size_bytes()
    }
}

/// Result of parsing one shader source
///
/// Immutable once built; the resolver only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStage {
    pub kind: ShaderKind,
    /// Vertex inputs in textual order (always empty for fragment stages)
    pub attributes: Vec<AttributeDecl>,
    /// Name of the push-constant block, if one was found
    pub uniform_block: Option<String>,
    /// Push-constant fields in textual order
    pub uniforms: Vec<UniformField>,
}

impl ShaderStage {
    /// Total size of all vertex inputs when tightly packed
    pub fn attribute_block_size(&self) -> u32 {
        self.attributes.iter().map(AttributeDecl::size).sum()
    }

    /// Total size of the push-constant block
    pub fn uniform_block_size(&self) -> u32 {
        self.uniforms.iter().map(UniformField::size).sum()
    }

    /// Find a vertex input by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
