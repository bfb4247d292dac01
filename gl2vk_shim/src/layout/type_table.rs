/// GLSL type table
///
/// Maps the scalar, vector and matrix type names that may appear in vertex
/// inputs and push-constant blocks to a byte size and a vertex format.

/// Vertex attribute data format
///
/// Defines the data type and component count of one attribute element.
/// Backends translate this into their native format enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    // Float formats
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,

    // Integer formats (signed)
    R32_SINT,
    R32G32_SINT,
    R32G32B32_SINT,
    R32G32B32A32_SINT,

    // Integer formats (unsigned)
    R32_UINT,
    R32G32_UINT,
    R32G32B32_UINT,
    R32G32B32A32_UINT,

    // Byte formats (unsigned, used for bool vectors)
    R8_UINT,
    R8G8_UINT,
    R8G8B8_UINT,
    R8G8B8A8_UINT,
}

impl VertexFormat {
    /// Returns size in bytes of one element in this format
    pub fn size_bytes(&self) -> u32 {
        match self {
            VertexFormat::R32_SFLOAT | VertexFormat::R32_SINT | VertexFormat::R32_UINT => 4,
            VertexFormat::R32G32_SFLOAT | VertexFormat::R32G32_SINT | VertexFormat::R32G32_UINT => 8,
            VertexFormat::R32G32B32_SFLOAT | VertexFormat::R32G32B32_SINT | VertexFormat::R32G32B32_UINT => 12,
            VertexFormat::R32G32B32A32_SFLOAT | VertexFormat::R32G32B32A32_SINT | VertexFormat::R32G32B32A32_UINT => 16,
            VertexFormat::R8_UINT => 1,
            VertexFormat::R8G8_UINT => 2,
            VertexFormat::R8G8B8_UINT => 3,
            VertexFormat::R8G8B8A8_UINT => 4,
        }
    }
}

/// A GLSL type the resolver understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
}

impl GlslType {
    /// Look up a type by its GLSL spelling
    ///
    /// Returns `None` for anything outside the table (structs, samplers,
    /// arrays, double precision types).
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "float" => GlslType::Float,
            "vec2" => GlslType::Vec2,
            "vec3" => GlslType::Vec3,
            "vec4" => GlslType::Vec4,
            "int" => GlslType::Int,
            "ivec2" => GlslType::IVec2,
            "ivec3" => GlslType::IVec3,
            "ivec4" => GlslType::IVec4,
            "uint" => GlslType::UInt,
            "uvec2" => GlslType::UVec2,
            "uvec3" => GlslType::UVec3,
            "uvec4" => GlslType::UVec4,
            "bool" => GlslType::Bool,
            "bvec2" => GlslType::BVec2,
            "bvec3" => GlslType::BVec3,
            "bvec4" => GlslType::BVec4,
            "mat2" => GlslType::Mat2,
            "mat3" => GlslType::Mat3,
            "mat4" => GlslType::Mat4,
            _ => return None,
        };
        Some(ty)
    }

    /// Size in bytes when tightly packed
    pub fn size_bytes(&self) -> u32 {
        match self {
            GlslType::Mat2 => 16,
            GlslType::Mat3 => 36,
            GlslType::Mat4 => 64,
            other => other.format().size_bytes(),
        }
    }

    /// Vertex format of one element
    ///
    /// Matrices report the format of a single column; each column occupies
    /// its own location when used as a vertex input.
    pub fn format(&self) -> VertexFormat {
        match self {
            GlslType::Float => VertexFormat::R32_SFLOAT,
            GlslType::Vec2 | GlslType::Mat2 => VertexFormat::R32G32_SFLOAT,
            GlslType::Vec3 | GlslType::Mat3 => VertexFormat::R32G32B32_SFLOAT,
            GlslType::Vec4 | GlslType::Mat4 => VertexFormat::R32G32B32A32_SFLOAT,
            GlslType::Int => VertexFormat::R32_SINT,
            GlslType::IVec2 => VertexFormat::R32G32_SINT,
            GlslType::IVec3 => VertexFormat::R32G32B32_SINT,
            GlslType::IVec4 => VertexFormat::R32G32B32A32_SINT,
            GlslType::UInt => VertexFormat::R32_UINT,
            GlslType::UVec2 => VertexFormat::R32G32_UINT,
            GlslType::UVec3 => VertexFormat::R32G32B32_UINT,
            GlslType::UVec4 => VertexFormat::R32G32B32A32_UINT,
            GlslType::Bool => VertexFormat::R8_UINT,
            GlslType::BVec2 => VertexFormat::R8G8_UINT,
            GlslType::BVec3 => VertexFormat::R8G8B8_UINT,
            GlslType::BVec4 => VertexFormat::R8G8B8A8_UINT,
        }
    }
}

#[cfg(test)]
#[path = "type_table_tests.rs"]
mod tests;
