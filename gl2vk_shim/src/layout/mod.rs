//! Layout resolver module
//!
//! Shader declaration scanning, the type table and per-pipeline vertex-input
//! and push-constant layout synthesis.

pub mod type_table;
pub mod shader_stage;
pub mod shader_parser;
pub mod binding_group;
pub mod pipeline;
pub mod layout_resolver;

pub use type_table::{GlslType, VertexFormat};
pub use shader_stage::{AttributeDecl, ShaderKind, ShaderStage, UniformField};
pub use shader_parser::{parse_stage, parse_uniform_block, parse_vertex_inputs};
pub use binding_group::{AttributeSlice, BindingGroup};
pub use pipeline::{
    IndexType, PipelineLayout, PushConstantRange, StageFlags, VertexAttribute, VertexBinding,
};
pub use layout_resolver::{
    AttributeEntry, LayoutResolver, Pipeline, StageHandles, UniformBinding, UniformEntry,
};
