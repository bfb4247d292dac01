use super::*;
use crate::layout::type_table::{GlslType, VertexFormat};

const VERTEX_BASIC: &str = "#version 450

layout(location = 0) in vec2 inPosition;
layout(location = 1) in vec3 inColor;

layout(location = 0) out vec3 fragColor;

void main() {
    gl_Position = vec4(inPosition, 0.0, 1.0);
    fragColor = inColor;
}
";

const VERTEX_WITH_UNIFORMS: &str = "#version 450

layout(location = 0) out vec3 fragColor;

layout( push_constant ) uniform uStruct
{
  vec2 u_pos;
  float u_time;
} uni;

vec2 positions[3] = vec2[](
    vec2(0.0, -0.5),
    vec2(0.5, 0.5),
    vec2(-0.5, 0.5)
);

void main() {
    gl_Position = vec4(positions[gl_VertexIndex]+uni.u_pos, 0.0, 1.0);
    fragColor = vec3(uni.u_time);
}
";

// ============================================================================
// Vertex input tests
// ============================================================================

#[test]
fn test_parse_basic_vertex_inputs() {
    let attributes = parse_vertex_inputs(VERTEX_BASIC);

    assert_eq!(attributes.len(), 2);
    assert_eq!(attributes[0].name, "inPosition");
    assert_eq!(attributes[0].location, 0);
    assert_eq!(attributes[0].ty, GlslType::Vec2);
    assert_eq!(attributes[0].offset, 0);
    assert_eq!(attributes[1].name, "inColor");
    assert_eq!(attributes[1].location, 1);
    assert_eq!(attributes[1].format(), VertexFormat::R32G32B32_SFLOAT);
    assert_eq!(attributes[1].offset, 8);
}

#[test]
fn test_outputs_are_not_inputs() {
    let attributes = parse_vertex_inputs(VERTEX_BASIC);
    assert!(attributes.iter().all(|a| a.name != "fragColor"));
}

#[test]
fn test_offsets_follow_textual_order_not_location() {
    let source = "layout(location = 3) in float inBrightness;
layout(location = 0) in vec2 inPosition;
layout(location = 1) in vec3 inNormals;
";
    let attributes = parse_vertex_inputs(source);

    let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
    let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
    assert_eq!(locations, vec![3, 0, 1]);
    assert_eq!(offsets, vec![0, 4, 12]);
}

#[test]
fn test_tabs_and_spacing_are_normalized() {
    let source = "layout (location=2)\tin\tvec4   inTangent;\n";
    let attributes = parse_vertex_inputs(source);

    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes[0].location, 2);
    assert_eq!(attributes[0].ty, GlslType::Vec4);
    assert_eq!(attributes[0].name, "inTangent");
}

#[test]
fn test_declarations_inside_braces_are_ignored() {
    let source = "layout(location = 0) in vec2 a;
struct Hidden {
    layout(location = 1) in vec3 b;
};
layout(location = 2) in float c;
";
    let names: Vec<String> = parse_vertex_inputs(source).into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
}

#[test]
fn test_malformed_lines_are_skipped() {
    let source = "layout(location = x) in vec2 badLocation;
layout(location = 1) in sampler2D badType;
layout(location = 2) in vec3
in vec2 noLayout;
layout(location = 3) in vec2 good;
";
    let attributes = parse_vertex_inputs(source);
    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes[0].name, "good");
    assert_eq!(attributes[0].offset, 0);
}

// ============================================================================
// Push-constant block tests
// ============================================================================

#[test]
fn test_parse_push_constant_block() {
    let (block, fields) = parse_uniform_block(VERTEX_WITH_UNIFORMS);

    assert_eq!(block.as_deref(), Some("uStruct"));
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].name, "u_pos");
    assert_eq!(fields[0].offset, 0);
    assert_eq!(fields[1].name, "u_time");
    assert_eq!(fields[1].offset, 8);
    assert_eq!(fields[1].size(), 4);
}

#[test]
fn test_open_brace_on_declaration_line() {
    let source = "layout(push_constant) uniform Block {
    float u_brightness;
    vec4 u_extraColor;
} block;
float notAField;
";
    let (block, fields) = parse_uniform_block(source);

    assert_eq!(block.as_deref(), Some("Block"));
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["u_brightness", "u_extraColor"]);
    assert_eq!(fields[1].offset, 4);
}

#[test]
fn test_non_push_constant_uniforms_are_skipped() {
    let source = "layout(binding = 0) uniform sampler2D tex;
uniform float legacy;
";
    let (block, fields) = parse_uniform_block(source);
    assert!(block.is_none());
    assert!(fields.is_empty());
}

#[test]
fn test_unknown_field_types_are_skipped() {
    let source = "layout(push_constant) uniform Block
{
    Light light;
    mat4 u_mvp;
} pc;
";
    let (_, fields) = parse_uniform_block(source);
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, "u_mvp");
    assert_eq!(fields[0].offset, 0);
}

// ============================================================================
// Stage tests
// ============================================================================

#[test]
fn test_fragment_stage_has_no_attributes() {
    let source = "layout(location = 0) in vec3 fragColor;
layout(location = 0) out vec4 outColor;
";
    let stage = parse_stage(ShaderKind::Fragment, source);
    assert_eq!(stage.kind, ShaderKind::Fragment);
    assert!(stage.attributes.is_empty());
}

#[test]
fn test_stage_block_sizes() {
    let stage = parse_stage(ShaderKind::Vertex, VERTEX_WITH_UNIFORMS);
    assert_eq!(stage.uniform_block_size(), 12);
    assert_eq!(stage.attribute_block_size(), 0);

    let stage = parse_stage(ShaderKind::Vertex, VERTEX_BASIC);
    assert_eq!(stage.attribute_block_size(), 20);
    assert_eq!(stage.attribute("inColor").map(|a| a.location), Some(1));
}
