use super::*;
use crate::layout::shader_parser::parse_stage;
use crate::layout::type_table::VertexFormat;

const VERTEX_AB: &str = "#version 450
layout(location = 0) in vec2 a;
layout(location = 1) in vec3 b;

void main() {
    gl_Position = vec4(a, 0.0, 1.0);
}
";

const VERTEX_UNIFORMS: &str = "#version 450
layout(location = 0) in vec2 inPosition;

layout( push_constant ) uniform uStruct
{
  vec2 u_pos;
  float u_time;
} uni;

void main() {
    gl_Position = vec4(inPosition + uni.u_pos, 0.0, 1.0);
}
";

const FRAGMENT_UNIFORMS: &str = "#version 450
layout( push_constant ) uniform uniform_struct
{
  float u_brightness;
  vec4 u_extraColor;
} uniforms;

layout(location = 0) in vec3 fragColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(fragColor + vec3(uniforms.u_brightness), 1.0) + uniforms.u_extraColor;
}
";

const FRAGMENT_PLAIN: &str = "#version 450
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(1.0);
}
";

fn pipeline_with(resolver: &mut LayoutResolver, vertex: &str, fragment: &str) -> PipelineHandle {
    let pipeline = resolver.create_pipeline();
    resolver.register_stage(pipeline, parse_stage(ShaderKind::Vertex, vertex)).unwrap();
    resolver.register_stage(pipeline, parse_stage(ShaderKind::Fragment, fragment)).unwrap();
    pipeline
}

// ============================================================================
// Handle issuance
// ============================================================================

#[test]
fn test_pipeline_handles_start_at_one() {
    let mut resolver = LayoutResolver::new();
    assert_eq!(resolver.create_pipeline().raw(), 1);
    assert_eq!(resolver.create_pipeline().raw(), 2);
}

#[test]
fn test_attribute_handles_strictly_increase_across_pipelines() {
    // Declaration order differs from location order on purpose
    let vertex_a = "layout(location = 1) in vec3 color;
layout(location = 0) in vec2 pos;
";
    let vertex_b = "layout(location = 3) in float bright;
layout(location = 2) in vec3 color;
layout(location = 0) in vec2 pos;
layout(location = 1) in vec3 normal;
";
    let mut resolver = LayoutResolver::new();
    let a = pipeline_with(&mut resolver, vertex_a, FRAGMENT_PLAIN);
    let b = pipeline_with(&mut resolver, vertex_b, FRAGMENT_PLAIN);

    let order = [
        resolver.attribute_handle(a, "color").unwrap(),
        resolver.attribute_handle(a, "pos").unwrap(),
        resolver.attribute_handle(b, "bright").unwrap(),
        resolver.attribute_handle(b, "color").unwrap(),
        resolver.attribute_handle(b, "pos").unwrap(),
        resolver.attribute_handle(b, "normal").unwrap(),
    ];
    let raw: Vec<u32> = order.iter().map(|h| h.raw()).collect();
    assert_eq!(raw, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_uniform_handles_and_offsets() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_UNIFORMS, FRAGMENT_UNIFORMS);

    let u_pos = resolver.uniform_handle(pipeline, "u_pos").unwrap();
    let u_time = resolver.uniform_handle(pipeline, "u_time").unwrap();
    let u_brightness = resolver.uniform_handle(pipeline, "u_brightness").unwrap();
    let u_extra = resolver.uniform_handle(pipeline, "u_extraColor").unwrap();

    assert_eq!(
        [u_pos.raw(), u_time.raw(), u_brightness.raw(), u_extra.raw()],
        [1, 2, 3, 4]
    );
    assert_eq!(resolver.uniform(u_pos).unwrap().offset, 0);
    assert_eq!(resolver.uniform(u_time).unwrap().offset, 8);
    // Fragment block is biased by the 12-byte vertex block
    assert_eq!(resolver.uniform(u_brightness).unwrap().offset, 12);
    assert_eq!(resolver.uniform(u_extra).unwrap().offset, 16);
    assert_eq!(resolver.uniform(u_extra).unwrap().stages, StageFlags::FRAGMENT);
}

#[test]
fn test_duplicate_uniform_names_keep_both_entries() {
    let vertex = "layout(location = 0) in vec2 p;
layout(push_constant) uniform V
{
  float u_scale;
} v;
";
    let fragment = "layout(push_constant) uniform F
{
  float u_scale;
} f;
";
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, vertex, fragment);

    let entries = resolver.pipeline(pipeline).unwrap().uniforms();
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].handle, entries[1].handle);
    assert_eq!(entries[0].offset, 0);
    assert_eq!(entries[1].offset, 4);
    // Lookup by name returns the first registration
    assert_eq!(resolver.uniform_handle(pipeline, "u_scale").unwrap(), entries[0].handle);
}

#[test]
fn test_fragment_before_vertex_is_missing_resource() {
    let mut resolver = LayoutResolver::new();
    let pipeline = resolver.create_pipeline();
    let result = resolver.register_stage(pipeline, parse_stage(ShaderKind::Fragment, FRAGMENT_UNIFORMS));
    assert!(matches!(result, Err(Error::MissingResource(_))));
}

#[test]
fn test_duplicate_stage_is_protocol_misuse() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_AB, FRAGMENT_PLAIN);
    let again = resolver.register_stage(pipeline, parse_stage(ShaderKind::Vertex, VERTEX_AB));
    assert!(matches!(again, Err(Error::ProtocolMisuse(_))));
}

#[test]
fn test_unknown_pipeline_is_protocol_misuse() {
    let mut other = LayoutResolver::new();
    let foreign = other.create_pipeline();
    let mut resolver = LayoutResolver::new();
    let result = resolver.register_stage(foreign, parse_stage(ShaderKind::Vertex, VERTEX_AB));
    assert!(matches!(result, Err(Error::ProtocolMisuse(_))));
}

#[test]
fn test_unknown_names_are_missing_resource() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_AB, FRAGMENT_PLAIN);
    assert!(matches!(resolver.attribute_handle(pipeline, "c"), Err(Error::MissingResource(_))));
    assert!(matches!(resolver.uniform_handle(pipeline, "u_x"), Err(Error::MissingResource(_))));
}

// ============================================================================
// Layout synthesis
// ============================================================================

#[test]
fn test_single_slot_layout() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_AB, FRAGMENT_PLAIN);
    let a = resolver.attribute_handle(pipeline, "a").unwrap();
    let b = resolver.attribute_handle(pipeline, "b").unwrap();

    resolver.bind_attribute(1, a, 8, 0, 20).unwrap();
    resolver.bind_attribute(1, b, 12, 8, 20).unwrap();

    let layout = resolver.build_layout(pipeline, 128).unwrap();
    assert_eq!(layout.bindings, vec![VertexBinding { binding: 0, stride: 20 }]);
    assert_eq!(layout.attributes.len(), 2);
    assert_eq!(layout.attributes[0].location, 0);
    assert_eq!(layout.attributes[0].offset, 0);
    assert_eq!(layout.attributes[0].format, VertexFormat::R32G32_SFLOAT);
    assert_eq!(layout.attributes[1].location, 1);
    assert_eq!(layout.attributes[1].offset, 8);
    assert_eq!(layout.attributes[1].format, VertexFormat::R32G32B32_SFLOAT);
    assert_eq!(layout.buffer_slots, vec![1]);
    assert!(layout.push_constant_ranges.is_empty());
}

#[test]
fn test_two_slots_yield_two_bindings() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_AB, FRAGMENT_PLAIN);
    let a = resolver.attribute_handle(pipeline, "a").unwrap();
    let b = resolver.attribute_handle(pipeline, "b").unwrap();

    resolver.bind_attribute(4, a, 8, 0, 8).unwrap();
    resolver.bind_attribute(7, b, 12, 0, 12).unwrap();

    let layout = resolver.build_layout(pipeline, 128).unwrap();
    assert_eq!(
        layout.bindings,
        vec![
            VertexBinding { binding: 0, stride: 8 },
            VertexBinding { binding: 1, stride: 12 },
        ]
    );
    assert_eq!(layout.attributes[0].binding, 0);
    assert_eq!(layout.attributes[0].location, 0);
    assert_eq!(layout.attributes[1].binding, 1);
    assert_eq!(layout.attributes[1].location, 1);
    assert_eq!(layout.buffer_slots, vec![4, 7]);
}

#[test]
fn test_stride_last_write_wins() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_AB, FRAGMENT_PLAIN);
    let a = resolver.attribute_handle(pipeline, "a").unwrap();
    let b = resolver.attribute_handle(pipeline, "b").unwrap();

    resolver.bind_attribute(0, a, 8, 0, 16).unwrap();
    resolver.bind_attribute(0, b, 12, 8, 24).unwrap();

    let layout = resolver.build_layout(pipeline, 128).unwrap();
    assert_eq!(layout.bindings[0].stride, 24);
}

#[test]
fn test_push_constant_ranges() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_UNIFORMS, FRAGMENT_UNIFORMS);
    let position = resolver.attribute_handle(pipeline, "inPosition").unwrap();
    resolver.bind_attribute(0, position, 8, 0, 8).unwrap();

    let layout = resolver.build_layout(pipeline, 128).unwrap();
    assert_eq!(
        layout.push_constant_ranges,
        vec![
            PushConstantRange { stages: StageFlags::VERTEX, offset: 0, size: 12 },
            PushConstantRange { stages: StageFlags::FRAGMENT, offset: 12, size: 20 },
        ]
    );
    assert_eq!(layout.push_constant_size(), 32);
}

#[test]
fn test_push_constants_over_limit_is_size_mismatch() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_UNIFORMS, FRAGMENT_UNIFORMS);
    let position = resolver.attribute_handle(pipeline, "inPosition").unwrap();
    resolver.bind_attribute(0, position, 8, 0, 8).unwrap();

    let result = resolver.build_layout(pipeline, 16);
    assert!(matches!(result, Err(Error::SizeMismatch(_))));
    // Nothing frozen on failure
    assert!(!resolver.pipeline(pipeline).unwrap().is_frozen());
}

#[test]
fn test_zero_groups_is_incomplete_pipeline() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_AB, FRAGMENT_PLAIN);
    let result = resolver.build_layout(pipeline, 128);
    assert!(matches!(result, Err(Error::IncompletePipeline(_))));
}

#[test]
fn test_build_layout_is_memoized_and_freezes() {
    let mut resolver = LayoutResolver::new();
    let pipeline = pipeline_with(&mut resolver, VERTEX_AB, FRAGMENT_PLAIN);
    let a = resolver.attribute_handle(pipeline, "a").unwrap();
    let b = resolver.attribute_handle(pipeline, "b").unwrap();
    resolver.bind_attribute(0, a, 8, 0, 20).unwrap();

    let first = resolver.build_layout(pipeline, 128).unwrap().clone();

    let frozen = resolver.bind_attribute(0, b, 12, 8, 20);
    assert!(matches!(frozen, Err(Error::LayoutFrozen(_))));

    let second = resolver.build_layout(pipeline, 128).unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(second.attributes.len(), 1);
}

#[test]
fn test_bind_unregistered_handle_is_missing_resource() {
    let mut other = LayoutResolver::new();
    let pipeline = pipeline_with(&mut other, VERTEX_AB, FRAGMENT_PLAIN);
    let foreign = other.attribute_handle(pipeline, "b").unwrap();

    let mut resolver = LayoutResolver::new();
    let result = resolver.bind_attribute(0, foreign, 12, 0, 12);
    assert!(matches!(result, Err(Error::MissingResource(_))));
}
