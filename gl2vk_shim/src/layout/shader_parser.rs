/// Line-oriented shader declaration scanner
///
/// Only top-level declarations are recognized. Brace depth is tracked per
/// line so anything inside function bodies or blocks is ignored. This is not
/// a GLSL parser: malformed or unsupported lines are skipped silently.

use crate::layout::shader_stage::{AttributeDecl, ShaderKind, ShaderStage, UniformField};
use crate::layout::type_table::GlslType;

const LOCATION_QUALIFIER: &str = "layout(location=";
const PUSH_CONSTANT_QUALIFIER: &str = "layout(push_constant)";

/// Parse a shader source of the given kind
///
/// Vertex inputs are only collected for vertex stages; push-constant
/// fields are collected for both.
pub fn parse_stage(kind: ShaderKind, source: &str) -> ShaderStage {
    let attributes = match kind {
        ShaderKind::Vertex => parse_vertex_inputs(source),
        ShaderKind::Fragment => Vec::new(),
    };
    let (uniform_block, uniforms) = parse_uniform_block(source);

    ShaderStage {
        kind,
        attributes,
        uniform_block,
        uniforms,
    }
}

/// Collect `layout(location = N) in TYPE NAME;` declarations at depth 0
///
/// Offsets are the running sum of type sizes in textual order; the
/// explicit location does not influence them.
pub fn parse_vertex_inputs(source: &str) -> Vec<AttributeDecl> {
    let mut attributes = Vec::new();
    let mut offset = 0;
    let mut depth = 0i32;

    for line in source.lines() {
        depth += brace_delta(line);
        if depth != 0 {
            continue;
        }

        let tokens = tokenize(line);
        let Some(in_index) = tokens.iter().position(|t| *t == "in") else {
            continue;
        };
        let Some(location) = parse_location(line) else {
            continue;
        };
        let (Some(type_name), Some(name)) = (tokens.get(in_index + 1), tokens.get(in_index + 2)) else {
            continue;
        };
        let Some(ty) = GlslType::from_name(type_name) else {
            continue;
        };

        attributes.push(AttributeDecl {
            location,
            name: strip_terminator(name).to_string(),
            ty,
            offset,
        });
        offset += ty.size_bytes();
    }

    attributes
}

/// Collect the fields of the `layout(push_constant) uniform` block
///
/// Returns the block name (the token after `uniform`) and its fields.
/// Other uniform declarations are skipped.
pub fn parse_uniform_block(source: &str) -> (Option<String>, Vec<UniformField>) {
    let mut block_name = None;
    let mut fields = Vec::new();
    let mut offset = 0;
    let mut depth = 0i32;
    // Depth at which the current push-constant block was opened
    let mut entry_depth: Option<i32> = None;

    for line in source.lines() {
        let depth_before = depth;
        depth += brace_delta(line);

        if let Some(entry) = entry_depth {
            if depth != depth_before && depth == entry {
                // Closing line of the block
                entry_depth = None;
                continue;
            }

            let tokens = tokenize(line);
            if let (Some(first), Some(second)) = (tokens.first(), tokens.get(1)) {
                if let Some(ty) = GlslType::from_name(first) {
                    fields.push(UniformField {
                        name: strip_terminator(second).to_string(),
                        ty,
                        offset,
                    });
                    offset += ty.size_bytes();
                }
            }
            continue;
        }

        if depth_before != 0 || !strip_whitespace(line).contains(PUSH_CONSTANT_QUALIFIER) {
            continue;
        }
        let tokens = tokenize(line);
        let Some(uniform_index) = tokens.iter().position(|t| *t == "uniform") else {
            continue;
        };
        if let Some(name) = tokens.get(uniform_index + 1).filter(|t| **t != "{") {
            block_name = Some(name.to_string());
        }
        entry_depth = Some(depth_before);
    }

    (block_name, fields)
}

// ===== HELPERS =====

fn brace_delta(line: &str) -> i32 {
    line.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ' ' || c == '\t')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

fn strip_whitespace(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}

fn strip_terminator(token: &str) -> &str {
    token.trim_end_matches(';')
}

fn parse_location(line: &str) -> Option<u32> {
    let compact = strip_whitespace(line);
    let start = compact.find(LOCATION_QUALIFIER)? + LOCATION_QUALIFIER.len();
    let end = start + compact[start..].find(')')?;
    compact[start..end].parse().ok()
}

#[cfg(test)]
#[path = "shader_parser_tests.rs"]
mod tests;
