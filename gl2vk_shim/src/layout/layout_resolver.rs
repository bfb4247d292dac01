/// Layout resolver
///
/// Turns parsed shader stages plus a stream of legacy "bind buffer, set
/// pointer" calls into a frozen vertex-input layout and push-constant
/// directory per pipeline.
///
/// Handles are issued by allocators owned by the resolver, so two resolvers
/// never share a handle space. Each of those calls is meaningless on its own;
/// the resolver keeps the cross-call state (which pipeline a handle belongs
/// to, which buffer slot is current) that gives them meaning.

use std::collections::BTreeMap;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::handles::{AttributeHandle, PipelineHandle, UniformHandle};
use crate::layout::binding_group::BindingGroup;
use crate::layout::pipeline::{
    PipelineLayout, PushConstantRange, StageFlags, VertexAttribute, VertexBinding,
};
use crate::layout::shader_stage::{ShaderKind, ShaderStage};
use crate::utils::HandleAllocator;
use crate::{shim_debug, shim_warn_err};

const SOURCE: &str = "gl2vk::LayoutResolver";

// ============================================================================
// Directory entries
// ============================================================================

/// Vertex input known to a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEntry {
    pub name: String,
    pub handle: AttributeHandle,
    pub location: u32,
}

/// Push-constant field known to a pipeline
///
/// `offset` is already biased for fragment fields, so it is the offset in
/// the pipeline's merged push-constant block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformEntry {
    pub name: String,
    pub handle: UniformHandle,
    pub offset: u32,
    pub size: u32,
    pub stages: StageFlags,
}

/// Resolved target of a uniform handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub pipeline: PipelineHandle,
    pub stages: StageFlags,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy)]
struct AttributeTarget {
    pipeline: PipelineHandle,
    location: u32,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Resolver-side state of one pipeline
#[derive(Debug)]
pub struct Pipeline {
    handle: PipelineHandle,
    vertex: Option<ShaderStage>,
    fragment: Option<ShaderStage>,
    vertex_uniforms_registered: bool,
    attributes: Vec<AttributeEntry>,
    uniforms: Vec<UniformEntry>,
    /// Keyed by client buffer slot
    groups: BTreeMap<u32, BindingGroup>,
    /// Set once by `build_layout`; the pipeline is frozen afterward
    layout: Option<PipelineLayout>,
}

impl Pipeline {
    fn new(handle: PipelineHandle) -> Self {
        Self {
            handle,
            vertex: None,
            fragment: None,
            vertex_uniforms_registered: false,
            attributes: Vec::new(),
            uniforms: Vec::new(),
            groups: BTreeMap::new(),
            layout: None,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn vertex_stage(&self) -> Option<&ShaderStage> {
        self.vertex.as_ref()
    }

    pub fn fragment_stage(&self) -> Option<&ShaderStage> {
        self.fragment.as_ref()
    }

    pub fn attributes(&self) -> &[AttributeEntry] {
        &self.attributes
    }

    /// Uniform directory in registration order (duplicates kept)
    pub fn uniforms(&self) -> &[UniformEntry] {
        &self.uniforms
    }

    pub fn binding_group(&self, slot: u32) -> Option<&BindingGroup> {
        self.groups.get(&slot)
    }

    pub fn binding_group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.layout.is_some()
    }

    pub fn layout(&self) -> Option<&PipelineLayout> {
        self.layout.as_ref()
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(shim_warn_err!(SOURCE, Error::LayoutFrozen(format!(
                "{} already has a built layout",
                self.handle
            ))));
        }
        Ok(())
    }
}

// ============================================================================
// LayoutResolver
// ============================================================================

/// Handles returned by `LayoutResolver::register_stage`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageHandles {
    pub attributes: Vec<AttributeHandle>,
    pub uniforms: Vec<UniformHandle>,
}

/// Owner of every pipeline's layout state and of the handle spaces
pub struct LayoutResolver {
    pipeline_handles: HandleAllocator,
    attribute_handles: HandleAllocator,
    uniform_handles: HandleAllocator,
    pipelines: FxHashMap<PipelineHandle, Pipeline>,
    attributes: FxHashMap<AttributeHandle, AttributeTarget>,
    uniforms: FxHashMap<UniformHandle, UniformBinding>,
}

impl LayoutResolver {
    pub fn new() -> Self {
        Self {
            pipeline_handles: HandleAllocator::new(),
            attribute_handles: HandleAllocator::new(),
            uniform_handles: HandleAllocator::new(),
            pipelines: FxHashMap::default(),
            attributes: FxHashMap::default(),
            uniforms: FxHashMap::default(),
        }
    }

    /// Create an empty pipeline
    pub fn create_pipeline(&mut self) -> PipelineHandle {
        let handle = PipelineHandle(self.pipeline_handles.alloc());
        self.pipelines.insert(handle, Pipeline::new(handle));
        handle
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Option<&Pipeline> {
        self.pipelines.get(&handle)
    }

    fn pipeline_mut(&mut self, handle: PipelineHandle) -> Result<&mut Pipeline> {
        self.pipelines.get_mut(&handle).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", handle)))
        })
    }

    fn pipeline_ref(&self, handle: PipelineHandle) -> Result<&Pipeline> {
        self.pipelines.get(&handle).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", handle)))
        })
    }

    /// Register a parsed stage: vertex inputs (vertex stages only), then
    /// push-constant fields
    pub fn register_stage(&mut self, pipeline: PipelineHandle, stage: ShaderStage) -> Result<StageHandles> {
        match stage.kind {
            ShaderKind::Vertex => {
                let attributes = self.register_vertex_stage(pipeline, stage)?;
                let uniforms = self.register_uniforms(pipeline, ShaderKind::Vertex, None)?;
                Ok(StageHandles { attributes, uniforms })
            }
            ShaderKind::Fragment => {
                let uniforms = self.register_uniforms(pipeline, ShaderKind::Fragment, Some(stage))?;
                Ok(StageHandles { attributes: Vec::new(), uniforms })
            }
        }
    }

    /// Store the vertex stage and issue one attribute handle per declared
    /// input, in textual order
    pub fn register_vertex_stage(&mut self, pipeline: PipelineHandle, stage: ShaderStage) -> Result<Vec<AttributeHandle>> {
        if stage.kind != ShaderKind::Vertex {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!(
                "register_vertex_stage called with a {:?} stage",
                stage.kind
            ))));
        }

        let attribute_handles = &mut self.attribute_handles;
        let targets = &mut self.attributes;
        let entry = self.pipelines.get_mut(&pipeline).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", pipeline)))
        })?;
        entry.ensure_mutable()?;
        if entry.vertex.is_some() {
            return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!(
                "{} already has a vertex stage",
                pipeline
            ))));
        }

        let mut issued = Vec::with_capacity(stage.attributes.len());
        for decl in &stage.attributes {
            let handle = AttributeHandle(attribute_handles.alloc());
            targets.insert(handle, AttributeTarget { pipeline, location: decl.location });
            entry.attributes.push(AttributeEntry {
                name: decl.name.clone(),
                handle,
                location: decl.location,
            });
            issued.push(handle);
        }
        entry.vertex = Some(stage);

        shim_debug!(SOURCE, "{}: registered {} vertex inputs", pipeline, issued.len());
        Ok(issued)
    }

    /// Issue one uniform handle per push-constant field of a stage
    ///
    /// For `ShaderKind::Vertex` the fields come from the already registered
    /// vertex stage and `stage` must be `None`. For `ShaderKind::Fragment`
    /// the fragment stage is passed in and stored; its offsets are biased by
    /// the vertex block size, so the vertex stage must be registered first.
    pub fn register_uniforms(
        &mut self,
        pipeline: PipelineHandle,
        kind: ShaderKind,
        stage: Option<ShaderStage>,
    ) -> Result<Vec<UniformHandle>> {
        let uniform_handles = &mut self.uniform_handles;
        let bindings = &mut self.uniforms;
        let entry = self.pipelines.get_mut(&pipeline).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!("unknown {}", pipeline)))
        })?;
        entry.ensure_mutable()?;

        let Some(vertex) = entry.vertex.as_ref() else {
            return Err(shim_warn_err!(SOURCE, Error::MissingResource(format!(
                "{}: {:?} uniforms registered before any vertex stage",
                pipeline, kind
            ))));
        };

        let (fields, bias) = match kind {
            ShaderKind::Vertex => {
                if entry.vertex_uniforms_registered {
                    return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!(
                        "{}: vertex uniforms already registered",
                        pipeline
                    ))));
                }
                (vertex.uniforms.clone(), 0)
            }
            ShaderKind::Fragment => {
                if entry.fragment.is_some() {
                    return Err(shim_warn_err!(SOURCE, Error::ProtocolMisuse(format!(
                        "{} already has a fragment stage",
                        pipeline
                    ))));
                }
                let Some(stage) = stage.as_ref().filter(|s| s.kind == ShaderKind::Fragment) else {
                    return Err(shim_warn_err!(SOURCE, Error::MissingResource(format!(
                        "{}: fragment uniforms need the fragment stage",
                        pipeline
                    ))));
                };
                (stage.uniforms.clone(), vertex.uniform_block_size())
            }
        };

        let stages = StageFlags::from(kind);
        let mut issued = Vec::with_capacity(fields.len());
        for field in &fields {
            let handle = UniformHandle(uniform_handles.alloc());
            let offset = field.offset + bias;
            bindings.insert(handle, UniformBinding {
                pipeline,
                stages,
                offset,
                size: field.size(),
            });
            entry.uniforms.push(UniformEntry {
                name: field.name.clone(),
                handle,
                offset,
                size: field.size(),
                stages,
            });
            issued.push(handle);
        }

        match kind {
            ShaderKind::Vertex => entry.vertex_uniforms_registered = true,
            ShaderKind::Fragment => entry.fragment = stage,
        }

        shim_debug!(SOURCE, "{}: registered {} {:?} uniforms", pipeline, issued.len(), kind);
        Ok(issued)
    }

    /// Attribute handle of the vertex input called `name`
    pub fn attribute_handle(&self, pipeline: PipelineHandle, name: &str) -> Result<AttributeHandle> {
        self.pipeline_ref(pipeline)?
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.handle)
            .ok_or_else(|| {
                shim_warn_err!(SOURCE, Error::MissingResource(format!(
                    "{} has no vertex input named '{}'",
                    pipeline, name
                )))
            })
    }

    /// Uniform handle of the first push-constant field called `name`
    pub fn uniform_handle(&self, pipeline: PipelineHandle, name: &str) -> Result<UniformHandle> {
        self.pipeline_ref(pipeline)?
            .uniforms
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.handle)
            .ok_or_else(|| {
                shim_warn_err!(SOURCE, Error::MissingResource(format!(
                    "{} has no uniform named '{}'",
                    pipeline, name
                )))
            })
    }

    /// Resolve a uniform handle to its pipeline and merged offset
    pub fn uniform(&self, handle: UniformHandle) -> Result<UniformBinding> {
        self.uniforms.get(&handle).copied().ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::MissingResource(format!("unregistered {}", handle)))
        })
    }

    /// Pipeline that issued an attribute handle
    pub fn attribute_pipeline(&self, handle: AttributeHandle) -> Result<PipelineHandle> {
        self.attributes.get(&handle).map(|t| t.pipeline).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::MissingResource(format!("unregistered {}", handle)))
        })
    }

    /// Record that the attribute behind `handle` is sourced from
    /// `buffer_slot` with the given size, offset and stride
    ///
    /// The binding group for the slot is created on first use.
    pub fn bind_attribute(
        &mut self,
        buffer_slot: u32,
        handle: AttributeHandle,
        byte_size: u32,
        byte_offset: u32,
        stride: u32,
    ) -> Result<()> {
        let target = *self.attributes.get(&handle).ok_or_else(|| {
            shim_warn_err!(SOURCE, Error::MissingResource(format!("unregistered {}", handle)))
        })?;

        let entry = self.pipeline_mut(target.pipeline)?;
        entry.ensure_mutable()?;

        let default_stride = entry.vertex.as_ref().map_or(0, ShaderStage::attribute_block_size);
        let next_binding = entry.groups.len() as u32;
        entry
            .groups
            .entry(buffer_slot)
            .or_insert_with(|| BindingGroup::new(next_binding, default_stride))
            .set_attribute(target.location, byte_size, byte_offset, stride);
        Ok(())
    }

    /// Build (once) and return the pipeline's frozen layout
    ///
    /// Later calls return the memoized layout. On failure nothing is
    /// frozen, so the caller may bind more attributes and retry.
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Pipeline to build
    /// * `max_push_constants_size` - Backend limit for the merged push-constant block
    pub fn build_layout(&mut self, pipeline: PipelineHandle, max_push_constants_size: u32) -> Result<&PipelineLayout> {
        let entry = self.pipeline_mut(pipeline)?;
        if entry.layout.is_none() {
            let layout = Self::synthesize(entry, max_push_constants_size)?;
            shim_debug!(
                SOURCE,
                "{}: layout frozen ({} bindings, {} attributes, {} push-constant bytes)",
                pipeline,
                layout.bindings.len(),
                layout.attributes.len(),
                layout.push_constant_size()
            );
            entry.layout = Some(layout);
        }
        self.pipeline_ref(pipeline)?
            .layout
            .as_ref()
            .ok_or_else(|| Error::MissingResource(format!("{} has no layout", pipeline)))
    }

    fn synthesize(entry: &Pipeline, max_push_constants_size: u32) -> Result<PipelineLayout> {
        let pipeline = entry.handle;
        let Some(vertex) = entry.vertex.as_ref() else {
            return Err(shim_warn_err!(SOURCE, Error::IncompletePipeline(format!(
                "{} has no vertex stage",
                pipeline
            ))));
        };
        if entry.groups.is_empty() {
            return Err(shim_warn_err!(SOURCE, Error::IncompletePipeline(format!(
                "{} has no bound attributes",
                pipeline
            ))));
        }

        let vertex_size = vertex.uniform_block_size();
        let fragment_size = entry.fragment.as_ref().map_or(0, ShaderStage::uniform_block_size);
        let total = vertex_size + fragment_size;
        if total > max_push_constants_size {
            return Err(shim_warn_err!(SOURCE, Error::SizeMismatch(format!(
                "{} needs {} push-constant bytes, backend limit is {}",
                pipeline, total, max_push_constants_size
            ))));
        }

        let mut layout = PipelineLayout {
            buffer_slots: vec![0; entry.groups.len()],
            ..PipelineLayout::default()
        };

        for (slot, group) in &entry.groups {
            layout.bindings.push(VertexBinding {
                binding: group.binding(),
                stride: group.stride(),
            });
            layout.buffer_slots[group.binding() as usize] = *slot;

            for (location, slice) in group.attributes() {
                let Some(decl) = vertex.attributes.iter().find(|a| a.location == location) else {
                    continue;
                };
                layout.attributes.push(VertexAttribute {
                    location,
                    binding: group.binding(),
                    format: decl.format(),
                    offset: slice.offset,
                });
            }
        }

        if vertex_size > 0 {
            layout.push_constant_ranges.push(PushConstantRange {
                stages: StageFlags::VERTEX,
                offset: 0,
                size: vertex_size,
            });
        }
        if fragment_size > 0 {
            layout.push_constant_ranges.push(PushConstantRange {
                stages: StageFlags::FRAGMENT,
                offset: vertex_size,
                size: fragment_size,
            });
        }

        Ok(layout)
    }
}

impl Default for LayoutResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "layout_resolver_tests.rs"]
mod tests;
