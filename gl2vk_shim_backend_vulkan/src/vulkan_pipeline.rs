/// Pipeline - immutable graphics pipeline built from a frozen layout

use ash::vk;
use gl2vk_shim::gl2vk::backend::PipelineDesc;
use gl2vk_shim::gl2vk::layout::ShaderKind;
use gl2vk_shim::gl2vk::Result;
use gl2vk_shim::shim_err;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{stage_flags_to_vk, vertex_format_to_vk};

/// Vulkan pipeline and its layout
pub(crate) struct Pipeline {
    /// Vulkan graphics pipeline
    pub(crate) pipeline: vk::Pipeline,
    /// Pipeline layout (push constants are recorded against it)
    pub(crate) pipeline_layout: vk::PipelineLayout,
    /// Vulkan device (for cleanup)
    device: ash::Device,
}

impl Pipeline {
    /// Compile both stages and create the pipeline
    ///
    /// Viewport and scissor are baked from the swapchain extent; the
    /// topology is always a triangle list.
    pub(crate) fn create(ctx: &VulkanContext, desc: &PipelineDesc) -> Result<Self> {
        let vertex_code = (ctx.shader_compiler)(ShaderKind::Vertex, desc.vertex_source)?;
        let fragment_code = (ctx.shader_compiler)(ShaderKind::Fragment, desc.fragment_source)?;

        unsafe {
            let vertex_module = create_shader_module(&ctx.device, &vertex_code)?;
            let fragment_module = match create_shader_module(&ctx.device, &fragment_code) {
                Ok(module) => module,
                Err(e) => {
                    ctx.device.destroy_shader_module(vertex_module, None);
                    return Err(e);
                }
            };

            let result = Self::create_with_modules(ctx, desc, vertex_module, fragment_module);

            // Modules are only needed during pipeline creation
            ctx.device.destroy_shader_module(vertex_module, None);
            ctx.device.destroy_shader_module(fragment_module, None);

            result
        }
    }

    unsafe fn create_with_modules(
        ctx: &VulkanContext,
        desc: &PipelineDesc,
        vertex_module: vk::ShaderModule,
        fragment_module: vk::ShaderModule,
    ) -> Result<Self> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(c"main"),
        ];

        // Vertex input state
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc.layout.bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc.layout.attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: vertex_format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport state (static, full swapchain extent)
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: ctx.extent.width as f32,
            height: ctx.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: ctx.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        // Pipeline layout with push constants
        let push_constant_ranges: Vec<vk::PushConstantRange> = desc.layout.push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: stage_flags_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let mut layout_create_info = vk::PipelineLayoutCreateInfo::default();
        if !push_constant_ranges.is_empty() {
            layout_create_info = layout_create_info.push_constant_ranges(&push_constant_ranges);
        }

        let pipeline_layout = ctx.device.create_pipeline_layout(&layout_create_info, None)
            .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to create pipeline layout: {:?}", e))?;

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .layout(pipeline_layout)
            .render_pass(ctx.render_pass)
            .subpass(0);

        let pipelines = match ctx.device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_create_info],
            None,
        ) {
            Ok(pipelines) => pipelines,
            Err((_, e)) => {
                ctx.device.destroy_pipeline_layout(pipeline_layout, None);
                return Err(shim_err!("gl2vk::vulkan", "Failed to create graphics pipeline: {:?}", e));
            }
        };

        let Some(&pipeline) = pipelines.first() else {
            ctx.device.destroy_pipeline_layout(pipeline_layout, None);
            return Err(shim_err!("gl2vk::vulkan", "Driver returned no graphics pipeline"));
        };

        Ok(Self {
            pipeline,
            pipeline_layout,
            device: ctx.device.clone(),
        })
    }
}

unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    device.create_shader_module(&create_info, None)
        .map_err(|e| shim_err!("gl2vk::vulkan", "Failed to create shader module: {:?}", e))
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
