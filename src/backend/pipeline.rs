// Graphics pipeline creation
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: shaders, rasterization, blending, and the render pass the
// pipeline writes into. Viewport and scissor are dynamic and set at draw time.

use anyhow::{Context as _, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;

use super::shader::{ShaderModule, ShaderStage};
use super::Device;
use crate::error::rejected;

/// Collects shader stages and the output format, then builds a [`Pipeline`].
///
/// The builder's shader modules are released when `build` returns, whether
/// it succeeded or not.
pub struct PipelineBuilder {
    device: Arc<Device>,
    vertex: Option<ShaderModule>,
    fragment: Option<ShaderModule>,
    output_format: vk::Format,
}

impl PipelineBuilder {
    pub fn new(device: &Arc<Device>) -> Self {
        Self {
            device: device.clone(),
            vertex: None,
            fragment: None,
            output_format: vk::Format::UNDEFINED,
        }
    }

    /// Load and compile the SPIR-V file at `path` for `stage`. A second call
    /// for the same stage replaces (and releases) the earlier module.
    pub fn add_shader_stage(&mut self, stage: ShaderStage, path: impl AsRef<Path>) -> Result<&mut Self> {
        let module = ShaderModule::from_file(&self.device, stage, path.as_ref())?;
        match stage {
            ShaderStage::Vertex => self.vertex = Some(module),
            ShaderStage::Fragment => self.fragment = Some(module),
        }
        Ok(self)
    }

    /// Color format the render pass will target.
    pub fn set_output_format(&mut self, format: vk::Format) -> &mut Self {
        self.output_format = format;
        self
    }

    /// # Panics
    /// If either shader stage is missing or no output format was set. Both
    /// are checked before any Vulkan object is created.
    pub fn build(self) -> Result<Arc<Pipeline>> {
        let (vertex, fragment, format) = require_ready(
            self.vertex.as_ref().map(|m| m.module),
            self.fragment.as_ref().map(|m| m.module),
            self.output_format,
        );

        log::info!("Building graphics pipeline for {:?}", format);

        // Each step stores its handle right away so a later failure still
        // releases what exists.
        let mut pipeline = Pipeline {
            pipeline: vk::Pipeline::null(),
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            format,
            device: self.device.clone(),
        };

        pipeline.layout = create_pipeline_layout(&self.device)?;
        pipeline.render_pass = create_render_pass(&self.device, format)?;
        pipeline.pipeline = create_graphics_pipeline(
            &self.device,
            pipeline.render_pass,
            pipeline.layout,
            vertex,
            fragment,
        )?;

        Ok(Arc::new(pipeline))
    }
}

/// Precondition check for [`PipelineBuilder::build`].
fn require_ready(
    vertex: Option<vk::ShaderModule>,
    fragment: Option<vk::ShaderModule>,
    format: vk::Format,
) -> (vk::ShaderModule, vk::ShaderModule, vk::Format) {
    let vertex = vertex.expect("pipeline build requires a vertex shader stage");
    let fragment = fragment.expect("pipeline build requires a fragment shader stage");
    assert_ne!(
        format,
        vk::Format::UNDEFINED,
        "pipeline build requires an output format"
    );
    (vertex, fragment, format)
}

/// An immutable graphics pipeline with its layout and render pass.
pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub format: vk::Format,
    device: Arc<Device>,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        log::debug!("Destroying graphics pipeline...");
        // Destroying a null handle is a no-op, which covers partial builds
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_render_pass(self.render_pass, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Empty layout: no descriptor sets, no push constants
fn create_pipeline_layout(device: &Device) -> Result<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder();

    let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
        .map_err(rejected("vkCreatePipelineLayout"))?;
    Ok(layout)
}

/// Single subpass with one color attachment (the swapchain image)
fn create_render_pass(device: &Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [color_attachment(format)];

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .build();
    let subpasses = [subpass];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses);

    let render_pass = unsafe { device.device.create_render_pass(&render_pass_info, None) }
        .map_err(rejected("vkCreateRenderPass"))?;
    Ok(render_pass)
}

fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Alpha-over compositing: src*srcA + dst*(1-srcA) for color, src*1 + dst*0
/// for alpha.
fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()
}

const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

fn create_graphics_pipeline(
    device: &Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    // Shader stages
    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(ShaderStage::Vertex.flags())
        .module(vert_shader)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(ShaderStage::Fragment.flags())
        .module(frag_shader)
        .name(entry_point)
        .build();

    let shader_stages = [vert_stage, frag_stage];

    // No vertex buffers: positions come from the shader
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // One viewport and one scissor, both dynamic
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

    // Rasterization
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    // Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachments = [alpha_blend_attachment()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    // No depth/stencil state: the render pass has no depth attachment
    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| rejected("vkCreateGraphicsPipelines")(e))
    .context("Failed to create graphics pipeline")?;

    Ok(pipelines[0])
}
