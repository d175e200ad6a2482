use std::ffi::CString;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use smallvec::SmallVec;
use crate::renderer::backend::desc::{BindingCategory, BindingLayout, DescriptorSource, PipelineDesc};
use crate::renderer::backend::vulkan::translate;
use crate::renderer::resources::shader::CompiledShader;

/// A binding layout realized as one descriptor set layout (set 0, binding = parameter index),
/// its pipeline layout and the single descriptor set the renderer writes into
pub struct VulkanBindingLayout {
    pub set_layout: vk::DescriptorSetLayout,
    pub pipeline_layout: vk::PipelineLayout,
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
    pub layout: BindingLayout,
    /// What each binding of `set` currently points at
    pub written: Vec<Option<DescriptorSource>>,
}

impl VulkanBindingLayout {
    pub fn new(layout: &BindingLayout, device: &ash::Device) -> Result<Self> {
        let bindings = layout
            .parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(index as u32)
                    .descriptor_type(translate::descriptor_type(parameter.category))
                    .descriptor_count(1)
                    .stage_flags(translate::shader_stages(parameter.visibility))
            })
            .collect::<SmallVec<[_; 4]>>();

        let set_layout = unsafe {
            let info = vk::DescriptorSetLayoutCreateInfo::default()
                .bindings(&bindings);
            device.create_descriptor_set_layout(&info, None)?
        };

        let set_layouts = [set_layout];
        let pipeline_layout = unsafe {
            let info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts);
            device.create_pipeline_layout(&info, None)?
        };

        let mut pool_sizes = SmallVec::<[vk::DescriptorPoolSize; 3]>::new();
        for parameter in &layout.parameters {
            let ty = translate::descriptor_type(parameter.category);
            match pool_sizes.iter_mut().find(|size| size.ty == ty) {
                Some(size) => size.descriptor_count += 1,
                None => pool_sizes.push(vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: 1,
                }),
            }
        }

        let pool = unsafe {
            let info = vk::DescriptorPoolCreateInfo::default()
                .max_sets(1)
                .pool_sizes(&pool_sizes);
            device.create_descriptor_pool(&info, None)?
        };
        let set = unsafe {
            let info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&set_layouts);
            device.allocate_descriptor_sets(&info)?[0]
        };

        Ok(Self {
            set_layout,
            pipeline_layout,
            pool,
            set,
            layout: layout.clone(),
            written: vec![None; layout.parameters.len()],
        })
    }

    pub fn category_of(&self, parameter: u32) -> Result<BindingCategory> {
        self.layout
            .parameters
            .get(parameter as usize)
            .map(|parameter| parameter.category)
            .ok_or_else(|| eyre!("Binding layout has no parameter {}", parameter))
    }

    /// Number of dynamic offsets `cmd_bind_descriptor_sets` expects, one per constant table
    pub fn dynamic_offset_count(&self) -> usize {
        self.layout
            .parameters
            .iter()
            .filter(|parameter| parameter.category == BindingCategory::ConstantBuffer)
            .count()
    }

    /// Position of `parameter` among the dynamic offsets. Offsets are ordered by binding.
    pub fn dynamic_offset_index(&self, parameter: u32) -> usize {
        self.layout
            .parameters
            .iter()
            .take(parameter as usize)
            .filter(|parameter| parameter.category == BindingCategory::ConstantBuffer)
            .count()
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

/// Creates a graphics pipeline rendering into a single color attachment with dynamic
/// rendering. Viewport and scissor are dynamic state.
pub fn create_graphics_pipeline(
    desc: &PipelineDesc,
    pipeline_layout: vk::PipelineLayout,
    device: &ash::Device,
) -> Result<vk::Pipeline> {
    let vertex_module = create_shader_module(desc.vertex_shader, device)?;
    let pixel_module = match create_shader_module(desc.pixel_shader, device) {
        Ok(module) => module,
        Err(err) => {
            unsafe { device.destroy_shader_module(vertex_module, None) };
            return Err(err);
        }
    };

    let result = build_pipeline(desc, pipeline_layout, vertex_module, pixel_module, device);

    unsafe {
        device.destroy_shader_module(vertex_module, None);
        device.destroy_shader_module(pixel_module, None);
    }
    result
}

fn build_pipeline(
    desc: &PipelineDesc,
    pipeline_layout: vk::PipelineLayout,
    vertex_module: vk::ShaderModule,
    pixel_module: vk::ShaderModule,
    device: &ash::Device,
) -> Result<vk::Pipeline> {
    let vertex_entry = CString::new(desc.vertex_shader.entry_point.as_str())?;
    let pixel_entry = CString::new(desc.pixel_shader.entry_point.as_str())?;
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(&vertex_entry),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(pixel_module)
            .name(&pixel_entry),
    ];

    // One interleaved vertex buffer, attribute locations follow the input layout order
    let bindings = [
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_stride(),
            input_rate: vk::VertexInputRate::VERTEX,
        },
    ];
    let attributes = desc
        .input_layout
        .iter()
        .enumerate()
        .map(|(location, element)| vk::VertexInputAttributeDescription {
            location: location as u32,
            binding: 0,
            format: translate::vertex_format(element.format),
            offset: element.offset,
        })
        .collect::<SmallVec<[_; 4]>>();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(translate::cull_mode(&desc.rasterizer))
        .front_face(translate::front_face(&desc.rasterizer))
        .depth_bias_enable(false);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        // 1 sample per pixel means no multisampling
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .min_sample_shading(1.0);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_stencil.depth_test)
        .depth_write_enable(desc.depth_stencil.depth_write)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .stencil_test_enable(false);

    let color_blend_attachments = [
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.blend.enabled)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD),
    ];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&color_blend_attachments);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    // Use dynamic state for viewport and scissor configuration
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
        .dynamic_states(&dynamic_states);

    let color_attachment_formats = [translate::texture_format(desc.render_target_format)];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_attachment_formats);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .push_next(&mut rendering_info)
        .stages(&shader_stages)
        .layout(pipeline_layout)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .depth_stencil_state(&depth_stencil)
        .dynamic_state(&dynamic_info);

    let pipelines = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, err)| eyre!("Failed to create graphics pipeline: {}", err))?
    };
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| eyre!("Driver returned no graphics pipeline"))
}

fn create_shader_module(shader: &CompiledShader, device: &ash::Device) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(&shader.words);
    Ok(unsafe { device.create_shader_module(&info, None)? })
}
