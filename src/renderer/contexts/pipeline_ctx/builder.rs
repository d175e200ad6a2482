use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr, eyre};
use crate::renderer::backend::desc::{
    BindingLayout, BlendState, DepthStencilState, InputElement, InputRate, PipelineDesc,
    RasterizerState, TextureFormat,
};
use crate::renderer::backend::{LayoutHandle, PipelineHandle, RenderBackend};
use crate::renderer::resources::shader::{ParsedShader, ShaderProfile};

/// Immutable pipeline together with the binding layout it was built against
#[derive(Debug, Clone)]
pub struct BuiltPipeline {
    pub pipeline: PipelineHandle,
    pub layout: LayoutHandle,
    pub binding_layout: BindingLayout,
}

const VERTEX_ENTRY: &str = "vs_main";
const PIXEL_ENTRY: &str = "ps_main";

pub struct PipelineBuilder<'a> {
    shader_source: Option<&'a str>,
    vertex_profile: &'a str,
    pixel_profile: &'a str,
    input_layout: Vec<InputElement>,
    binding_layout: Option<BindingLayout>,
    render_target_format: Option<TextureFormat>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            shader_source: None,
            vertex_profile: "vs_1_3",
            pixel_profile: "ps_1_3",
            input_layout: Vec::new(),
            binding_layout: None,
            render_target_format: None,
        }
    }

    pub fn with_shader_source(mut self, source: &'a str) -> Self {
        let _ = self.shader_source.replace(source);
        self
    }

    pub fn with_profiles(mut self, vertex: &'a str, pixel: &'a str) -> Self {
        self.vertex_profile = vertex;
        self.pixel_profile = pixel;
        self
    }

    pub fn with_input_layout(mut self, layout: &[InputElement]) -> Self {
        self.input_layout = layout.to_vec();
        self
    }

    pub fn with_binding_layout(mut self, layout: BindingLayout) -> Self {
        let _ = self.binding_layout.replace(layout);
        self
    }

    pub fn with_render_target_format(mut self, format: TextureFormat) -> Self {
        let _ = self.render_target_format.replace(format);
        self
    }

    /// Compiles both stages and creates the pipeline. Everything that can be checked
    /// without the GPU is checked before the first backend call.
    pub fn build<B: RenderBackend>(self, backend: &mut B) -> Result<BuiltPipeline> {
        let source = self
            .shader_source
            .ok_or_eyre("No shader source provided for PipelineBuilder")?;
        let binding_layout = self
            .binding_layout
            .ok_or_eyre("No binding layout provided for PipelineBuilder")?;
        let render_target_format = self
            .render_target_format
            .ok_or_eyre("No render target format provided for PipelineBuilder")?;
        if self.input_layout.is_empty() {
            return Err(eyre!("No input layout provided for PipelineBuilder"));
        }
        if let Some(element) = self.input_layout.iter().find(|element| element.rate != InputRate::PerVertex) {
            return Err(eyre!("Input element {} is per-instance, only per-vertex data is bound", element.semantic));
        }

        let vertex_profile: ShaderProfile = self.vertex_profile.parse()?;
        let pixel_profile: ShaderProfile = self.pixel_profile.parse()?;

        let shader = ParsedShader::parse(source)?;
        shader.check_bindings(&binding_layout)?;

        let expected = (0..self.input_layout.len() as u32).collect::<Vec<_>>();
        let locations = shader.vertex_input_locations(VERTEX_ENTRY)?;
        if locations != expected {
            return Err(eyre!(
                "Vertex shader reads locations {:?} but the input layout provides {:?}",
                locations,
                self.input_layout.iter().map(|element| element.semantic).collect::<Vec<_>>(),
            ));
        }

        let vertex_shader = shader
            .compile(VERTEX_ENTRY, vertex_profile)
            .wrap_err("Failed to compile the vertex stage")?;
        let pixel_shader = shader
            .compile(PIXEL_ENTRY, pixel_profile)
            .wrap_err("Failed to compile the pixel stage")?;

        let layout = backend.create_binding_layout(&binding_layout)?;
        let pipeline = backend.create_pipeline(&PipelineDesc {
            layout,
            vertex_shader: &vertex_shader,
            pixel_shader: &pixel_shader,
            input_layout: &self.input_layout,
            rasterizer: RasterizerState::default(),
            blend: BlendState::default(),
            depth_stencil: DepthStencilState::default(),
            render_target_format,
        })?;

        Ok(BuiltPipeline {
            pipeline,
            layout,
            binding_layout,
        })
    }
}

/// Pipeline drawing the back buffer's format with back-face culling, no blending and no depth
pub fn build_pipeline<B: RenderBackend>(
    backend: &mut B,
    input_layout: &[InputElement],
    shader_source: &str,
    binding_layout: BindingLayout,
) -> Result<BuiltPipeline> {
    let format = backend.back_buffer_format();
    PipelineBuilder::new()
        .with_shader_source(shader_source)
        .with_input_layout(input_layout)
        .with_binding_layout(binding_layout)
        .with_render_target_format(format)
        .build(backend)
}
