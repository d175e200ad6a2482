pub mod builder;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::backend::desc::{BindingCategory, BindingLayout, ShaderVisibility};
use crate::renderer::backend::{LayoutHandle, PipelineHandle, RenderBackend};
use crate::renderer::contexts::pipeline_ctx::builder::BuiltPipeline;
use crate::renderer::resources::vertex::Vertex;
use crate::renderer::stage::InitStage;

/// Responsibilities:
/// - Declare the binding layout shared by the shaders
/// - Compile the shaders and own the resulting pipeline
pub struct RenderPipelineContext {
    built: BuiltPipeline,
}

impl RenderPipelineContext {
    pub fn new<B: RenderBackend>(backend: &mut B, shader_source: &str) -> Result<Self> {
        let built = builder::build_pipeline(
            backend,
            &Vertex::input_layout(),
            shader_source,
            Self::binding_layout(),
        )
            .wrap_err(InitStage::Pipeline)?;

        Ok(Self { built })
    }

    /// Per-object constants for the vertex stage, the texture and its sampler for the pixel stage
    pub fn binding_layout() -> BindingLayout {
        BindingLayout::default()
            .with_table(BindingCategory::ConstantBuffer, ShaderVisibility::Vertex)
            .with_table(BindingCategory::ShaderResource, ShaderVisibility::Pixel)
            .with_table(BindingCategory::Sampler, ShaderVisibility::Pixel)
    }

    pub fn pipeline(&self) -> PipelineHandle {
        self.built.pipeline
    }

    pub fn layout(&self) -> LayoutHandle {
        self.built.layout
    }

    pub fn parameter_of(&self, category: BindingCategory) -> Option<u32> {
        self.built.binding_layout.parameter_of(category)
    }
}
