use crate::renderer::backend::desc::SamplerDesc;

/// Which mesh every object draws
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum GeometryKind {
    #[default]
    Cube,
    Triangle,
}

/// Contains configuration options for the renderer like vsync, the clear color and the scene
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub vsync: bool,
    pub clear_color: [f32; 4],
    pub object_count: u32,
    pub geometry: GeometryKind,
    /// Requested number of back-buffers; the swapchain may adopt a different one
    pub back_buffer_count: u32,
    /// How the cube's texture is sampled
    pub sampler: SamplerDesc,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            clear_color: [0.1, 0.1, 0.3, 1.0],
            object_count: 1,
            geometry: GeometryKind::Cube,
            back_buffer_count: 2,
            sampler: SamplerDesc::default(),
        }
    }
}
