use std::fmt;

/// Initialization step that failed, attached to startup errors so the report names it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InitStage {
    Device,
    Queue,
    Swapchain,
    DescriptorHeaps,
    Commands,
    Fence,
    Pipeline,
    Geometry,
    Texture,
    ConstantBuffer,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Device => "device creation",
            Self::Queue => "command queue creation",
            Self::Swapchain => "swapchain creation",
            Self::DescriptorHeaps => "descriptor heap creation",
            Self::Commands => "command allocator creation",
            Self::Fence => "fence creation",
            Self::Pipeline => "pipeline creation",
            Self::Geometry => "geometry upload",
            Self::Texture => "texture upload",
            Self::ConstantBuffer => "constant buffer creation",
        };
        write!(f, "Renderer initialization failed during {}", stage)
    }
}
