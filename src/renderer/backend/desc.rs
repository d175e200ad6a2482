use crate::renderer::backend::{BufferHandle, HeapKind, LayoutHandle, TextureHandle};
use crate::renderer::core::Extent;
use crate::renderer::resources::shader::CompiledShader;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub extent: Extent,
    pub format: TextureFormat,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Constant,
    /// Source of a buffer-to-texture copy
    Staging,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_mode: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
        }
    }
}

/// What a descriptor written into a heap slot describes
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DescriptorSource {
    RenderTarget { back_buffer: usize },
    ConstantBuffer { buffer: BufferHandle, offset: u64, size: u64 },
    ShaderResource { texture: TextureHandle },
    Sampler(SamplerDesc),
}

impl DescriptorSource {
    /// Kind of heap this descriptor can be written into
    pub fn heap_kind(&self) -> HeapKind {
        match self {
            Self::RenderTarget { .. } => HeapKind::RenderTarget,
            Self::ConstantBuffer { .. } | Self::ShaderResource { .. } => HeapKind::CbvSrv,
            Self::Sampler(_) => HeapKind::Sampler,
        }
    }
}

/// Resource category a descriptor table exposes to shaders
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BindingCategory {
    ConstantBuffer,
    ShaderResource,
    Sampler,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderVisibility {
    Vertex,
    Pixel,
    /// Both stages
    All,
}

impl ShaderVisibility {
    pub fn includes(&self, stage: ShaderVisibility) -> bool {
        *self == Self::All || *self == stage
    }
}

/// One descriptor table of a binding layout. The table's position in the layout is the
/// parameter index used when binding it, and the binding slot shaders declare for it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindingParameter {
    pub category: BindingCategory,
    pub visibility: ShaderVisibility,
}

/// Maps shader-visible resources to descriptor tables (a "root signature")
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingLayout {
    pub parameters: Vec<BindingParameter>,
}

impl BindingLayout {
    pub fn with_table(mut self, category: BindingCategory, visibility: ShaderVisibility) -> Self {
        self.parameters.push(BindingParameter {
            category,
            visibility,
        });
        self
    }

    /// Index of the first table holding `category`
    pub fn parameter_of(&self, category: BindingCategory) -> Option<u32> {
        self.parameters
            .iter()
            .position(|parameter| parameter.category == category)
            .map(|index| index as u32)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u32 {
        match self {
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InputRate {
    PerVertex,
    /// Advances once per instance. Rejected by the pipeline builder.
    PerInstance,
}

/// One attribute of the interleaved vertex buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic: &'static str,
    pub format: VertexFormat,
    pub offset: u32,
    pub rate: InputRate,
}

/// Triangle lists are always filled
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub cull_back_faces: bool,
    pub front_counter_clockwise: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_back_faces: true,
            front_counter_clockwise: true,
        }
    }
}

/// Alpha blending of the output color
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
}

pub struct PipelineDesc<'a> {
    pub layout: LayoutHandle,
    pub vertex_shader: &'a CompiledShader,
    pub pixel_shader: &'a CompiledShader,
    pub input_layout: &'a [InputElement],
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub render_target_format: TextureFormat,
}

impl PipelineDesc<'_> {
    /// Byte distance between two vertices, derived from the element layout
    pub fn vertex_stride(&self) -> u32 {
        self.input_layout
            .iter()
            .map(|element| element.offset + element.format.size())
            .max()
            .unwrap_or(0)
    }
}
