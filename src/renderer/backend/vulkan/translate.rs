use ash::vk;
use crate::renderer::backend::desc::{
    AddressMode, BindingCategory, BufferUsage, Filter, RasterizerState, SamplerDesc,
    ShaderVisibility, TextureFormat, VertexFormat,
};
use crate::renderer::core::command_list::{ScissorRect, Viewport};
use crate::renderer::core::state::ResourceState;

pub fn texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
    }
}

pub fn surface_format(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::Rgba8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::Rgba8UnormSrgb),
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::Bgra8Unorm),
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::Bgra8UnormSrgb),
        _ => None,
    }
}

pub fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
    }
}

pub fn descriptor_type(category: BindingCategory) -> vk::DescriptorType {
    match category {
        // Every object reads the same buffer at a different offset
        BindingCategory::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        BindingCategory::ShaderResource => vk::DescriptorType::SAMPLED_IMAGE,
        BindingCategory::Sampler => vk::DescriptorType::SAMPLER,
    }
}

pub fn shader_stages(visibility: ShaderVisibility) -> vk::ShaderStageFlags {
    match visibility {
        ShaderVisibility::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderVisibility::Pixel => vk::ShaderStageFlags::FRAGMENT,
        ShaderVisibility::All => vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
    }
}

pub fn cull_mode(rasterizer: &RasterizerState) -> vk::CullModeFlags {
    if rasterizer.cull_back_faces {
        vk::CullModeFlags::BACK
    } else {
        vk::CullModeFlags::NONE
    }
}

pub fn front_face(rasterizer: &RasterizerState) -> vk::FrontFace {
    if rasterizer.front_counter_clockwise {
        vk::FrontFace::COUNTER_CLOCKWISE
    } else {
        vk::FrontFace::CLOCKWISE
    }
}

pub fn sampler_info(desc: &SamplerDesc) -> vk::SamplerCreateInfo<'static> {
    let filter = match desc.filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    };
    let mipmap_mode = match desc.filter {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    };
    let address_mode = match desc.address_mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
    };

    vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .mipmap_mode(mipmap_mode)
        .address_mode_u(address_mode)
        .address_mode_v(address_mode)
        .address_mode_w(address_mode)
        .max_lod(vk::LOD_CLAMP_NONE)
}

/// Layout an image must be in for `state`. Leaving `Present` or `Common` discards the
/// contents, which every frame overwrites with a clear anyway.
pub fn image_layout(state: ResourceState, as_source: bool) -> vk::ImageLayout {
    match state {
        ResourceState::Common | ResourceState::GenericRead => vk::ImageLayout::UNDEFINED,
        ResourceState::Present if as_source => vk::ImageLayout::UNDEFINED,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::PixelShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

/// Pipeline stages and accesses that touch a resource in `state`
pub fn stage_and_access(state: ResourceState, as_source: bool) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match state {
        ResourceState::Common | ResourceState::Present if as_source => {
            (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty())
        }
        ResourceState::Common | ResourceState::Present => {
            (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty())
        }
        ResourceState::GenericRead => (vk::PipelineStageFlags::HOST, vk::AccessFlags::HOST_WRITE),
        ResourceState::CopyDest => (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
        ResourceState::RenderTarget => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        ResourceState::PixelShaderResource => {
            (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ)
        }
    }
}

pub fn viewport(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub fn scissor(rect: &ScissorRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.left,
            y: rect.top,
        },
        extent: vk::Extent2D {
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
        },
    }
}

pub fn present_mode(vsync: bool, supported: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| supported.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::Extent;

    #[test]
    fn present_as_source_discards_contents() {
        assert_eq!(image_layout(ResourceState::Present, true), vk::ImageLayout::UNDEFINED);
        assert_eq!(image_layout(ResourceState::Present, false), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            image_layout(ResourceState::RenderTarget, true),
            image_layout(ResourceState::RenderTarget, false),
        );
    }

    #[test]
    fn upload_states_wait_on_transfers() {
        let (stage, access) = stage_and_access(ResourceState::CopyDest, true);
        assert_eq!(stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(access, vk::AccessFlags::TRANSFER_WRITE);

        let (stage, access) = stage_and_access(ResourceState::PixelShaderResource, false);
        assert_eq!(stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn scissor_covers_the_viewport() {
        let extent = Extent::new(640, 480);
        let rect = scissor(&ScissorRect::covering(extent));
        assert_eq!(rect.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(rect.extent, vk::Extent2D { width: 640, height: 480 });

        let view = viewport(&Viewport::covering(extent));
        assert_eq!((view.width, view.height, view.max_depth), (640.0, 480.0, 1.0));
    }

    #[test]
    fn vsync_always_uses_fifo() {
        let all = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(present_mode(true, &all), vk::PresentModeKHR::FIFO);
        assert_eq!(present_mode(false, &all), vk::PresentModeKHR::MAILBOX);
        assert_eq!(present_mode(false, &[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn float_surfaces_are_not_supported() {
        assert_eq!(surface_format(vk::Format::R16G16B16A16_SFLOAT), None);
        assert_eq!(surface_format(vk::Format::B8G8R8A8_UNORM), Some(TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn constant_tables_are_dynamic_uniforms() {
        assert_eq!(descriptor_type(BindingCategory::ConstantBuffer), vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
        assert_eq!(shader_stages(ShaderVisibility::Pixel), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(shader_stages(ShaderVisibility::All), vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn nearest_sampling_clamps_without_mip_blending() {
        let info = sampler_info(&SamplerDesc {
            filter: Filter::Nearest,
            address_mode: AddressMode::ClampToEdge,
        });
        assert_eq!((info.mag_filter, info.min_filter), (vk::Filter::NEAREST, vk::Filter::NEAREST));
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);

        let info = sampler_info(&SamplerDesc::default());
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::REPEAT);
    }
}
