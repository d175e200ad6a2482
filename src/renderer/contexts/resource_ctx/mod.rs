pub mod constant_buffer;
pub mod geometry;
pub mod uploader;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::backend::desc::{DescriptorSource, SamplerDesc};
use crate::renderer::backend::{DescriptorAddress, HeapKind, RenderBackend, TextureHandle};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::resource_ctx::constant_buffer::ConstantBuffer;
use crate::renderer::contexts::resource_ctx::geometry::GeometryBuffers;
use crate::renderer::core::descriptor::DescriptorHeap;
use crate::renderer::core::state::Tracked;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::texture::TextureData;
use crate::renderer::shader_data::PerObjectData;
use crate::renderer::stage::InitStage;

/// Slot of the texture's shader resource view; object constant buffer views follow it
const TEXTURE_SLOT: u32 = 0;
const FIRST_OBJECT_SLOT: u32 = 1;
const SAMPLER_SLOT: u32 = 0;

/// Responsibilities:
/// - Own the geometry, texture and per-object constants
/// - Own the shader-visible descriptor heaps and the views written into them
pub struct RenderResourceContext {
    pub geometry: GeometryBuffers,
    pub constants: ConstantBuffer<PerObjectData>,
    pub texture: Tracked<TextureHandle>,
    pub cbv_srv_heap: DescriptorHeap,
    pub sampler_heap: DescriptorHeap,
}

impl RenderResourceContext {
    pub fn new<B: RenderBackend>(
        dev: &mut RenderDeviceContext<B>,
        mesh: &Mesh,
        texture: &TextureData,
        object_count: u32,
        sampler: SamplerDesc,
    ) -> Result<Self> {
        let backend = &mut dev.backend;

        let (
            mut cbv_srv_heap,
            mut sampler_heap,
        ) = Self::create_heaps(backend, object_count).wrap_err(InitStage::DescriptorHeaps)?;

        let geometry = GeometryBuffers::upload(backend, mesh).wrap_err(InitStage::Geometry)?;

        let texture = uploader::create_device_texture(
            backend,
            &mut dev.transfer,
            &mut dev.command_list,
            texture,
        )
            .and_then(|texture| {
                cbv_srv_heap.write(backend, TEXTURE_SLOT, &DescriptorSource::ShaderResource {
                    texture: texture.handle(),
                })?;
                sampler_heap.write(backend, SAMPLER_SLOT, &DescriptorSource::Sampler(sampler))?;
                Ok(texture)
            })
            .wrap_err(InitStage::Texture)?;

        let constants = ConstantBuffer::new(backend, object_count)
            .and_then(|constants| {
                for object in 0..object_count {
                    cbv_srv_heap.write(backend, FIRST_OBJECT_SLOT + object, &constants.view(object)?)?;
                }
                Ok(constants)
            })
            .wrap_err(InitStage::ConstantBuffer)?;

        Ok(Self {
            geometry,
            constants,
            texture,
            cbv_srv_heap,
            sampler_heap,
        })
    }

    pub fn texture_view(&self) -> Result<DescriptorAddress> {
        self.cbv_srv_heap.address(TEXTURE_SLOT)
    }

    pub fn sampler_view(&self) -> Result<DescriptorAddress> {
        self.sampler_heap.address(SAMPLER_SLOT)
    }

    pub fn object_view(&self, object: u32) -> Result<DescriptorAddress> {
        self.constants.slot_offset(object)?;
        self.cbv_srv_heap.address(FIRST_OBJECT_SLOT + object)
    }

    fn create_heaps<B: RenderBackend>(
        backend: &mut B,
        object_count: u32,
    ) -> Result<(DescriptorHeap, DescriptorHeap)> {
        let cbv_srv_heap = DescriptorHeap::new(backend, HeapKind::CbvSrv, FIRST_OBJECT_SLOT + object_count)?;
        let sampler_heap = DescriptorHeap::new(backend, HeapKind::Sampler, 1)?;
        Ok((cbv_srv_heap, sampler_heap))
    }
}
