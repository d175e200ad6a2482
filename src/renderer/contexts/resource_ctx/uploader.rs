use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::backend::desc::BufferUsage;
use crate::renderer::backend::{BufferHandle, RenderBackend, TextureHandle};
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::core::command_list::{Command, CommandList};
use crate::renderer::core::state::{ResourceState, Tracked};
use crate::renderer::resources::texture::TextureData;

/// Allocates CPU-writable, GPU-readable memory and fills it with `data`
pub fn create_upload_buffer<B: RenderBackend>(
    backend: &mut B,
    data: &[u8],
    usage: BufferUsage,
) -> Result<Tracked<BufferHandle>> {
    let buffer = backend.create_upload_buffer(data.len() as u64, usage)?;
    backend.write_buffer(buffer, 0, data)?;
    Ok(Tracked::new(buffer, ResourceState::GenericRead))
}

/// Copies `data` into device-local memory and leaves the texture readable by pixel shaders.
///
/// Blocks until the GPU finished the copy, after which the staging buffer is released.
pub fn create_device_texture<B: RenderBackend>(
    backend: &mut B,
    transfer: &mut TransferContext,
    list: &mut CommandList,
    data: &TextureData,
) -> Result<Tracked<TextureHandle>> {
    data.validate()?;

    let handle = backend.create_texture(&data.desc())?;
    let mut texture = Tracked::new(handle, ResourceState::CopyDest);
    let staging = create_upload_buffer(backend, &data.pixels, BufferUsage::Staging)
        .wrap_err("Failed to allocate the texture staging buffer")?;

    transfer.immediate_submit(backend, list, |list| {
        list.record(Command::CopyBufferToTexture {
            buffer: staging.handle(),
            texture: handle,
            extent: data.extent,
            row_pitch: data.row_pitch,
        })?;
        list.record_barrier(texture.transition_to(ResourceState::PixelShaderResource))
    })?;

    backend.destroy_buffer(staging.handle())?;
    log::info!("Uploaded {} texture", data.extent);
    Ok(texture)
}
