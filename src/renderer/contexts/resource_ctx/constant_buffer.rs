use std::marker::PhantomData;
use bytemuck::Pod;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::backend::desc::{BufferUsage, DescriptorSource};
use crate::renderer::backend::{BufferHandle, RenderBackend};
use crate::renderer::core::state::{ResourceState, Tracked};
use crate::renderer::util;

/// Constant buffer view offsets must be aligned to at least this many bytes
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Persistently mapped upload buffer holding one `T` per slot, slots padded to the
/// constant buffer alignment
pub struct ConstantBuffer<T> {
    buffer: Tracked<BufferHandle>,
    slot_count: u32,
    stride: u64,
    _marker: PhantomData<T>,
}

impl<T: Pod> ConstantBuffer<T> {
    pub fn new<B: RenderBackend>(backend: &mut B, slot_count: u32) -> Result<Self> {
        if slot_count == 0 {
            return Err(eyre!("Constant buffer needs at least one slot"));
        }

        let alignment = CONSTANT_BUFFER_ALIGNMENT.max(backend.min_constant_buffer_alignment());
        let stride = util::align_up(size_of::<T>() as u64, alignment);
        let handle = backend.create_upload_buffer(stride * slot_count as u64, BufferUsage::Constant)?;

        Ok(Self {
            buffer: Tracked::new(handle, ResourceState::GenericRead),
            slot_count,
            stride,
            _marker: PhantomData,
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer.handle()
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn slot_offset(&self, slot: u32) -> Result<u64> {
        if slot >= self.slot_count {
            return Err(eyre!(
                "Constant buffer slot {} out of range ({} slots)",
                slot,
                self.slot_count,
            ));
        }
        Ok(slot as u64 * self.stride)
    }

    pub fn write<B: RenderBackend>(&self, backend: &mut B, slot: u32, value: &T) -> Result<()> {
        self.write_bytes(backend, slot, bytemuck::bytes_of(value))
    }

    pub fn write_bytes<B: RenderBackend>(&self, backend: &mut B, slot: u32, bytes: &[u8]) -> Result<()> {
        let offset = self.slot_offset(slot)?;
        if bytes.len() as u64 > self.stride {
            return Err(eyre!(
                "{} bytes do not fit a constant buffer slot of {}",
                bytes.len(),
                self.stride,
            ));
        }
        backend.write_buffer(self.buffer.handle(), offset, bytes)
    }

    /// Constant buffer view covering one slot
    pub fn view(&self, slot: u32) -> Result<DescriptorSource> {
        Ok(DescriptorSource::ConstantBuffer {
            buffer: self.buffer.handle(),
            offset: self.slot_offset(slot)?,
            size: self.stride,
        })
    }
}
