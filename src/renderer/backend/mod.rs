//! The GPU seam of the renderer. Everything above this trait is plain bookkeeping that can
//! be exercised without a GPU; everything below it issues real API calls.

pub mod desc;
pub mod vulkan;

#[cfg(test)]
pub mod mock;

use color_eyre::Result;
use crate::renderer::backend::desc::{
    BindingLayout, BufferUsage, DescriptorSource, PipelineDesc, TextureDesc, TextureFormat,
};
use crate::renderer::core::Extent;
use crate::renderer::core::adapter::AdapterInfo;
use crate::renderer::core::command_list::Command;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FenceHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeapHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LayoutHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u32);

/// What a descriptor heap holds
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeapKind {
    RenderTarget,
    /// Shader-visible constant buffer and shader resource views
    CbvSrv,
    /// Shader-visible samplers
    Sampler,
}

/// Location of one descriptor: a heap plus a byte offset from its start
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorAddress {
    pub heap: HeapHandle,
    pub offset: u64,
}

/// Operations the renderer needs from a GPU API.
///
/// Contracts shared by all implementations:
/// - `execute` only receives closed command lists.
/// - `reset_command_allocator` is only called once the GPU finished everything submitted.
/// - `release_back_buffers`/`resize_back_buffers` are only called after a full fence drain.
/// - `create_texture` returns a texture in the `CopyDest` state.
/// - `create_upload_buffer` returns a buffer in the `GenericRead` state whose memory stays
///   mapped for its whole lifetime.
pub trait RenderBackend {
    fn adapter(&self) -> &AdapterInfo;

    fn back_buffer_count(&self) -> usize;
    fn back_buffer_format(&self) -> TextureFormat;
    /// Index of the back-buffer that may be rendered into next.
    /// Only valid after creation, a resize or a present. `None` while the surface has no
    /// area, e.g. when the window got minimized between two frames.
    fn current_back_buffer_index(&mut self) -> Result<Option<usize>>;
    fn release_back_buffers(&mut self) -> Result<()>;
    fn resize_back_buffers(&mut self, extent: Extent) -> Result<()>;
    fn present(&mut self) -> Result<()>;

    /// Distance in bytes between two consecutive slots of a heap of this kind
    fn descriptor_stride(&self, kind: HeapKind) -> u64;
    fn create_descriptor_heap(&mut self, kind: HeapKind, capacity: u32) -> Result<HeapHandle>;
    fn write_descriptor(&mut self, dest: DescriptorAddress, source: &DescriptorSource) -> Result<()>;

    fn create_fence(&mut self, initial_value: u64) -> Result<FenceHandle>;
    /// Enqueues a signal of `value` on the queue, after all previously submitted work
    fn signal(&mut self, fence: FenceHandle, value: u64) -> Result<()>;
    fn completed_value(&self, fence: FenceHandle) -> Result<u64>;
    /// Blocks the calling thread until the fence reaches `value`
    fn wait_for_value(&mut self, fence: FenceHandle, value: u64) -> Result<()>;

    fn reset_command_allocator(&mut self) -> Result<()>;
    fn execute(&mut self, commands: &[Command]) -> Result<()>;

    /// Minimum alignment of a constant buffer view's offset
    fn min_constant_buffer_alignment(&self) -> u64;
    fn create_upload_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferHandle>;
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;
    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()>;
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle>;

    fn create_binding_layout(&mut self, layout: &BindingLayout) -> Result<LayoutHandle>;
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle>;
}
