pub mod target;
pub mod transfer_ctx;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::backend::{PipelineHandle, RenderBackend};
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::core::Extent;
use crate::renderer::core::command_list::CommandList;
use crate::renderer::core::fence::Fence;
use crate::renderer::stage::InitStage;

/// Responsibilities:
/// - Own the backend, and through it the device, queue and swapchain
/// - Record and submit the command list
/// - Own the frame fence
pub struct RenderDeviceContext<B: RenderBackend> {
    pub backend: B,
    pub target: RenderTarget,
    pub command_list: CommandList,
    pub frame_fence: Fence,
    pub transfer: TransferContext,
}

impl<B: RenderBackend> RenderDeviceContext<B> {
    pub fn new(mut backend: B, extent: Extent) -> Result<Self> {
        let adapter = backend.adapter();
        log::info!("Using {:?} adapter: {}", adapter.kind, adapter.name);

        let target = RenderTarget::new(&mut backend, extent).wrap_err(InitStage::Swapchain)?;
        let command_list = CommandList::new();
        let frame_fence = Fence::new(&mut backend).wrap_err(InitStage::Fence)?;
        let transfer = TransferContext::new(&mut backend).wrap_err(InitStage::Fence)?;

        Ok(Self {
            backend,
            target,
            command_list,
            frame_fence,
            transfer,
        })
    }

    /// Resets the allocator and opens the list. Only valid once the previous submission
    /// has been waited for.
    pub fn begin(&mut self, pipeline: Option<PipelineHandle>) -> Result<()> {
        self.backend.reset_command_allocator()?;
        self.command_list.reset(pipeline)
    }

    pub fn submit(&mut self) -> Result<()> {
        self.command_list.close()?;
        self.backend.execute(self.command_list.submission()?)
    }

    /// Blocks until every frame submitted so far finished on the GPU
    pub fn drain(&mut self) -> Result<()> {
        self.frame_fence.drain(&mut self.backend)?;
        self.transfer.drain(&mut self.backend)
    }
}
