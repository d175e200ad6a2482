use color_eyre::Result;
use crate::renderer::backend::RenderBackend;
use crate::renderer::core::command_list::CommandList;
use crate::renderer::core::fence::Fence;

/// One-off GPU work outside of the frame loop, e.g. texture uploads. Waits on its own fence
/// so the frame fence keeps counting frames only.
pub struct TransferContext {
    fence: Fence,
}

impl TransferContext {
    pub fn new<B: RenderBackend>(backend: &mut B) -> Result<Self> {
        Ok(Self {
            fence: Fence::new(backend)?,
        })
    }

    // Records through `record`, submits and blocks until the GPU is done
    pub fn immediate_submit<B, F>(
        &mut self,
        backend: &mut B,
        list: &mut CommandList,
        record: F,
    ) -> Result<()>
    where
        B: RenderBackend,
        F: FnOnce(&mut CommandList) -> Result<()>,
    {
        backend.reset_command_allocator()?;
        list.reset(None)?;
        record(list)?;
        list.close()?;
        backend.execute(list.submission()?)?;

        let value = self.fence.signal_and_wait(backend)?;
        log::debug!("Transfer {} completed", value);
        Ok(())
    }

    pub fn drain<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        self.fence.drain(backend)
    }

    pub fn fence_value(&self) -> u64 {
        self.fence.value()
    }
}
