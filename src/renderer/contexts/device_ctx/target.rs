use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use crate::renderer::backend::desc::DescriptorSource;
use crate::renderer::backend::{DescriptorAddress, HeapKind, RenderBackend};
use crate::renderer::core::Extent;
use crate::renderer::core::descriptor::DescriptorHeap;
use crate::renderer::core::fence::Fence;
use crate::renderer::core::state::{BackBuffer, Barrier, ResourceState, Tracked};

/// Where a resize currently stands. Outside of `resize` the target is always `Idle`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResizePhase {
    Idle,
    /// Waiting for all submitted GPU work
    Draining,
    /// Back-buffers dropped, render target views invalid
    BuffersReleased,
    BuffersRecreated,
    ViewsRebuilt,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResizeOutcome {
    Unchanged,
    /// Zero-sized client area, nothing was touched
    Minimized,
    Resized,
}

/// Presentation target of the renderer: the swapchain's back-buffers, their tracked states
/// and one render target view per back-buffer
pub struct RenderTarget {
    extent: Extent,
    back_buffers: Vec<Tracked<BackBuffer>>,
    rtv_heap: DescriptorHeap,
    current: usize,
    /// False while the swapchain has no back-buffer to hand out
    available: bool,
    phase: ResizePhase,
}

impl RenderTarget {
    pub fn new<B: RenderBackend>(backend: &mut B, extent: Extent) -> Result<Self> {
        let count = backend.back_buffer_count();
        if count == 0 {
            return Err(eyre!("Swapchain has no back-buffers"));
        }

        let rtv_heap = DescriptorHeap::new(backend, HeapKind::RenderTarget, count as u32)?;
        let mut target = Self {
            extent,
            back_buffers: Vec::new(),
            rtv_heap,
            current: 0,
            available: false,
            phase: ResizePhase::Idle,
        };
        target.create_views(backend)?;
        target.refetch_index(backend)?;

        log::info!("Render target {} with {} back-buffers", extent, count);
        Ok(target)
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn phase(&self) -> ResizePhase {
        self.phase
    }

    pub fn back_buffer_count(&self) -> usize {
        self.back_buffers.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn back_buffer_state(&self, index: usize) -> Option<ResourceState> {
        self.back_buffers.get(index).map(|back_buffer| back_buffer.state())
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn valid_view_count(&self) -> usize {
        self.rtv_heap.valid_count()
    }

    /// Render target view of the writable back-buffer
    pub fn current_view(&self) -> Result<DescriptorAddress> {
        if !self.available {
            return Err(eyre!("No back-buffer is available"));
        }
        if !self.rtv_heap.is_valid(self.current as u32) {
            return Err(eyre!("Render target view {} is not valid", self.current));
        }
        self.rtv_heap.address(self.current as u32)
    }

    pub fn transition_current(&mut self, desired: ResourceState) -> Option<Barrier> {
        self.back_buffers[self.current].transition_to(desired)
    }

    /// Asks the swapchain which back-buffer is writable. Never assumes round robin order.
    /// `None` while the surface has no area; the target stays unavailable until a later
    /// call succeeds.
    pub fn refetch_index<B: RenderBackend>(&mut self, backend: &mut B) -> Result<Option<usize>> {
        let Some(index) = backend.current_back_buffer_index()? else {
            self.available = false;
            return Ok(None);
        };
        if index >= self.back_buffers.len() {
            return Err(eyre!(
                "Swapchain returned back-buffer {} out of {}",
                index,
                self.back_buffers.len(),
            ));
        }
        self.current = index;
        self.available = true;
        Ok(Some(index))
    }

    /// Rebuilds the back-buffers at `extent`. The GPU is idle once this returns.
    pub fn resize<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        fence: &mut Fence,
        extent: Extent,
    ) -> Result<ResizeOutcome> {
        if extent.is_zero_area() {
            log::debug!("Ignoring resize to {}", extent);
            return Ok(ResizeOutcome::Minimized);
        }
        if extent == self.extent {
            return Ok(ResizeOutcome::Unchanged);
        }

        self.phase = ResizePhase::Draining;
        fence.drain(backend).wrap_err("Failed to drain the GPU before resizing")?;

        backend.release_back_buffers()?;
        self.rtv_heap.invalidate_all();
        self.back_buffers.clear();
        self.available = false;
        self.phase = ResizePhase::BuffersReleased;

        backend
            .resize_back_buffers(extent)
            .wrap_err_with(|| format!("Failed to resize the swapchain to {}", extent))?;
        self.extent = extent;
        self.phase = ResizePhase::BuffersRecreated;

        self.create_views(backend)?;
        self.refetch_index(backend)?;
        self.phase = ResizePhase::ViewsRebuilt;

        log::info!("Resized render target to {}", extent);
        self.phase = ResizePhase::Idle;
        Ok(ResizeOutcome::Resized)
    }

    fn create_views<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        let count = backend.back_buffer_count();
        if count as u32 > self.rtv_heap.capacity() {
            return Err(eyre!(
                "Swapchain now has {} back-buffers but only {} views fit",
                count,
                self.rtv_heap.capacity(),
            ));
        }

        self.back_buffers = (0..count)
            .map(|index| Tracked::new(BackBuffer(index), ResourceState::Present))
            .collect();
        for index in 0..count {
            self.rtv_heap.write(
                backend,
                index as u32,
                &DescriptorSource::RenderTarget { back_buffer: index },
            )?;
        }

        Ok(())
    }
}
