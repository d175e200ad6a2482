use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::backend::{FenceHandle, RenderBackend};

/// Single-owner CPU/GPU synchronization point.
///
/// `value` is the last value signaled on the queue. Waiting for a value guarantees that
/// every piece of work submitted before the matching signal has finished on the GPU.
pub struct Fence {
    handle: FenceHandle,
    value: u64,
    last_completed: u64,
}

impl Fence {
    pub fn new<B: RenderBackend>(backend: &mut B) -> Result<Self> {
        let handle = backend.create_fence(0)?;
        Ok(Self {
            handle,
            value: 0,
            last_completed: 0,
        })
    }

    pub fn handle(&self) -> FenceHandle {
        self.handle
    }

    /// Last value signaled on the queue
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Advances the target value and enqueues its signal
    pub fn signal<B: RenderBackend>(&mut self, backend: &mut B) -> Result<u64> {
        let next = self.value + 1;
        backend.signal(self.handle, next)?;
        self.value = next;
        Ok(next)
    }

    /// Blocks until the GPU reached `value`
    pub fn wait_until<B: RenderBackend>(&mut self, backend: &mut B, value: u64) -> Result<()> {
        if value > self.value {
            return Err(eyre!(
                "Waiting for fence value {} which was never signaled (last signaled {})",
                value,
                self.value,
            ));
        }

        let mut completed = self.observe(backend)?;
        if completed < value {
            backend.wait_for_value(self.handle, value)?;
            completed = self.observe(backend)?;
        }

        if completed < value {
            return Err(eyre!(
                "Fence wait for {} returned with completed value {}",
                value,
                completed,
            ));
        }

        Ok(())
    }

    /// Signals a new value and waits for it: the GPU is idle afterwards
    pub fn signal_and_wait<B: RenderBackend>(&mut self, backend: &mut B) -> Result<u64> {
        let value = self.signal(backend)?;
        self.wait_until(backend, value)?;
        Ok(value)
    }

    /// Waits for everything signaled so far
    pub fn drain<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        self.wait_until(backend, self.value)
    }

    fn observe<B: RenderBackend>(&mut self, backend: &B) -> Result<u64> {
        let completed = backend.completed_value(self.handle)?;
        if completed < self.last_completed {
            return Err(eyre!(
                "Fence completed value went backwards: {} after {}",
                completed,
                self.last_completed,
            ));
        }
        self.last_completed = completed;
        Ok(completed)
    }
}
