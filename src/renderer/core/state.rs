use crate::renderer::backend::{BufferHandle, TextureHandle};

/// Declared usage mode of a GPU resource. The GPU does not track this for us: every
/// resource is wrapped in a `Tracked` and every state change is recorded as a `Barrier`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Freshly created, contents undefined
    Common,
    /// Upload-heap buffers: readable by the GPU, written by the CPU through a mapping
    GenericRead,
    CopyDest,
    Present,
    RenderTarget,
    PixelShaderResource,
}

/// Identifies the resource a barrier applies to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    BackBuffer(usize),
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

impl From<TextureHandle> for ResourceId {
    fn from(handle: TextureHandle) -> Self {
        Self::Texture(handle)
    }
}

impl From<BufferHandle> for ResourceId {
    fn from(handle: BufferHandle) -> Self {
        Self::Buffer(handle)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Barrier {
    pub resource: ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Computes the barrier needed to move a resource from `current` to `desired`.
/// Returns `None` when the resource is already in the desired state.
pub fn transition(
    resource: ResourceId,
    current: ResourceState,
    desired: ResourceState,
) -> Option<Barrier> {
    if current == desired {
        return None;
    }
    Some(Barrier {
        resource,
        before: current,
        after: desired,
    })
}

/// A resource handle paired with the state the renderer last transitioned it to
#[derive(Debug, Copy, Clone)]
pub struct Tracked<H> {
    handle: H,
    state: ResourceState,
}

impl<H> Tracked<H>
where
    H: Copy + Into<ResourceId>,
{
    pub fn new(handle: H, initial_state: ResourceState) -> Self {
        Self {
            handle,
            state: initial_state,
        }
    }

    pub fn handle(&self) -> H {
        self.handle
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Records the move to `desired` and returns the barrier the command list needs
    pub fn transition_to(&mut self, desired: ResourceState) -> Option<Barrier> {
        let barrier = transition(self.handle.into(), self.state, desired);
        self.state = desired;
        barrier
    }
}

/// Back-buffers are addressed by their swapchain index
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BackBuffer(pub usize);

impl From<BackBuffer> for ResourceId {
    fn from(back_buffer: BackBuffer) -> Self {
        Self::BackBuffer(back_buffer.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_state_needs_no_barrier() {
        let barrier = transition(
            ResourceId::BackBuffer(0),
            ResourceState::Present,
            ResourceState::Present,
        );
        assert_eq!(barrier, None);
    }

    #[test]
    fn back_buffer_round_trip_emits_mirrored_barriers() {
        let mut back_buffer = Tracked::new(BackBuffer(1), ResourceState::Present);

        let to_target = back_buffer
            .transition_to(ResourceState::RenderTarget)
            .expect("present -> render target needs a barrier");
        assert_eq!(to_target.resource, ResourceId::BackBuffer(1));
        assert_eq!(to_target.before, ResourceState::Present);
        assert_eq!(to_target.after, ResourceState::RenderTarget);
        assert_eq!(back_buffer.state(), ResourceState::RenderTarget);

        // Asking again for the current state is free
        assert!(back_buffer.transition_to(ResourceState::RenderTarget).is_none());

        let to_present = back_buffer
            .transition_to(ResourceState::Present)
            .expect("render target -> present needs a barrier");
        assert_eq!(to_present.before, ResourceState::RenderTarget);
        assert_eq!(to_present.after, ResourceState::Present);
    }

    #[test]
    fn texture_upload_sequence() {
        let mut texture = Tracked::new(TextureHandle(3), ResourceState::CopyDest);
        let barrier = texture
            .transition_to(ResourceState::PixelShaderResource)
            .unwrap();
        assert_eq!(barrier.resource, ResourceId::Texture(TextureHandle(3)));
        assert_eq!(barrier.before, ResourceState::CopyDest);
        assert_eq!(texture.handle(), TextureHandle(3));
    }
}
