use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::backend::{BufferHandle, DescriptorAddress, HeapHandle, LayoutHandle, PipelineHandle, TextureHandle};
use crate::renderer::core::Extent;
use crate::renderer::core::state::Barrier;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn covering(extent: Extent) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub fn covering(extent: Extent) -> Self {
        Self {
            left: 0,
            top: 0,
            right: extent.width as i32,
            bottom: extent.height as i32,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexBufferView {
    pub buffer: BufferHandle,
    pub stride: u32,
    pub size: u64,
}

/// Buffer of 32-bit indices
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer: BufferHandle,
    pub size: u64,
}

/// A single recorded GPU operation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPipeline(PipelineHandle),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    Barrier(Barrier),
    SetRenderTarget(DescriptorAddress),
    ClearRenderTarget {
        view: DescriptorAddress,
        color: [f32; 4],
    },
    SetBindingLayout(LayoutHandle),
    SetDescriptorHeaps(Vec<HeapHandle>),
    SetDescriptorTable {
        parameter: u32,
        base: DescriptorAddress,
    },
    SetVertexBuffer(VertexBufferView),
    SetIndexBuffer(IndexBufferView),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    CopyBufferToTexture {
        buffer: BufferHandle,
        texture: TextureHandle,
        extent: Extent,
        row_pitch: u32,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandListState {
    /// Created, or submitted and not yet reset
    Closed,
    Recording,
}

/// Records commands between `reset` and `close`.
///
/// A list is closed after creation (like a freshly created and closed D3D12 list), must be
/// reset before recording, and can only be handed to the backend once closed again.
pub struct CommandList {
    commands: Vec<Command>,
    state: CommandListState,
}

impl CommandList {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            state: CommandListState::Closed,
        }
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Starts a new recording, optionally bound to a pipeline
    pub fn reset(&mut self, pipeline: Option<PipelineHandle>) -> Result<()> {
        if self.state == CommandListState::Recording {
            return Err(eyre!("Command list reset while still recording"));
        }

        self.commands.clear();
        self.state = CommandListState::Recording;
        if let Some(pipeline) = pipeline {
            self.commands.push(Command::SetPipeline(pipeline));
        }

        Ok(())
    }

    pub fn record(&mut self, command: Command) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(eyre!("Command list is not recording: {:?}", command));
        }
        self.commands.push(command);
        Ok(())
    }

    pub fn record_barrier(&mut self, barrier: Option<Barrier>) -> Result<()> {
        match barrier {
            Some(barrier) => self.record(Command::Barrier(barrier)),
            None => Ok(()),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(eyre!("Command list is already closed"));
        }
        self.state = CommandListState::Closed;
        Ok(())
    }

    /// The recorded commands, available once the list is closed
    pub fn submission(&self) -> Result<&[Command]> {
        if self.state != CommandListState::Closed {
            return Err(eyre!("Cannot submit a command list that is still recording"));
        }
        Ok(&self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed_and_refuses_recording() {
        let mut list = CommandList::new();
        assert_eq!(list.state(), CommandListState::Closed);
        assert!(list.record(Command::Draw { vertex_count: 3, instance_count: 1 }).is_err());
        assert!(list.close().is_err());
    }

    #[test]
    fn reset_binds_pipeline_first() {
        let mut list = CommandList::new();
        list.reset(Some(PipelineHandle(7))).unwrap();
        list.record(Command::Draw { vertex_count: 3, instance_count: 1 }).unwrap();
        list.close().unwrap();

        let commands = list.submission().unwrap();
        assert_eq!(commands[0], Command::SetPipeline(PipelineHandle(7)));
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn open_list_cannot_be_submitted_or_reset() {
        let mut list = CommandList::new();
        list.reset(None).unwrap();
        assert!(list.submission().is_err());
        assert!(list.reset(None).is_err());
    }

    #[test]
    fn reset_discards_previous_recording() {
        let mut list = CommandList::new();
        list.reset(None).unwrap();
        list.record(Command::Draw { vertex_count: 3, instance_count: 1 }).unwrap();
        list.close().unwrap();

        list.reset(None).unwrap();
        list.close().unwrap();
        assert!(list.submission().unwrap().is_empty());
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = Extent::new(640, 480);
        let viewport = Viewport::covering(extent);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (640.0, 480.0));
        assert_eq!(
            ScissorRect::covering(extent),
            ScissorRect { left: 0, top: 0, right: 640, bottom: 480 }
        );
    }
}
