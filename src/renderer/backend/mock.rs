//! In-memory stand-in for a GPU. It records every call, tracks resource states on its own
//! and rejects anything a real driver would reject or silently corrupt, so the engine's
//! ordering rules can be checked without hardware.

use std::collections::{HashMap, VecDeque};
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};
use crate::renderer::backend::desc::{
    BindingLayout, BlendState, BufferUsage, DepthStencilState, DescriptorSource, PipelineDesc,
    RasterizerState, TextureDesc, TextureFormat,
};
use crate::renderer::backend::{
    BufferHandle, DescriptorAddress, FenceHandle, HeapHandle, HeapKind, LayoutHandle,
    PipelineHandle, RenderBackend, TextureHandle,
};
use crate::renderer::core::Extent;
use crate::renderer::core::adapter::{AdapterInfo, AdapterKind};
use crate::renderer::core::command_list::Command;
use crate::renderer::core::state::{ResourceId, ResourceState};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AcquireIndex(usize),
    ReleaseBackBuffers,
    ResizeBackBuffers(Extent),
    Present { back_buffer: usize },
    CreateHeap { heap: HeapHandle, kind: HeapKind, capacity: u32 },
    WriteDescriptor { dest: DescriptorAddress, source: DescriptorSource },
    CreateFence(FenceHandle),
    Signal { fence: FenceHandle, value: u64 },
    WaitForValue { fence: FenceHandle, value: u64 },
    ResetAllocator,
    Execute(Vec<Command>),
    CreateBuffer { buffer: BufferHandle, size: u64, usage: BufferUsage },
    WriteBuffer { buffer: BufferHandle, offset: u64, len: usize },
    DestroyBuffer(BufferHandle),
    CreateTexture { texture: TextureHandle, desc: TextureDesc },
    CreateBindingLayout(LayoutHandle),
    CreatePipeline(PipelineHandle),
}

struct MockHeap {
    kind: HeapKind,
    capacity: u32,
    slots: HashMap<u64, DescriptorSource>,
}

struct MockBuffer {
    usage: BufferUsage,
    bytes: Vec<u8>,
}

struct MockTexture {
    desc: TextureDesc,
    state: ResourceState,
    bytes: Vec<u8>,
}

/// Fixed-function state a pipeline was created with
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MockPipeline {
    pub layout: LayoutHandle,
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub render_target_format: TextureFormat,
}

struct MockFence {
    completed: u64,
    signaled: u64,
}

pub struct MockBackend {
    adapter: AdapterInfo,
    calls: Vec<Call>,

    back_buffer_count: usize,
    back_buffer_extent: Extent,
    back_buffer_states: Vec<ResourceState>,
    back_buffers_released: bool,
    current_back_buffer: usize,
    /// Indices handed out after the next presents, before falling back to round robin
    acquire_order: VecDeque<usize>,
    surface_available: bool,

    heaps: Vec<MockHeap>,
    fences: Vec<MockFence>,
    /// Signals enqueued on the queue and not yet reached by the simulated GPU
    queued_signals: VecDeque<(FenceHandle, u64)>,
    /// Work executed since the last signal was enqueued
    unsignaled_work: bool,

    buffers: HashMap<u32, MockBuffer>,
    textures: Vec<MockTexture>,
    layouts: Vec<BindingLayout>,
    pipelines: Vec<MockPipeline>,
    next_buffer: u32,

    constant_alignment: u64,
    fail_texture_creation: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_adapter(AdapterKind::Hardware)
    }

    pub fn with_adapter(kind: AdapterKind) -> Self {
        let back_buffer_count = 2;
        Self {
            adapter: AdapterInfo {
                name: "Mock adapter".to_string(),
                kind,
            },
            calls: Vec::new(),
            back_buffer_count,
            back_buffer_extent: Extent::new(1280, 720),
            back_buffer_states: vec![ResourceState::Present; back_buffer_count],
            back_buffers_released: false,
            current_back_buffer: 0,
            acquire_order: VecDeque::new(),
            surface_available: true,
            heaps: Vec::new(),
            fences: Vec::new(),
            queued_signals: VecDeque::new(),
            unsignaled_work: false,
            buffers: HashMap::new(),
            textures: Vec::new(),
            layouts: Vec::new(),
            pipelines: Vec::new(),
            next_buffer: 0,
            constant_alignment: 256,
            fail_texture_creation: false,
        }
    }

    pub fn with_back_buffer_count(mut self, count: usize) -> Self {
        self.back_buffer_count = count;
        self.back_buffer_states = vec![ResourceState::Present; count];
        self
    }

    pub fn with_constant_alignment(mut self, alignment: u64) -> Self {
        self.constant_alignment = alignment;
        self
    }

    /// Makes the swapchain hand out these indices after the next presents
    pub fn with_acquire_order(mut self, order: impl IntoIterator<Item = usize>) -> Self {
        self.acquire_order = order.into_iter().collect();
        self
    }

    /// Simulates the surface shrinking to nothing (or coming back) behind the renderer's back
    pub fn set_surface_available(&mut self, available: bool) {
        self.surface_available = available;
    }

    pub fn failing_texture_creation(mut self) -> Self {
        self.fail_texture_creation = true;
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn back_buffer_extent(&self) -> Extent {
        self.back_buffer_extent
    }

    pub fn back_buffer_state(&self, index: usize) -> ResourceState {
        self.back_buffer_states[index]
    }

    pub fn buffer_bytes(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|buffer| buffer.bytes.as_slice())
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_bytes(&self, texture: TextureHandle) -> Option<&[u8]> {
        self.textures.get(texture.0 as usize).map(|texture| texture.bytes.as_slice())
    }

    pub fn texture_state(&self, texture: TextureHandle) -> Option<ResourceState> {
        self.textures.get(texture.0 as usize).map(|texture| texture.state)
    }

    pub fn descriptor_at(&self, address: DescriptorAddress) -> Option<DescriptorSource> {
        self.heaps
            .get(address.heap.0 as usize)
            .and_then(|heap| heap.slots.get(&address.offset))
            .copied()
    }

    pub fn pipeline_state(&self, pipeline: PipelineHandle) -> Option<MockPipeline> {
        self.pipelines.get(pipeline.0 as usize).copied()
    }

    /// Overrides what the GPU reports as completed, to simulate a misbehaving driver
    pub fn force_completed_value(&mut self, fence: FenceHandle, value: u64) {
        if let Some(fence) = self.fences.get_mut(fence.0 as usize) {
            fence.completed = value;
        }
    }

    fn gpu_busy(&self) -> bool {
        self.unsignaled_work || !self.queued_signals.is_empty()
    }

    fn fence_mut(&mut self, fence: FenceHandle) -> Result<&mut MockFence> {
        self.fences
            .get_mut(fence.0 as usize)
            .ok_or_eyre("Unknown fence")
    }

    fn stride_of(kind: HeapKind) -> u64 {
        match kind {
            HeapKind::RenderTarget => 32,
            HeapKind::CbvSrv => 64,
            HeapKind::Sampler => 16,
        }
    }

    fn lookup_descriptor(&self, address: DescriptorAddress) -> Result<DescriptorSource> {
        self.descriptor_at(address)
            .ok_or_else(|| eyre!("No descriptor written at {:?}", address))
    }

    fn resource_state_mut(&mut self, resource: ResourceId) -> Result<&mut ResourceState> {
        match resource {
            ResourceId::BackBuffer(index) => {
                if self.back_buffers_released {
                    return Err(eyre!("Back-buffer {} used while released", index));
                }
                self.back_buffer_states
                    .get_mut(index)
                    .ok_or_else(|| eyre!("Back-buffer {} does not exist", index))
            }
            ResourceId::Texture(texture) => self
                .textures
                .get_mut(texture.0 as usize)
                .map(|texture| &mut texture.state)
                .ok_or_else(|| eyre!("Texture {:?} does not exist", texture)),
            ResourceId::Buffer(buffer) => Err(eyre!("Upload buffer {:?} cannot change state", buffer)),
        }
    }

    fn run(&mut self, commands: &[Command]) -> Result<()> {
        let mut pipeline = None;
        let mut layout = None;
        let mut render_target = None;
        let mut heaps_bound = false;
        let mut index_buffer = false;

        for command in commands {
            match command {
                Command::SetPipeline(handle) => {
                    if handle.0 as usize >= self.pipelines.len() {
                        return Err(eyre!("Unknown pipeline {:?}", handle));
                    }
                    pipeline = Some(*handle);
                }
                Command::SetBindingLayout(handle) => {
                    if handle.0 as usize >= self.layouts.len() {
                        return Err(eyre!("Unknown binding layout {:?}", handle));
                    }
                    layout = Some(*handle);
                }
                Command::Barrier(barrier) => {
                    let state = self.resource_state_mut(barrier.resource)?;
                    if *state != barrier.before {
                        return Err(eyre!(
                            "Barrier on {:?} expects {:?} but resource is {:?}",
                            barrier.resource,
                            barrier.before,
                            state,
                        ));
                    }
                    *state = barrier.after;
                }
                Command::SetRenderTarget(view) | Command::ClearRenderTarget { view, .. } => {
                    let DescriptorSource::RenderTarget { back_buffer } = self.lookup_descriptor(*view)? else {
                        return Err(eyre!("Descriptor at {:?} is not a render target view", view));
                    };
                    let state = *self.resource_state_mut(ResourceId::BackBuffer(back_buffer))?;
                    if state != ResourceState::RenderTarget {
                        return Err(eyre!("Back-buffer {} written in state {:?}", back_buffer, state));
                    }
                    if matches!(command, Command::SetRenderTarget(_)) {
                        render_target = Some(back_buffer);
                    }
                }
                Command::SetDescriptorHeaps(heaps) => {
                    if heaps.iter().any(|heap| heap.0 as usize >= self.heaps.len()) {
                        return Err(eyre!("Unknown descriptor heap in {:?}", heaps));
                    }
                    heaps_bound = true;
                }
                Command::SetDescriptorTable { parameter, base } => {
                    let layout = layout.ok_or_eyre("Descriptor table bound before the binding layout")?;
                    if !heaps_bound {
                        return Err(eyre!("Descriptor table bound before the descriptor heaps"));
                    }
                    if *parameter as usize >= self.layouts[layout.0 as usize].parameters.len() {
                        return Err(eyre!("Binding layout has no parameter {}", parameter));
                    }
                    self.lookup_descriptor(*base)?;
                }
                Command::SetVertexBuffer(view) => {
                    let buffer = self.buffers.get(&view.buffer.0).ok_or_eyre("Unknown vertex buffer")?;
                    if buffer.usage != BufferUsage::Vertex || view.size > buffer.bytes.len() as u64 {
                        return Err(eyre!("Invalid vertex buffer view {:?}", view));
                    }
                }
                Command::SetIndexBuffer(view) => {
                    let buffer = self.buffers.get(&view.buffer.0).ok_or_eyre("Unknown index buffer")?;
                    if buffer.usage != BufferUsage::Index || view.size > buffer.bytes.len() as u64 {
                        return Err(eyre!("Invalid index buffer view {:?}", view));
                    }
                    index_buffer = true;
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    let (Some(pipeline), Some(layout)) = (pipeline, layout) else {
                        return Err(eyre!("Draw without pipeline or binding layout"));
                    };
                    if self.pipelines[pipeline.0 as usize].layout != layout {
                        return Err(eyre!("Pipeline {:?} was built against another binding layout", pipeline));
                    }
                    let Some(back_buffer) = render_target else {
                        return Err(eyre!("Draw without a render target"));
                    };
                    if self.back_buffer_states[back_buffer] != ResourceState::RenderTarget {
                        return Err(eyre!("Draw into back-buffer {} outside RenderTarget", back_buffer));
                    }
                    if matches!(command, Command::DrawIndexed { .. }) && !index_buffer {
                        return Err(eyre!("Indexed draw without an index buffer"));
                    }
                }
                Command::CopyBufferToTexture { buffer, texture, extent, row_pitch } => {
                    let source = self.buffers.get(&buffer.0).ok_or_eyre("Unknown staging buffer")?;
                    let target = self
                        .textures
                        .get_mut(texture.0 as usize)
                        .ok_or_eyre("Unknown texture")?;
                    if target.state != ResourceState::CopyDest {
                        return Err(eyre!("Copy into texture in state {:?}", target.state));
                    }
                    if *extent != target.desc.extent {
                        return Err(eyre!("Copy extent {} does not match texture {}", extent, target.desc.extent));
                    }

                    let row_bytes = (extent.width * target.desc.format.bytes_per_pixel()) as usize;
                    let row_pitch = *row_pitch as usize;
                    if row_pitch < row_bytes || source.bytes.len() < row_pitch * extent.height as usize {
                        return Err(eyre!("Staging buffer too small for a {} copy", extent));
                    }
                    for row in 0..extent.height as usize {
                        let from = &source.bytes[row * row_pitch..row * row_pitch + row_bytes];
                        target.bytes[row * row_bytes..(row + 1) * row_bytes].copy_from_slice(from);
                    }
                }
                Command::SetViewport(_) | Command::SetScissor(_) => {}
            }
        }

        Ok(())
    }
}

impl RenderBackend for MockBackend {
    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn back_buffer_count(&self) -> usize {
        self.back_buffer_count
    }

    fn back_buffer_format(&self) -> TextureFormat {
        TextureFormat::Bgra8Unorm
    }

    fn current_back_buffer_index(&mut self) -> Result<Option<usize>> {
        if self.back_buffers_released {
            return Err(eyre!("Back-buffer index queried while buffers are released"));
        }
        if !self.surface_available {
            return Ok(None);
        }
        self.calls.push(Call::AcquireIndex(self.current_back_buffer));
        Ok(Some(self.current_back_buffer))
    }

    fn release_back_buffers(&mut self) -> Result<()> {
        if self.gpu_busy() {
            return Err(eyre!("Back-buffers released while the GPU may still use them"));
        }
        self.calls.push(Call::ReleaseBackBuffers);
        self.back_buffers_released = true;
        Ok(())
    }

    fn resize_back_buffers(&mut self, extent: Extent) -> Result<()> {
        if !self.back_buffers_released {
            return Err(eyre!("Swapchain resized while back-buffers are still referenced"));
        }
        if extent.is_zero_area() {
            return Err(eyre!("Swapchain resized to {}", extent));
        }
        self.calls.push(Call::ResizeBackBuffers(extent));
        self.back_buffer_extent = extent;
        self.back_buffer_states = vec![ResourceState::Present; self.back_buffer_count];
        self.back_buffers_released = false;
        self.current_back_buffer = 0;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if self.back_buffers_released {
            return Err(eyre!("Present while back-buffers are released"));
        }
        let back_buffer = self.current_back_buffer;
        if self.back_buffer_states[back_buffer] != ResourceState::Present {
            return Err(eyre!(
                "Back-buffer {} presented in state {:?}",
                back_buffer,
                self.back_buffer_states[back_buffer],
            ));
        }
        self.calls.push(Call::Present { back_buffer });

        self.current_back_buffer = match self.acquire_order.pop_front() {
            Some(index) => index % self.back_buffer_count,
            None => (back_buffer + 1) % self.back_buffer_count,
        };
        Ok(())
    }

    fn descriptor_stride(&self, kind: HeapKind) -> u64 {
        Self::stride_of(kind)
    }

    fn create_descriptor_heap(&mut self, kind: HeapKind, capacity: u32) -> Result<HeapHandle> {
        let heap = HeapHandle(self.heaps.len() as u32);
        self.heaps.push(MockHeap {
            kind,
            capacity,
            slots: HashMap::new(),
        });
        self.calls.push(Call::CreateHeap { heap, kind, capacity });
        Ok(heap)
    }

    fn write_descriptor(&mut self, dest: DescriptorAddress, source: &DescriptorSource) -> Result<()> {
        let heap = self
            .heaps
            .get(dest.heap.0 as usize)
            .ok_or_eyre("Unknown descriptor heap")?;
        let stride = Self::stride_of(heap.kind);
        if dest.offset % stride != 0 || dest.offset / stride >= heap.capacity as u64 {
            return Err(eyre!("Descriptor offset {} outside of {:?} heap", dest.offset, heap.kind));
        }

        if source.heap_kind() != heap.kind {
            return Err(eyre!("{:?} cannot live in a {:?} heap", source, heap.kind));
        }

        match source {
            DescriptorSource::RenderTarget { back_buffer } => {
                if self.back_buffers_released || *back_buffer >= self.back_buffer_count {
                    return Err(eyre!("Render target view for unavailable back-buffer {}", back_buffer));
                }
            }
            DescriptorSource::ConstantBuffer { buffer, offset, size } => {
                let target = self.buffers.get(&buffer.0).ok_or_eyre("Unknown constant buffer")?;
                if offset % self.constant_alignment != 0 || offset + size > target.bytes.len() as u64 {
                    return Err(eyre!("Invalid constant buffer view at {} (+{})", offset, size));
                }
            }
            DescriptorSource::ShaderResource { texture } => {
                if texture.0 as usize >= self.textures.len() {
                    return Err(eyre!("Unknown texture {:?}", texture));
                }
            }
            DescriptorSource::Sampler(_) => {}
        }

        self.heaps[dest.heap.0 as usize].slots.insert(dest.offset, *source);
        self.calls.push(Call::WriteDescriptor { dest, source: *source });
        Ok(())
    }

    fn create_fence(&mut self, initial_value: u64) -> Result<FenceHandle> {
        let fence = FenceHandle(self.fences.len() as u32);
        self.fences.push(MockFence {
            completed: initial_value,
            signaled: initial_value,
        });
        self.calls.push(Call::CreateFence(fence));
        Ok(fence)
    }

    fn signal(&mut self, fence: FenceHandle, value: u64) -> Result<()> {
        let state = self.fence_mut(fence)?;
        if value <= state.signaled {
            return Err(eyre!("Fence signaled with {} after {}", value, state.signaled));
        }
        state.signaled = value;
        self.queued_signals.push_back((fence, value));
        self.unsignaled_work = false;
        self.calls.push(Call::Signal { fence, value });
        Ok(())
    }

    fn completed_value(&self, fence: FenceHandle) -> Result<u64> {
        self.fences
            .get(fence.0 as usize)
            .map(|fence| fence.completed)
            .ok_or_eyre("Unknown fence")
    }

    fn wait_for_value(&mut self, fence: FenceHandle, value: u64) -> Result<()> {
        if value > self.fence_mut(fence)?.signaled {
            return Err(eyre!("Waiting for fence value {} that is never signaled", value));
        }
        self.calls.push(Call::WaitForValue { fence, value });

        // The queue is FIFO: reaching this signal means every earlier one was reached too
        while self.fence_mut(fence)?.completed < value {
            let (queued_fence, queued_value) = self
                .queued_signals
                .pop_front()
                .ok_or_eyre("Fence value is not on the queue")?;
            self.fence_mut(queued_fence)?.completed = queued_value;
        }
        Ok(())
    }

    fn reset_command_allocator(&mut self) -> Result<()> {
        if self.gpu_busy() {
            return Err(eyre!("Command allocator reset while the GPU may still execute from it"));
        }
        self.calls.push(Call::ResetAllocator);
        Ok(())
    }

    fn execute(&mut self, commands: &[Command]) -> Result<()> {
        self.run(commands)?;
        self.unsignaled_work = true;
        self.calls.push(Call::Execute(commands.to_vec()));
        Ok(())
    }

    fn min_constant_buffer_alignment(&self) -> u64 {
        self.constant_alignment
    }

    fn create_upload_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferHandle> {
        if size == 0 {
            return Err(eyre!("Zero-sized {:?} buffer", usage));
        }
        let buffer = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(buffer.0, MockBuffer {
            usage,
            bytes: vec![0; size as usize],
        });
        self.calls.push(Call::CreateBuffer { buffer, size, usage });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let target = self.buffers.get_mut(&buffer.0).ok_or_eyre("Unknown buffer")?;
        let start = offset as usize;
        let end = start + data.len();
        if end > target.bytes.len() {
            return Err(eyre!("Write of {} bytes at {} overflows buffer of {}", data.len(), offset, target.bytes.len()));
        }
        target.bytes[start..end].copy_from_slice(data);
        self.calls.push(Call::WriteBuffer { buffer, offset, len: data.len() });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        if self.gpu_busy() {
            return Err(eyre!("Buffer destroyed while the GPU may still read it"));
        }
        self.buffers.remove(&buffer.0).ok_or_eyre("Unknown buffer")?;
        self.calls.push(Call::DestroyBuffer(buffer));
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        if self.fail_texture_creation {
            return Err(eyre!("Out of device memory"));
        }
        let texture = TextureHandle(self.textures.len() as u32);
        let size = desc.extent.width * desc.extent.height * desc.format.bytes_per_pixel();
        self.textures.push(MockTexture {
            desc: *desc,
            state: ResourceState::CopyDest,
            bytes: vec![0; size as usize],
        });
        self.calls.push(Call::CreateTexture { texture, desc: *desc });
        Ok(texture)
    }

    fn create_binding_layout(&mut self, layout: &BindingLayout) -> Result<LayoutHandle> {
        let handle = LayoutHandle(self.layouts.len() as u32);
        self.layouts.push(layout.clone());
        self.calls.push(Call::CreateBindingLayout(handle));
        Ok(handle)
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        if desc.layout.0 as usize >= self.layouts.len() {
            return Err(eyre!("Pipeline references unknown binding layout {:?}", desc.layout));
        }
        if desc.vertex_shader.words.is_empty() || desc.pixel_shader.words.is_empty() {
            return Err(eyre!("Pipeline created from empty shader bytecode"));
        }
        let handle = PipelineHandle(self.pipelines.len() as u32);
        self.pipelines.push(MockPipeline {
            layout: desc.layout,
            rasterizer: desc.rasterizer,
            blend: desc.blend,
            depth_stencil: desc.depth_stencil,
            render_target_format: desc.render_target_format,
        });
        self.calls.push(Call::CreatePipeline(handle));
        Ok(handle)
    }
}
