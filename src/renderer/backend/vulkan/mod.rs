//! `RenderBackend` on top of Vulkan 1.3.
//!
//! Fences map to timeline semaphores, descriptor heaps are kept on the CPU and flushed into
//! one descriptor set per binding layout at submission, and render passes are replaced by
//! dynamic rendering started from the recorded clear and draw commands.

pub mod commands;
pub mod device;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod swapchain;
pub mod translate;

use std::collections::HashMap;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt, WrapErr};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocatorDebugSettings;
use winit::window::Window;
use crate::renderer::backend::desc::{
    BindingLayout, BufferUsage, DescriptorSource, PipelineDesc, SamplerDesc, TextureDesc,
    TextureFormat,
};
use crate::renderer::backend::vulkan::device::VulkanDevice;
use crate::renderer::backend::vulkan::instance::VulkanInstance;
use crate::renderer::backend::vulkan::memory::{VulkanBuffer, VulkanTexture};
use crate::renderer::backend::vulkan::pipeline::VulkanBindingLayout;
use crate::renderer::backend::vulkan::swapchain::Swapchain;
use crate::renderer::backend::{
    BufferHandle, DescriptorAddress, FenceHandle, HeapHandle, HeapKind, LayoutHandle,
    PipelineHandle, RenderBackend, TextureHandle,
};
use crate::renderer::config::RenderConfig;
use crate::renderer::core::adapter::{self, AdapterInfo};
use crate::renderer::core::command_list::Command;
use crate::renderer::core::Extent;
use crate::renderer::stage::InitStage;

/// Instance and device. Dropped after every object created from them.
struct VulkanContext {
    device: VulkanDevice,
    instance: VulkanInstance,
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.logical.destroy_device(None);
            self.instance.destroy();
        }
    }
}

/// Runs `cleanup` if `result` failed. Used while creating objects that have no owner yet.
fn or_cleanup<T>(result: Result<T>, cleanup: impl FnOnce()) -> Result<T> {
    if result.is_err() {
        cleanup();
    }
    result
}

/// CPU-side descriptor heap. Slot `i` lives at byte offset `i * stride`.
struct DescriptorHeap {
    kind: HeapKind,
    slots: Vec<Option<DescriptorSource>>,
}

pub struct VulkanBackend {
    allocator: Option<Allocator>,
    swapchain: Swapchain,
    extent: Extent,
    /// Set when presenting reported the swapchain out of date
    swapchain_stale: bool,

    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    /// Signaled by a submission that hands a back-buffer to presentation
    render_finished: vk::Semaphore,
    present_wait_pending: bool,

    heaps: Vec<DescriptorHeap>,
    samplers: HashMap<SamplerDesc, vk::Sampler>,
    fences: Vec<vk::Semaphore>,
    buffers: Vec<Option<VulkanBuffer>>,
    textures: Vec<VulkanTexture>,
    /// Images created since the last submission, still in the undefined layout
    pending_texture_layouts: Vec<vk::Image>,
    layouts: Vec<VulkanBindingLayout>,
    pipelines: Vec<vk::Pipeline>,

    ctx: VulkanContext,
}

impl VulkanBackend {
    pub fn new(window: &Window, config: &RenderConfig) -> Result<Self> {
        let size = window.inner_size();
        let extent = Extent::new(size.width, size.height);

        let instance = VulkanInstance::new(window).wrap_err(InitStage::Device)?;
        let device = match adapter::create_with_fallback(|kind| VulkanDevice::new(&instance, kind)) {
            Ok((device, _)) => device,
            Err(err) => {
                let mut instance = instance;
                unsafe { instance.destroy() };
                return Err(err.wrap_err(InitStage::Device));
            }
        };
        log::info!(
            "Using {:?} adapter {} (Vulkan {}.{})",
            device.adapter.kind,
            device.adapter.name,
            vk::api_version_major(device.properties.api_version),
            vk::api_version_minor(device.properties.api_version),
        );
        let ctx = VulkanContext { device, instance };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ctx.instance.instance.clone(),
            device: ctx.device.logical.clone(),
            physical_device: ctx.device.physical,
            debug_settings: AllocatorDebugSettings::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .wrap_err(InitStage::Device)?;

        let command_pool = unsafe {
            let info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.device.queue_family_index);
            ctx.device.logical.create_command_pool(&info, None)
        }
        .wrap_err(InitStage::Commands)?;
        // Frees the command buffer too
        let destroy_pool = || unsafe { ctx.device.logical.destroy_command_pool(command_pool, None) };

        let command_buffer = or_cleanup(
            unsafe {
                let info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(command_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                ctx.device.logical.allocate_command_buffers(&info)
            }
            .wrap_err(InitStage::Commands),
            destroy_pool,
        )?[0];
        let render_finished = or_cleanup(
            unsafe {
                ctx.device.logical.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            }
            .wrap_err(InitStage::Queue),
            destroy_pool,
        )?;

        let swapchain = or_cleanup(
            Swapchain::new(
                &ctx.instance,
                &ctx.device,
                extent,
                config.vsync,
                config.back_buffer_count,
            )
            .wrap_err(InitStage::Swapchain),
            || {
                unsafe { ctx.device.logical.destroy_semaphore(render_finished, None) };
                destroy_pool();
            },
        )?;

        Ok(Self {
            allocator: Some(allocator),
            swapchain,
            extent,
            swapchain_stale: false,

            command_pool,
            command_buffer,
            render_finished,
            present_wait_pending: false,

            heaps: Vec::new(),
            samplers: HashMap::new(),
            fences: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            pending_texture_layouts: Vec::new(),
            layouts: Vec::new(),
            pipelines: Vec::new(),

            ctx,
        })
    }

    fn allocator(&mut self) -> Result<&mut Allocator> {
        self.allocator.as_mut().ok_or_eyre("Allocator already destroyed")
    }

    fn fence(&self, fence: FenceHandle) -> Result<vk::Semaphore> {
        self.fences
            .get(fence.0 as usize)
            .copied()
            .ok_or_else(|| eyre!("Unknown fence {:?}", fence))
    }

    fn buffer(&self, buffer: BufferHandle) -> Result<&VulkanBuffer> {
        self.buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| eyre!("Unknown or destroyed buffer {:?}", buffer))
    }

    fn texture(&self, texture: TextureHandle) -> Result<&VulkanTexture> {
        self.textures
            .get(texture.0 as usize)
            .ok_or_else(|| eyre!("Unknown texture {:?}", texture))
    }

    fn layout(&self, layout: LayoutHandle) -> Result<&VulkanBindingLayout> {
        self.layouts
            .get(layout.0 as usize)
            .ok_or_else(|| eyre!("Unknown binding layout {:?}", layout))
    }

    fn pipeline(&self, pipeline: PipelineHandle) -> Result<vk::Pipeline> {
        self.pipelines
            .get(pipeline.0 as usize)
            .copied()
            .ok_or_else(|| eyre!("Unknown pipeline {:?}", pipeline))
    }

    /// Descriptor stored at `address`, which must be a written slot
    fn descriptor(&self, address: DescriptorAddress) -> Result<DescriptorSource> {
        let heap = self
            .heaps
            .get(address.heap.0 as usize)
            .ok_or_else(|| eyre!("Unknown descriptor heap {:?}", address.heap))?;
        let stride = self.descriptor_stride(heap.kind);
        if address.offset % stride != 0 {
            return Err(eyre!("Descriptor offset {} is not a multiple of {}", address.offset, stride));
        }
        heap.slots
            .get((address.offset / stride) as usize)
            .copied()
            .flatten()
            .ok_or_else(|| eyre!("No descriptor written at {:?}", address))
    }

    fn sampler(&mut self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        if let Some(sampler) = self.samplers.get(desc) {
            return Ok(*sampler);
        }
        let sampler = unsafe {
            self.ctx.device.logical.create_sampler(&translate::sampler_info(desc), None)?
        };
        self.samplers.insert(*desc, sampler);
        Ok(sampler)
    }

    /// Returns false while the surface has no area, leaving the swapchain stale
    fn recreate_swapchain(&mut self) -> Result<bool> {
        unsafe { self.ctx.device.logical.device_wait_idle()? };
        let previous_count = self.swapchain.image_count();
        if !self.swapchain.recreate(&self.ctx.instance, &self.ctx.device, self.extent)? {
            self.swapchain_stale = true;
            return Ok(false);
        }
        if self.swapchain.image_count() != previous_count {
            return Err(eyre!(
                "Swapchain changed from {} to {} images while recreating",
                previous_count,
                self.swapchain.image_count(),
            ));
        }
        self.swapchain_stale = false;
        Ok(true)
    }
}

impl RenderBackend for VulkanBackend {
    fn adapter(&self) -> &AdapterInfo {
        &self.ctx.device.adapter
    }

    fn back_buffer_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn back_buffer_format(&self) -> TextureFormat {
        self.swapchain.format
    }

    fn current_back_buffer_index(&mut self) -> Result<Option<usize>> {
        if self.swapchain_stale {
            log::debug!("Swapchain out of date, recreating at {}", self.extent);
            if !self.recreate_swapchain()? {
                return Ok(None);
            }
        } else if self.swapchain.is_released() {
            return Err(eyre!("Back-buffers are released"));
        }
        if let Some(index) = self.swapchain.acquire(&self.ctx.device)? {
            return Ok(Some(index as usize));
        }

        log::info!("Swapchain out of date on acquire, recreating at {}", self.extent);
        if !self.recreate_swapchain()? {
            return Ok(None);
        }
        self.swapchain
            .acquire(&self.ctx.device)?
            .map(|index| Some(index as usize))
            .ok_or_eyre("Swapchain still out of date after recreation")
    }

    fn release_back_buffers(&mut self) -> Result<()> {
        unsafe { self.ctx.device.logical.device_wait_idle()? };
        self.swapchain.release(&self.ctx.device);
        Ok(())
    }

    fn resize_back_buffers(&mut self, extent: Extent) -> Result<()> {
        if !self.swapchain.is_released() {
            return Err(eyre!("Back-buffers must be released before resizing"));
        }
        self.extent = extent;
        // The surface may already be gone again, the next acquire retries
        self.swapchain_stale = !self.swapchain.recreate(&self.ctx.instance, &self.ctx.device, extent)?;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let wait_semaphores: &[vk::Semaphore] = if self.present_wait_pending {
            std::slice::from_ref(&self.render_finished)
        } else {
            &[]
        };
        let fresh = self.swapchain.present(self.ctx.device.queue, wait_semaphores)?;
        self.present_wait_pending = false;
        if !fresh {
            self.swapchain_stale = true;
        }
        Ok(())
    }

    fn descriptor_stride(&self, _kind: HeapKind) -> u64 {
        size_of::<DescriptorSource>() as u64
    }

    fn create_descriptor_heap(&mut self, kind: HeapKind, capacity: u32) -> Result<HeapHandle> {
        if capacity == 0 {
            return Err(eyre!("Descriptor heap of {:?} needs at least one slot", kind));
        }
        self.heaps.push(DescriptorHeap {
            kind,
            slots: vec![None; capacity as usize],
        });
        Ok(HeapHandle(self.heaps.len() as u32 - 1))
    }

    fn write_descriptor(&mut self, dest: DescriptorAddress, source: &DescriptorSource) -> Result<()> {
        match *source {
            DescriptorSource::RenderTarget { back_buffer } => {
                if back_buffer >= self.swapchain.image_count() {
                    return Err(eyre!("No back-buffer {}", back_buffer));
                }
            }
            DescriptorSource::ConstantBuffer { buffer, offset, size } => {
                let alignment = self.min_constant_buffer_alignment();
                let target = self.buffer(buffer)?;
                if target.usage != BufferUsage::Constant {
                    return Err(eyre!("Buffer {:?} is a {:?} buffer", buffer, target.usage));
                }
                if offset % alignment != 0 || offset + size > target.size {
                    return Err(eyre!(
                        "Constant view {}..{} does not fit buffer of {} aligned to {}",
                        offset,
                        offset + size,
                        target.size,
                        alignment,
                    ));
                }
            }
            DescriptorSource::ShaderResource { texture } => {
                self.texture(texture)?;
            }
            DescriptorSource::Sampler(desc) => {
                self.sampler(&desc)?;
            }
        }

        let stride = self.descriptor_stride(source.heap_kind());
        let heap = self
            .heaps
            .get_mut(dest.heap.0 as usize)
            .ok_or_else(|| eyre!("Unknown descriptor heap {:?}", dest.heap))?;
        if heap.kind != source.heap_kind() {
            return Err(eyre!("{:?} cannot be written into a {:?} heap", source, heap.kind));
        }
        if dest.offset % stride != 0 {
            return Err(eyre!("Descriptor offset {} is not a multiple of {}", dest.offset, stride));
        }
        let capacity = heap.slots.len();
        let slot = heap
            .slots
            .get_mut((dest.offset / stride) as usize)
            .ok_or_else(|| eyre!("Descriptor offset {} past a heap of {} slots", dest.offset, capacity))?;
        *slot = Some(*source);
        Ok(())
    }

    fn create_fence(&mut self, initial_value: u64) -> Result<FenceHandle> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore = unsafe { self.ctx.device.logical.create_semaphore(&info, None)? };
        self.fences.push(semaphore);
        Ok(FenceHandle(self.fences.len() as u32 - 1))
    }

    fn signal(&mut self, fence: FenceHandle, value: u64) -> Result<()> {
        let semaphores = [self.fence(fence)?];
        let values = [value];
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);
        unsafe {
            self.ctx.device.logical.queue_submit(self.ctx.device.queue, &[submit], vk::Fence::null())?;
        }
        Ok(())
    }

    fn completed_value(&self, fence: FenceHandle) -> Result<u64> {
        let semaphore = self.fence(fence)?;
        Ok(unsafe { self.ctx.device.logical.get_semaphore_counter_value(semaphore)? })
    }

    fn wait_for_value(&mut self, fence: FenceHandle, value: u64) -> Result<()> {
        let semaphores = [self.fence(fence)?];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.ctx.device.logical.wait_semaphores(&info, u64::MAX)? };
        Ok(())
    }

    fn reset_command_allocator(&mut self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .logical
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }

    fn execute(&mut self, commands: &[Command]) -> Result<()> {
        self.flush_descriptor_sets(commands)?;
        let presents = self.record(commands)?;

        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.render_finished];
        let mut submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        if presents {
            submit = submit.signal_semaphores(&signal_semaphores);
        }
        unsafe {
            self.ctx.device.logical.queue_submit(self.ctx.device.queue, &[submit], vk::Fence::null())?;
        }
        self.present_wait_pending |= presents;
        Ok(())
    }

    fn min_constant_buffer_alignment(&self) -> u64 {
        self.ctx.device.properties.limits.min_uniform_buffer_offset_alignment
    }

    fn create_upload_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferHandle> {
        let device = self.ctx.device.logical.clone();
        let buffer = VulkanBuffer::new(size, usage, self.allocator()?, &device)?;
        self.buffers.push(Some(buffer));
        Ok(BufferHandle(self.buffers.len() as u32 - 1))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        self.buffers
            .get_mut(buffer.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| eyre!("Unknown or destroyed buffer {:?}", buffer))?
            .write(offset, data)?;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        let mut target = self
            .buffers
            .get_mut(buffer.0 as usize)
            .and_then(Option::take)
            .ok_or_else(|| eyre!("Unknown or destroyed buffer {:?}", buffer))?;
        let device = self.ctx.device.logical.clone();
        unsafe { target.destroy(self.allocator()?, &device) }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        let device = self.ctx.device.logical.clone();
        let texture = VulkanTexture::new(desc, self.allocator()?, &device)?;
        self.pending_texture_layouts.push(texture.image);
        self.textures.push(texture);
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn create_binding_layout(&mut self, layout: &BindingLayout) -> Result<LayoutHandle> {
        let layout = VulkanBindingLayout::new(layout, &self.ctx.device.logical)?;
        self.layouts.push(layout);
        Ok(LayoutHandle(self.layouts.len() as u32 - 1))
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        let pipeline_layout = self.layout(desc.layout)?.pipeline_layout;
        let pipeline = pipeline::create_graphics_pipeline(desc, pipeline_layout, &self.ctx.device.logical)?;
        self.pipelines.push(pipeline);
        Ok(PipelineHandle(self.pipelines.len() as u32 - 1))
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let device = self.ctx.device.logical.clone();
        unsafe {
            if let Err(err) = device.device_wait_idle() {
                log::error!("Failed to wait for the device before teardown: {}", err);
            }

            for pipeline in self.pipelines.drain(..) {
                device.destroy_pipeline(pipeline, None);
            }
            for layout in &mut self.layouts {
                layout.destroy(&device);
            }
            for (_, sampler) in self.samplers.drain() {
                device.destroy_sampler(sampler, None);
            }
            if let Some(allocator) = self.allocator.as_mut() {
                for texture in &mut self.textures {
                    if let Err(err) = texture.destroy(allocator, &device) {
                        log::error!("Failed to free texture memory: {}", err);
                    }
                }
                for buffer in self.buffers.iter_mut().filter_map(Option::as_mut) {
                    if let Err(err) = buffer.destroy(allocator, &device) {
                        log::error!("Failed to free buffer memory: {}", err);
                    }
                }
            }
            for fence in self.fences.drain(..) {
                device.destroy_semaphore(fence, None);
            }
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_command_pool(self.command_pool, None);
            self.swapchain.destroy(&self.ctx.device);
        }
        // The allocator's memory blocks must go before the device
        drop(self.allocator.take());
    }
}
