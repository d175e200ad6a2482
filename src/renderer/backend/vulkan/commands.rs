use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use smallvec::SmallVec;
use crate::renderer::backend::desc::{BindingCategory, DescriptorSource};
use crate::renderer::backend::vulkan::memory::color_subresource_range;
use crate::renderer::backend::vulkan::pipeline::VulkanBindingLayout;
use crate::renderer::backend::vulkan::{translate, VulkanBackend};
use crate::renderer::backend::{DescriptorAddress, LayoutHandle};
use crate::renderer::core::command_list::Command;
use crate::renderer::core::state::{Barrier, ResourceId, ResourceState};

impl VulkanBackend {
    /// Points every binding a submission uses at its resource before recording starts.
    ///
    /// Constant tables only differ in their offset, which becomes a dynamic offset at draw
    /// time. Any other table must keep one resource for the whole submission.
    pub(super) fn flush_descriptor_sets(&mut self, commands: &[Command]) -> Result<()> {
        let mut layout = None;
        let mut bound = SmallVec::<[(LayoutHandle, u32, DescriptorSource); 8]>::new();

        for command in commands {
            match command {
                Command::SetBindingLayout(handle) => {
                    self.layout(*handle)?;
                    layout = Some(*handle);
                }
                Command::SetDescriptorTable { parameter, base } => {
                    let handle = layout.ok_or_eyre("Descriptor table set without a binding layout")?;
                    let value = self.binding_value(handle, *parameter, *base)?;

                    let previous = bound
                        .iter()
                        .find(|(h, p, _)| *h == handle && p == parameter)
                        .map(|(_, _, source)| *source);
                    match previous {
                        Some(previous) if previous != value => {
                            return Err(eyre!(
                                "Table {} rebound from {:?} to {:?} within one submission",
                                parameter,
                                previous,
                                value,
                            ));
                        }
                        Some(_) => continue,
                        None => bound.push((handle, *parameter, value)),
                    }

                    let target = &self.layouts[handle.0 as usize];
                    let set = target.set;
                    if target.written[*parameter as usize] != Some(value) {
                        self.write_binding(set, *parameter, &value)?;
                        self.layouts[handle.0 as usize].written[*parameter as usize] = Some(value);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// What binding `parameter` has to hold for a table starting at `base`
    fn binding_value(
        &self,
        layout: LayoutHandle,
        parameter: u32,
        base: DescriptorAddress,
    ) -> Result<DescriptorSource> {
        let category = self.layout(layout)?.category_of(parameter)?;
        let source = self.descriptor(base)?;
        match (category, source) {
            (BindingCategory::ConstantBuffer, DescriptorSource::ConstantBuffer { buffer, size, .. }) => {
                Ok(DescriptorSource::ConstantBuffer { buffer, offset: 0, size })
            }
            (BindingCategory::ShaderResource, DescriptorSource::ShaderResource { .. })
            | (BindingCategory::Sampler, DescriptorSource::Sampler(_)) => Ok(source),
            _ => Err(eyre!("Table {} expects {:?} but {:?} holds {:?}", parameter, category, base, source)),
        }
    }

    fn write_binding(&mut self, set: vk::DescriptorSet, binding: u32, value: &DescriptorSource) -> Result<()> {
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0);

        match *value {
            DescriptorSource::ConstantBuffer { buffer, offset, size } => {
                let buffer_info = [vk::DescriptorBufferInfo {
                    buffer: self.buffer(buffer)?.buffer,
                    offset,
                    range: size,
                }];
                let write = write
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(&buffer_info);
                unsafe { self.ctx.device.logical.update_descriptor_sets(&[write], &[]) };
            }
            DescriptorSource::ShaderResource { texture } => {
                let image_info = [vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: self.texture(texture)?.view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }];
                let write = write
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(&image_info);
                unsafe { self.ctx.device.logical.update_descriptor_sets(&[write], &[]) };
            }
            DescriptorSource::Sampler(desc) => {
                let image_info = [vk::DescriptorImageInfo {
                    sampler: self.sampler(&desc)?,
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                }];
                let write = write
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(&image_info);
                unsafe { self.ctx.device.logical.update_descriptor_sets(&[write], &[]) };
            }
            DescriptorSource::RenderTarget { .. } => {
                return Err(eyre!("Render target views cannot be bound to shaders"));
            }
        }
        Ok(())
    }

    /// Records `commands` into the command buffer. Returns whether a back-buffer was handed
    /// over to presentation.
    pub(super) fn record(&mut self, commands: &[Command]) -> Result<bool> {
        let pending_layouts = std::mem::take(&mut self.pending_texture_layouts);
        let device = &self.ctx.device.logical;
        let cmd = self.command_buffer;

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;
        }

        let initial_barriers = pending_layouts
            .iter()
            .map(|image| {
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(*image)
                    .subresource_range(color_subresource_range())
            })
            .collect::<SmallVec<[_; 2]>>();
        if !initial_barriers.is_empty() {
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &initial_barriers,
                );
            }
        }

        let mut recorder = Recorder {
            backend: &*self,
            cmd,
            rendering: false,
            render_target: None,
            layout: None,
            dynamic_offsets: SmallVec::new(),
            presents: false,
        };
        for command in commands {
            recorder.record(command)?;
        }
        recorder.end_rendering();
        let presents = recorder.presents;

        unsafe { self.ctx.device.logical.end_command_buffer(cmd)? };
        Ok(presents)
    }
}

/// Tracks the state that Vulkan needs explicitly but the command list leaves implicit
struct Recorder<'a> {
    backend: &'a VulkanBackend,
    cmd: vk::CommandBuffer,
    rendering: bool,
    /// Back-buffer of the last `SetRenderTarget` or clear
    render_target: Option<usize>,
    layout: Option<&'a VulkanBindingLayout>,
    dynamic_offsets: SmallVec<[u32; 4]>,
    presents: bool,
}

impl Recorder<'_> {
    fn device(&self) -> &ash::Device {
        &self.backend.ctx.device.logical
    }

    fn record(&mut self, command: &Command) -> Result<()> {
        let cmd = self.cmd;
        match command {
            Command::SetPipeline(handle) => {
                let pipeline = self.backend.pipeline(*handle)?;
                unsafe {
                    self.device().cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                }
            }
            Command::SetViewport(viewport) => unsafe {
                self.device().cmd_set_viewport(cmd, 0, &[translate::viewport(viewport)]);
            },
            Command::SetScissor(rect) => unsafe {
                self.device().cmd_set_scissor(cmd, 0, &[translate::scissor(rect)]);
            },
            Command::Barrier(barrier) => {
                self.end_rendering();
                self.barrier(barrier)?;
            }
            Command::SetRenderTarget(view) => {
                let back_buffer = self.back_buffer_of(*view)?;
                if self.rendering && self.render_target != Some(back_buffer) {
                    self.end_rendering();
                }
                self.render_target = Some(back_buffer);
            }
            Command::ClearRenderTarget { view, color } => {
                let back_buffer = self.back_buffer_of(*view)?;
                self.end_rendering();
                self.render_target = Some(back_buffer);
                self.begin_rendering(back_buffer, Some(*color));
            }
            Command::SetBindingLayout(handle) => {
                let backend = self.backend;
                let layout = backend.layout(*handle)?;
                self.dynamic_offsets = SmallVec::from_elem(0, layout.dynamic_offset_count());
                self.layout = Some(layout);
            }
            Command::SetDescriptorHeaps(heaps) => {
                // Heaps live on the CPU, their contents reach the GPU through the descriptor set
                for heap in heaps {
                    if self.backend.heaps.get(heap.0 as usize).is_none() {
                        return Err(eyre!("Unknown descriptor heap {:?}", heap));
                    }
                }
            }
            Command::SetDescriptorTable { parameter, base } => {
                let layout = self.layout.ok_or_eyre("Descriptor table set without a binding layout")?;
                if layout.category_of(*parameter)? == BindingCategory::ConstantBuffer {
                    let DescriptorSource::ConstantBuffer { offset, .. } = self.backend.descriptor(*base)? else {
                        return Err(eyre!("Table {} expects a constant buffer view at {:?}", parameter, base));
                    };
                    self.dynamic_offsets[layout.dynamic_offset_index(*parameter)] = u32::try_from(offset)?;
                }
            }
            Command::SetVertexBuffer(view) => {
                let buffer = self.backend.buffer(view.buffer)?.buffer;
                unsafe { self.device().cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) };
            }
            Command::SetIndexBuffer(view) => {
                let buffer = self.backend.buffer(view.buffer)?.buffer;
                unsafe {
                    self.device().cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32);
                }
            }
            Command::Draw { vertex_count, instance_count } => {
                self.prepare_draw()?;
                unsafe { self.device().cmd_draw(cmd, *vertex_count, *instance_count, 0, 0) };
            }
            Command::DrawIndexed { index_count, instance_count } => {
                self.prepare_draw()?;
                unsafe { self.device().cmd_draw_indexed(cmd, *index_count, *instance_count, 0, 0, 0) };
            }
            Command::CopyBufferToTexture { buffer, texture, extent, row_pitch } => {
                self.end_rendering();
                let source = self.backend.buffer(*buffer)?.buffer;
                let target = self.backend.texture(*texture)?;
                let region = vk::BufferImageCopy::default()
                    .buffer_offset(0)
                    .buffer_row_length(row_pitch / target.desc.format.bytes_per_pixel())
                    .buffer_image_height(0)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    });
                unsafe {
                    self.device().cmd_copy_buffer_to_image(
                        cmd,
                        source,
                        target.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
            }
        }
        Ok(())
    }

    fn back_buffer_of(&self, view: DescriptorAddress) -> Result<usize> {
        match self.backend.descriptor(view)? {
            DescriptorSource::RenderTarget { back_buffer } => Ok(back_buffer),
            other => Err(eyre!("{:?} is not a render target view", other)),
        }
    }

    fn barrier(&mut self, barrier: &Barrier) -> Result<()> {
        let image = match barrier.resource {
            ResourceId::BackBuffer(index) => *self
                .backend
                .swapchain
                .images
                .get(index)
                .ok_or_else(|| eyre!("No back-buffer {}", index))?,
            ResourceId::Texture(texture) => self.backend.texture(texture)?.image,
            // Host-visible buffers stay in one state for their whole lifetime
            ResourceId::Buffer(buffer) => {
                return Err(eyre!("Unexpected state transition of buffer {:?}", buffer));
            }
        };
        if barrier.after == ResourceState::Present {
            self.presents = true;
        }

        let (src_stage, src_access) = translate::stage_and_access(barrier.before, true);
        let (dst_stage, dst_access) = translate::stage_and_access(barrier.after, false);
        let image_barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(translate::image_layout(barrier.before, true))
            .new_layout(translate::image_layout(barrier.after, false))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource_range());
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
        Ok(())
    }

    /// Starts rendering into the bound target if needed and binds the descriptor set
    fn prepare_draw(&mut self) -> Result<()> {
        if !self.rendering {
            let back_buffer = self.render_target.ok_or_eyre("Draw without a render target")?;
            self.begin_rendering(back_buffer, None);
        }
        if let Some(layout) = self.layout {
            unsafe {
                self.device().cmd_bind_descriptor_sets(
                    self.cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout.pipeline_layout,
                    0,
                    &[layout.set],
                    &self.dynamic_offsets,
                );
            }
        }
        Ok(())
    }

    /// Clears the target when `clear` is set, otherwise keeps its contents
    fn begin_rendering(&mut self, back_buffer: usize, clear: Option<[f32; 4]>) {
        let swapchain = &self.backend.swapchain;
        let load_op = if clear.is_some() {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        };
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(swapchain.image_views[back_buffer])
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.unwrap_or_default(),
                },
            })];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.image_extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        unsafe { self.device().cmd_begin_rendering(self.cmd, &rendering_info) };
        self.rendering = true;
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            unsafe { self.device().cmd_end_rendering(self.cmd) };
            self.rendering = false;
        }
    }
}
