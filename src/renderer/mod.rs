pub mod backend;
pub mod camera;
pub mod config;
pub mod contexts;
pub mod core;
pub mod resources;
pub mod shader_data;
pub mod stage;
pub mod util;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::time::{Duration, Instant};
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr};
use crate::renderer::backend::RenderBackend;
use crate::renderer::backend::desc::BindingCategory;
use crate::renderer::config::{GeometryKind, RenderConfig};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::device_ctx::target::ResizeOutcome;
use crate::renderer::contexts::frame_ctx::{FrameStats, RenderFrameContext};
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::core::Extent;
use crate::renderer::core::command_list::{Command, ScissorRect, Viewport};
use crate::renderer::core::state::ResourceState;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::texture::TextureData;

/// Files the renderer needs at startup, already read from disk
pub struct RenderAssets {
    pub shader_source: String,
    pub texture: TextureData,
}

impl RenderAssets {
    pub fn load(shader_path: &Path, texture_path: &Path) -> Result<Self> {
        let shader_source = std::fs::read_to_string(shader_path)
            .wrap_err_with(|| format!("Failed to read shader {}", shader_path.display()))?;
        let texture = TextureData::from_path(texture_path)?;
        Ok(Self {
            shader_source,
            texture,
        })
    }
}

pub struct Renderer<B: RenderBackend> {
    dev: RenderDeviceContext<B>,
    res: RenderResourceContext,
    pip: RenderPipelineContext,
    frm: RenderFrameContext,

    config: RenderConfig,
    start_time: Instant,
    minimized: bool,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(
        backend: B,
        extent: Extent,
        config: RenderConfig,
        assets: &RenderAssets,
    ) -> Result<Self> {
        let mut dev = RenderDeviceContext::new(backend, extent)?;
        if dev.target.back_buffer_count() != config.back_buffer_count as usize {
            log::info!(
                "Requested {} back-buffers, swapchain uses {}",
                config.back_buffer_count,
                dev.target.back_buffer_count(),
            );
        }

        let pip = RenderPipelineContext::new(&mut dev.backend, &assets.shader_source)?;

        let mesh = match config.geometry {
            GeometryKind::Cube => Mesh::new_cube(),
            GeometryKind::Triangle => Mesh::new_triangle(),
        };
        let res = RenderResourceContext::new(
            &mut dev,
            &mesh,
            &assets.texture,
            config.object_count,
            config.sampler,
        )?;
        let frm = RenderFrameContext::new(config.object_count);

        let mut renderer = Self {
            dev,
            res,
            pip,
            frm,

            config,
            start_time: Instant::now(),
            minimized: extent.is_zero_area(),
        };
        renderer.update_at(Duration::ZERO)?;
        Ok(renderer)
    }

    pub fn backend(&self) -> &B {
        &self.dev.backend
    }

    pub fn extent(&self) -> Extent {
        self.dev.target.extent()
    }

    pub fn stats(&self) -> FrameStats {
        self.frm.stats
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Recomputes every object's constants from the wall clock
    pub fn update(&mut self) -> Result<()> {
        self.update_at(self.start_time.elapsed())
    }

    pub fn update_at(&mut self, elapsed: Duration) -> Result<()> {
        let constants = self.frm.object_constants(elapsed, self.dev.target.extent());
        for (slot, value) in constants.iter().enumerate() {
            self.res.constants.write(&mut self.dev.backend, slot as u32, value)?;
        }
        Ok(())
    }

    /// Records, submits and presents one frame, then waits for the GPU to finish it
    pub fn render(&mut self) -> Result<()> {
        if self.minimized {
            return Ok(());
        }
        if !self.dev.target.is_available()
            && self.dev.target.refetch_index(&mut self.dev.backend)?.is_none()
        {
            return Ok(());
        }

        self.dev.begin(Some(self.pip.pipeline()))?;
        self.record_frame()?;
        self.dev.submit()?;
        self.dev.backend.present()?;

        let value = self.dev.frame_fence.signal_and_wait(&mut self.dev.backend)?;
        if self.dev.target.refetch_index(&mut self.dev.backend)?.is_none() {
            log::info!("Surface has no area, skipping frames until it comes back");
        }

        self.frm.stats.frames_rendered += 1;
        self.frm.stats.last_fence_value = value;
        log::debug!("Frame {} done (fence {})", self.frm.stats.frames_rendered, value);
        Ok(())
    }

    /// Handles a window size change. A zero-sized window only pauses rendering.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let extent = Extent::new(width, height);
        let outcome = self.dev.target.resize(
            &mut self.dev.backend,
            &mut self.dev.frame_fence,
            extent,
        )?;

        match outcome {
            ResizeOutcome::Minimized => {
                if !self.minimized {
                    log::info!("Window minimized, pausing rendering");
                }
                self.minimized = true;
            }
            ResizeOutcome::Unchanged | ResizeOutcome::Resized => {
                if self.minimized {
                    log::info!("Window restored at {}", extent);
                }
                self.minimized = false;
            }
        }

        if outcome == ResizeOutcome::Resized {
            // Projection depends on the aspect ratio
            self.update()?;
        }
        Ok(())
    }

    fn record_frame(&mut self) -> Result<()> {
        let list = &mut self.dev.command_list;
        let target = &mut self.dev.target;
        let extent = target.extent();

        list.record(Command::SetViewport(Viewport::covering(extent)))?;
        list.record(Command::SetScissor(ScissorRect::covering(extent)))?;

        list.record_barrier(target.transition_current(ResourceState::RenderTarget))?;

        let view = target.current_view()?;
        list.record(Command::SetRenderTarget(view))?;
        list.record(Command::ClearRenderTarget {
            view,
            color: self.config.clear_color,
        })?;

        let constants_parameter = self
            .pip
            .parameter_of(BindingCategory::ConstantBuffer)
            .ok_or_eyre("Binding layout has no constant buffer table")?;
        let texture_parameter = self
            .pip
            .parameter_of(BindingCategory::ShaderResource)
            .ok_or_eyre("Binding layout has no shader resource table")?;
        let sampler_parameter = self
            .pip
            .parameter_of(BindingCategory::Sampler)
            .ok_or_eyre("Binding layout has no sampler table")?;

        list.record(Command::SetBindingLayout(self.pip.layout()))?;
        list.record(Command::SetDescriptorHeaps(vec![
            self.res.cbv_srv_heap.handle(),
            self.res.sampler_heap.handle(),
        ]))?;
        list.record(Command::SetDescriptorTable {
            parameter: texture_parameter,
            base: self.res.texture_view()?,
        })?;
        list.record(Command::SetDescriptorTable {
            parameter: sampler_parameter,
            base: self.res.sampler_view()?,
        })?;
        self.res.geometry.bind(list)?;

        for object in 0..self.frm.object_count() {
            list.record(Command::SetDescriptorTable {
                parameter: constants_parameter,
                base: self.res.object_view(object)?,
            })?;
            self.res.geometry.draw(list)?;
        }

        list.record_barrier(target.transition_current(ResourceState::Present))?;
        Ok(())
    }
}

impl<B: RenderBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(error) = self.dev.drain() {
            log::error!("Failed to wait for the GPU before shutdown: {:?}", error);
        }
    }
}
