pub mod config;

use std::sync::Arc;
use color_eyre::eyre::{OptionExt, Report};
use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::app::config::AppConfig;
use crate::renderer::backend::vulkan::VulkanBackend;
use crate::renderer::core::Extent;
use crate::renderer::{RenderAssets, Renderer};

pub struct App {
    config: AppConfig,
    // Dropped before the window its surface was created from
    renderer: Option<Renderer<VulkanBackend>>,
    window: Option<Arc<Window>>,

    /// First fatal error, returned from `run` once the event loop stopped
    error: Option<Report>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            error: None,
        }
    }

    /// Runs the event loop until the window is closed or a frame fails
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);
        self.window = Some(window.clone());

        let assets = RenderAssets::load(&self.config.shader_path, &self.config.texture_path)?;
        let backend = VulkanBackend::new(&window, &self.config.render)?;
        let size = window.inner_size();
        let renderer = Renderer::new(
            backend,
            Extent::new(size.width, size.height),
            self.config.render.clone(),
            &assets,
        )?;

        self.renderer = Some(renderer);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let renderer = self.renderer.as_mut().ok_or_eyre("Redraw before the renderer exists")?;
        renderer.update()?;
        renderer.render()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        if self.error.is_none() {
            self.error = Some(err);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().is_none_or(|window| window.id() != window_id) {
            return;
        }

        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => match self.renderer.as_mut() {
                Some(renderer) => renderer.resize(size.width, size.height),
                None => Ok(()),
            },
            WindowEvent::RedrawRequested => self.redraw(),
            _ => Ok(()),
        };

        if let Err(err) = result {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Drains the GPU and destroys every object while the window still exists
        self.renderer = None;
    }
}
