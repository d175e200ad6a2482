use std::path::PathBuf;
use crate::renderer::config::RenderConfig;

/// Window and asset settings of the demo, plus the renderer's own configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub shader_path: PathBuf,
    pub texture_path: PathBuf,
    pub render: RenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "texcube".to_string(),
            width: 1280,
            height: 720,
            shader_path: PathBuf::from("assets/shader.wgsl"),
            texture_path: PathBuf::from("assets/texture.png"),
            render: RenderConfig::default(),
        }
    }
}
