//! "Core" refers to the backend-agnostic bookkeeping of the renderer: resource states,
//! descriptor slots, fences and command lists. Nothing in here talks to a GPU directly;
//! every GPU call goes through a `RenderBackend`.

pub mod adapter;
pub mod command_list;
pub mod descriptor;
pub mod fence;
pub mod state;

/// Size of a back-buffer or texture in pixels
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-sized client area
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
