//! "Resources" refers to CPU-side assets that end up on the GPU: meshes, textures and
//! shader programs. They know nothing about the backend they get uploaded to.

pub mod mesh;
pub mod shader;
pub mod texture;
pub mod vertex;
