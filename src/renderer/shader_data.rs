use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Data unique to each object, one slot of the constant buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct PerObjectData {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

/// Data unique to each vertex passed as elements into a vertex buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PerVertexData {
    pub position: Vec3,
    pub texcoord: Vec2,
}
