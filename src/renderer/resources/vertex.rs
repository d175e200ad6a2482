use std::mem::offset_of;
use glam::{Vec2, Vec3};
use crate::renderer::backend::desc::{InputElement, InputRate, VertexFormat};
use crate::renderer::shader_data::PerVertexData;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub texcoord: Vec2,
}

impl Vertex {
    pub fn as_shader_data(&self) -> PerVertexData {
        PerVertexData {
            position: self.position,
            texcoord: self.texcoord,
        }
    }

    /// Layout of `PerVertexData` as seen by the vertex shader's `@location`s
    pub fn input_layout() -> [InputElement; 2] {
        [
            InputElement {
                semantic: "POSITION",
                format: VertexFormat::Float32x3,
                offset: offset_of!(PerVertexData, position) as u32,
                rate: InputRate::PerVertex,
            },
            InputElement {
                semantic: "TEXCOORD",
                format: VertexFormat::Float32x2,
                offset: offset_of!(PerVertexData, texcoord) as u32,
                rate: InputRate::PerVertex,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_layout_matches_vertex_size() {
        let layout = Vertex::input_layout();
        let end = layout
            .iter()
            .map(|element| element.offset + element.format.size())
            .max()
            .unwrap();
        assert_eq!(end as usize, size_of::<PerVertexData>());
        assert_eq!(layout[1].offset, 12);
    }
}
