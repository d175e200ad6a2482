use glam::{Vec2, Vec3};
use crate::renderer::resources::vertex::Vertex;

#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Option<Vec<u32>>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Option<Vec<u32>>) -> Self {
        Self {
            vertices,
            indices,
        }
    }

    /// Single non-indexed triangle facing +Z
    pub fn new_triangle() -> Self {
        let vertices = vec![
            Vertex { // Bottom left
                position: [-0.5, -0.5, 0.0].into(),
                texcoord: [0.0, 1.0].into(),
            },
            Vertex { // Bottom right
                position: [0.5, -0.5, 0.0].into(),
                texcoord: [1.0, 1.0].into(),
            },
            Vertex { // Top
                position: [0.0, 0.5, 0.0].into(),
                texcoord: [0.5, 0.0].into(),
            },
        ];

        Self::new(vertices, None)
    }

    /// Unit cube centered on the origin, four vertices per face so every face
    /// maps the whole texture
    pub fn new_cube() -> Self {
        // Corners of each face seen from outside: bottom left, bottom right, top right, top left
        const FACES: [[[f32; 3]; 4]; 6] = [
            // +Z
            [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]],
            // -Z
            [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]],
            // +X
            [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]],
            // -X
            [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]],
            // +Y
            [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]],
            // -Y
            [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
        ];
        const TEXCOORDS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for corners in FACES {
            let base = vertices.len() as u32;
            vertices.extend(corners.iter().zip(TEXCOORDS).map(|(position, texcoord)| Vertex {
                position: Vec3::from(*position),
                texcoord: Vec2::from(texcoord),
            }));
            // Counter-clockwise winding order
            indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(vertices, Some(indices))
    }

    /// Number of vertices a draw call walks through
    pub fn draw_count(&self) -> u32 {
        match &self.indices {
            Some(indices) => indices.len() as u32,
            None => self.vertices.len() as u32,
        }
    }
}
