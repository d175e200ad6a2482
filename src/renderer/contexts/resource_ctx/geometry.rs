use color_eyre::Result;
use crate::renderer::backend::desc::BufferUsage;
use crate::renderer::backend::RenderBackend;
use crate::renderer::contexts::resource_ctx::uploader;
use crate::renderer::core::command_list::{Command, CommandList, IndexBufferView, VertexBufferView};
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::shader_data::PerVertexData;

/// Vertex and optional index buffer of a mesh, with the views needed to bind them
pub struct GeometryBuffers {
    vertex_view: VertexBufferView,
    index_view: Option<IndexBufferView>,
    vertex_count: u32,
    index_count: u32,
}

impl GeometryBuffers {
    pub fn upload<B: RenderBackend>(backend: &mut B, mesh: &Mesh) -> Result<Self> {
        let vertices = mesh
            .vertices
            .iter()
            .map(|vertex| vertex.as_shader_data())
            .collect::<Vec<PerVertexData>>();
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let vertex_buffer = uploader::create_upload_buffer(backend, vertex_bytes, BufferUsage::Vertex)?;
        let vertex_view = VertexBufferView {
            buffer: vertex_buffer.handle(),
            stride: size_of::<PerVertexData>() as u32,
            size: vertex_bytes.len() as u64,
        };

        let index_view = match &mesh.indices {
            Some(indices) => {
                let index_bytes: &[u8] = bytemuck::cast_slice(indices);
                let index_buffer = uploader::create_upload_buffer(backend, index_bytes, BufferUsage::Index)?;
                Some(IndexBufferView {
                    buffer: index_buffer.handle(),
                    size: index_bytes.len() as u64,
                })
            }
            None => None,
        };

        Ok(Self {
            vertex_view,
            index_view,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.as_ref().map_or(0, |indices| indices.len() as u32),
        })
    }

    pub fn is_indexed(&self) -> bool {
        self.index_view.is_some()
    }

    pub fn bind(&self, list: &mut CommandList) -> Result<()> {
        list.record(Command::SetVertexBuffer(self.vertex_view))?;
        if let Some(index_view) = self.index_view {
            list.record(Command::SetIndexBuffer(index_view))?;
        }
        Ok(())
    }

    pub fn draw(&self, list: &mut CommandList) -> Result<()> {
        let command = if self.is_indexed() {
            Command::DrawIndexed {
                index_count: self.index_count,
                instance_count: 1,
            }
        } else {
            Command::Draw {
                vertex_count: self.vertex_count,
                instance_count: 1,
            }
        };
        list.record(command)
    }
}
