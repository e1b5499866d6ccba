//! Vertex arrays with their vertex, instance and index buffers

use bytemuck::Pod;

use crate::error::{GfxError, GfxResult};
use crate::gfx::buffer::Buffer;
use crate::gfx::device::{
    BufferTarget, BufferUsage, DrawCall, DrawKind, IndexFormat, SharedDevice, Topology,
    VertexAttribute,
};
use crate::gfx::handle::VertexArrayObject;

/// Index data in any of the element widths a mesh accepts
#[derive(Debug, Clone, Copy)]
pub enum IndexData<'a> {
    /// Widened to 16 bit on upload
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    fn len(&self) -> usize {
        match self {
            IndexData::U8(v) => v.len(),
            IndexData::U16(v) => v.len(),
            IndexData::U32(v) => v.len(),
        }
    }
}

/// One indexed primitive
pub trait Element {
    const TOPOLOGY: Topology;
    const INDICES_PER_ELEMENT: usize;
    fn push_indices(&self, out: &mut Vec<u32>);
}

impl Element for [u32; 2] {
    const TOPOLOGY: Topology = Topology::Lines;
    const INDICES_PER_ELEMENT: usize = 2;
    fn push_indices(&self, out: &mut Vec<u32>) {
        out.extend_from_slice(self);
    }
}

impl Element for [u32; 3] {
    const TOPOLOGY: Topology = Topology::Triangles;
    const INDICES_PER_ELEMENT: usize = 3;
    fn push_indices(&self, out: &mut Vec<u32>) {
        out.extend_from_slice(self);
    }
}

/// Quads are not a native topology; each one becomes two triangles
impl Element for [u32; 4] {
    const TOPOLOGY: Topology = Topology::Triangles;
    const INDICES_PER_ELEMENT: usize = 6;
    fn push_indices(&self, out: &mut Vec<u32>) {
        let [a, b, c, d] = *self;
        out.extend_from_slice(&[a, b, c, a, c, d]);
    }
}

pub struct Mesh {
    device: SharedDevice,
    vao: VertexArrayObject,
    vertex_buffer: Buffer,
    instance_buffer: Buffer,
    index_buffer: Option<Buffer>,
    topology: Topology,
    index_format: Option<IndexFormat>,
    index_count: u32,
    vertex_stride: u32,
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("vao", &self.vao)
            .field("vertex_buffer", &self.vertex_buffer)
            .field("instance_buffer", &self.instance_buffer)
            .field("index_buffer", &self.index_buffer)
            .field("topology", &self.topology)
            .field("index_format", &self.index_format)
            .field("index_count", &self.index_count)
            .field("vertex_stride", &self.vertex_stride)
            .finish_non_exhaustive()
    }
}

impl Mesh {
    pub fn new(device: &SharedDevice) -> Self {
        Self {
            device: device.clone(),
            vao: VertexArrayObject::new(device),
            vertex_buffer: Buffer::new(device, BufferTarget::Vertex),
            instance_buffer: Buffer::new(device, BufferTarget::Vertex),
            index_buffer: None,
            topology: Topology::Triangles,
            index_format: None,
            index_count: 0,
            vertex_stride: 0,
        }
    }

    pub fn set_vertex_data(&mut self, bytes: &[u8], usage: BufferUsage) -> GfxResult<()> {
        self.vertex_buffer.set_data(bytes, usage)
    }

    pub fn set_vertices<T: Pod>(&mut self, vertices: &[T], usage: BufferUsage) -> GfxResult<()> {
        self.vertex_buffer.set_slice(vertices, usage)
    }

    pub fn set_instance_data(&mut self, bytes: &[u8], usage: BufferUsage) -> GfxResult<()> {
        self.instance_buffer.set_data(bytes, usage)
    }

    /// Rewrites part of the vertex buffer in place
    pub fn update_vertex_data(&mut self, offset: u64, bytes: &[u8]) -> GfxResult<()> {
        self.vertex_buffer.set_sub_data(offset, bytes)
    }

    /// Uploads indices and switches the mesh to indexed drawing
    pub fn set_index_data(
        &mut self,
        topology: Topology,
        indices: IndexData,
        usage: BufferUsage,
    ) -> GfxResult<()> {
        let buffer = self
            .index_buffer
            .get_or_insert_with(|| Buffer::new(&self.device, BufferTarget::Index));

        let format = match indices {
            IndexData::U8(values) => {
                let widened: Vec<u16> = values.iter().map(|&i| u16::from(i)).collect();
                buffer.set_slice(&widened, usage)?;
                IndexFormat::U16
            }
            IndexData::U16(values) => {
                buffer.set_slice(values, usage)?;
                IndexFormat::U16
            }
            IndexData::U32(values) => {
                buffer.set_slice(values, usage)?;
                IndexFormat::U32
            }
        };

        self.topology = topology;
        self.index_format = Some(format);
        self.index_count = indices.len() as u32;
        Ok(())
    }

    pub fn set_indices_u8(&mut self, topology: Topology, indices: &[u8]) -> GfxResult<()> {
        self.set_index_data(topology, IndexData::U8(indices), BufferUsage::Static)
    }

    pub fn set_indices_u16(&mut self, topology: Topology, indices: &[u16]) -> GfxResult<()> {
        self.set_index_data(topology, IndexData::U16(indices), BufferUsage::Static)
    }

    pub fn set_indices_u32(&mut self, topology: Topology, indices: &[u32]) -> GfxResult<()> {
        self.set_index_data(topology, IndexData::U32(indices), BufferUsage::Static)
    }

    /// Indexes the vertex buffer with lines, triangles or quads
    pub fn set_elements<E: Element>(&mut self, elements: &[E]) -> GfxResult<()> {
        let mut indices = Vec::with_capacity(elements.len() * E::INDICES_PER_ELEMENT);
        for element in elements {
            element.push_indices(&mut indices);
        }
        self.set_indices_u32(E::TOPOLOGY, &indices)
    }

    pub fn set_lines(&mut self, lines: &[[u32; 2]]) -> GfxResult<()> {
        self.set_elements(lines)
    }

    pub fn set_triangles(&mut self, triangles: &[[u32; 3]]) -> GfxResult<()> {
        self.set_elements(triangles)
    }

    pub fn set_quads(&mut self, quads: &[[u32; 4]]) -> GfxResult<()> {
        self.set_elements(quads)
    }

    /// Drops any index buffer and draws the vertex buffer in order
    pub fn set_non_indexed(&mut self, topology: Topology) {
        self.index_buffer = None;
        self.index_format = None;
        self.index_count = 0;
        self.topology = topology;
    }

    /// Binds one shader input location to a range of the vertex buffer.
    /// Attributes with a divisor read from the instance buffer instead.
    pub fn set_attribute(&mut self, attribute: VertexAttribute) -> GfxResult<()> {
        let buffer = if attribute.divisor > 0 {
            &self.instance_buffer
        } else {
            &self.vertex_buffer
        };
        if buffer.is_empty() {
            return Err(GfxError::AttributeBeforeData {
                index: attribute.index,
            });
        }

        let vao = self.vao.ensure()?;
        self.device
            .vertex_attribute(vao, buffer.handle()?, &attribute)?;
        if attribute.divisor == 0 {
            self.vertex_stride = attribute.stride;
        }
        Ok(())
    }

    /// The draw `draw_elements` would issue, or `None` when there is nothing to draw
    pub fn draw_call(&self, instances: u32) -> GfxResult<Option<DrawCall>> {
        if self.vertex_buffer.is_empty() {
            return Ok(None);
        }

        let kind = match (&self.index_buffer, self.index_format) {
            (Some(buffer), Some(format)) => DrawKind::Indexed {
                buffer: buffer.handle()?,
                format,
                count: self.index_count,
            },
            _ => {
                if self.vertex_stride == 0 {
                    return Ok(None);
                }
                DrawKind::Arrays {
                    count: (self.vertex_buffer.size() / u64::from(self.vertex_stride)) as u32,
                }
            }
        };

        Ok(Some(DrawCall {
            vao: self.vao.ensure()?,
            topology: self.topology,
            kind,
            instances,
        }))
    }

    /// Issues one draw. `instances == 0` is a plain, non-instanced draw.
    pub fn draw_elements(&self, instances: u32) -> GfxResult<()> {
        match self.draw_call(instances)? {
            Some(call) => self.device.draw(&call),
            None => Ok(()),
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_format(&self) -> Option<IndexFormat> {
        self.index_format
    }
}
