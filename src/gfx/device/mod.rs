//! GL-shaped render device abstraction
//!
//! Resource wrappers talk to the GPU exclusively through [`RenderDevice`]: an
//! object model of small integer handles, explicit uploads and recorded draw
//! calls. [`WgpuDevice`] maps that model onto wgpu; tests use a recording
//! double so wrapper behaviour can be checked without a GPU.

pub mod wgpu_device;

#[cfg(test)]
pub mod recording;

use std::num::NonZeroU32;
use std::rc::Rc;

use crate::error::GfxResult;
use crate::gfx::shader::ProgramLayout;

pub use wgpu_device::WgpuDevice;

/// Opaque identifier naming one native resource. Zero is never a valid handle.
pub type RawHandle = NonZeroU32;

/// Device shared by every wrapper created on it
pub type SharedDevice = Rc<dyn RenderDevice>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    VertexArray,
    Renderbuffer,
    Framebuffer,
    Program,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
    Uniform,
}

/// Upload frequency hint. wgpu has no equivalent, it is kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    R32Float,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => 4,
            TextureFormat::R32Float | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

/// A texture ready for upload: level 0 first, one entry per mip level.
///
/// An empty `levels` list allocates storage without initial contents.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_level_count: u32,
    pub levels: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Sint32,
}

impl VertexFormat {
    pub fn size(self) -> u64 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Sint32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }

    /// Float vector with `components` lanes
    pub fn float(components: u32) -> Option<Self> {
        match components {
            1 => Some(VertexFormat::Float32),
            2 => Some(VertexFormat::Float32x2),
            3 => Some(VertexFormat::Float32x3),
            4 => Some(VertexFormat::Float32x4),
            _ => None,
        }
    }

    pub fn to_wgpu(self) -> wgpu::VertexFormat {
        match self {
            VertexFormat::Float32 => wgpu::VertexFormat::Float32,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            VertexFormat::Uint32 => wgpu::VertexFormat::Uint32,
            VertexFormat::Sint32 => wgpu::VertexFormat::Sint32,
        }
    }
}

/// Binding of one shader input location to a byte range of a buffer.
/// A non-zero divisor advances the attribute per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub index: u32,
    pub format: VertexFormat,
    pub stride: u32,
    pub offset: u64,
    pub divisor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

impl Topology {
    pub fn to_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            Topology::Points => wgpu::PrimitiveTopology::PointList,
            Topology::Lines => wgpu::PrimitiveTopology::LineList,
            Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
            Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }

    pub fn is_strip(self) -> bool {
        matches!(self, Topology::LineStrip | Topology::TriangleStrip)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }

    pub fn to_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::U16 => wgpu::IndexFormat::Uint16,
            IndexFormat::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Arrays {
        count: u32,
    },
    Indexed {
        buffer: RawHandle,
        format: IndexFormat,
        count: u32,
    },
}

/// One draw against a vertex array. `instances == 0` is a plain draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub vao: RawHandle,
    pub topology: Topology,
    pub kind: DrawKind,
    pub instances: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentPoint {
    Color(u32),
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSource {
    Texture(RawHandle),
    Renderbuffer(RawHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// No attachments at all
    MissingAttachment,
    /// An attachment has no storage, or its format does not fit the point
    IncompleteAttachment,
    /// Attachments disagree on their extent
    DimensionMismatch,
}

/// What the completeness check needs to know about one attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentInfo {
    pub point: AttachmentPoint,
    /// `None` when the attached object has no storage yet
    pub extent: Option<(u32, u32)>,
    pub format: Option<TextureFormat>,
}

/// Framebuffer completeness over a set of attachments
pub fn attachment_status(attachments: &[AttachmentInfo]) -> FramebufferStatus {
    if attachments.is_empty() {
        return FramebufferStatus::MissingAttachment;
    }

    let mut extent = None;
    for attachment in attachments {
        let (Some(size), Some(format)) = (attachment.extent, attachment.format) else {
            return FramebufferStatus::IncompleteAttachment;
        };
        let depth_point = attachment.point == AttachmentPoint::Depth;
        if depth_point != format.is_depth() {
            return FramebufferStatus::IncompleteAttachment;
        }
        match extent {
            None => extent = Some(size),
            Some(existing) if existing != size => return FramebufferStatus::DimensionMismatch,
            Some(_) => {}
        }
    }

    FramebufferStatus::Complete
}

/// One compiled stage handed to the device
#[derive(Debug, Clone, Copy)]
pub struct StageModule<'a> {
    pub source: &'a str,
    pub entry_point: &'a str,
}

/// A linked program: stage sources plus the reflected interface
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub vertex: StageModule<'a>,
    pub fragment: Option<StageModule<'a>>,
    pub layout: &'a ProgramLayout,
}

/// Texture binding slot: the texture global and its paired sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    pub texture: u32,
    pub sampler: Option<u32>,
}

/// The GL-style operations resource wrappers are built on
///
/// Handles are created lazily by the wrappers and destroyed exactly once.
/// Drawing operations are recorded and executed when the frame is flushed.
pub trait RenderDevice {
    fn create_handle(&self, kind: ResourceKind) -> GfxResult<RawHandle>;
    fn destroy_handle(&self, kind: ResourceKind, handle: RawHandle);

    fn buffer_data(
        &self,
        buffer: RawHandle,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> GfxResult<()>;
    fn buffer_sub_data(&self, buffer: RawHandle, offset: u64, data: &[u8]) -> GfxResult<()>;

    fn texture_image(&self, texture: RawHandle, image: &TextureImage) -> GfxResult<()>;
    fn renderbuffer_storage(
        &self,
        renderbuffer: RawHandle,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> GfxResult<()>;

    fn vertex_attribute(
        &self,
        vao: RawHandle,
        buffer: RawHandle,
        attribute: &VertexAttribute,
    ) -> GfxResult<()>;

    fn framebuffer_attach(
        &self,
        framebuffer: RawHandle,
        point: AttachmentPoint,
        source: AttachmentSource,
    ) -> GfxResult<()>;
    fn framebuffer_status(&self, framebuffer: RawHandle) -> FramebufferStatus;
    /// `None` selects the window surface
    fn bind_framebuffer(&self, framebuffer: Option<RawHandle>);

    fn create_program(&self, desc: &ProgramDesc) -> GfxResult<RawHandle>;
    fn use_program(&self, program: Option<RawHandle>);
    fn set_uniform(&self, program: RawHandle, binding: u32, bytes: &[u8]);
    fn bind_texture(&self, program: RawHandle, binding: TextureBinding, texture: RawHandle);

    fn clear(&self, color: Option<[f32; 4]>, depth: Option<f32>);
    fn draw(&self, call: &DrawCall) -> GfxResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(index: u32, extent: Option<(u32, u32)>) -> AttachmentInfo {
        AttachmentInfo {
            point: AttachmentPoint::Color(index),
            extent,
            format: extent.map(|_| TextureFormat::Rgba8Unorm),
        }
    }

    #[test]
    fn test_empty_framebuffer_is_missing_attachment() {
        assert_eq!(attachment_status(&[]), FramebufferStatus::MissingAttachment);
    }

    #[test]
    fn test_matching_color_and_depth_is_complete() {
        let depth = AttachmentInfo {
            point: AttachmentPoint::Depth,
            extent: Some((64, 32)),
            format: Some(TextureFormat::Depth32Float),
        };
        assert_eq!(
            attachment_status(&[color(0, Some((64, 32))), depth]),
            FramebufferStatus::Complete
        );
    }

    #[test]
    fn test_unallocated_attachment_is_incomplete() {
        assert_eq!(
            attachment_status(&[color(0, None)]),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn test_depth_format_on_color_point_is_incomplete() {
        let wrong = AttachmentInfo {
            point: AttachmentPoint::Color(0),
            extent: Some((8, 8)),
            format: Some(TextureFormat::Depth32Float),
        };
        assert_eq!(
            attachment_status(&[wrong]),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn test_mismatched_extents() {
        assert_eq!(
            attachment_status(&[color(0, Some((8, 8))), color(1, Some((16, 8)))]),
            FramebufferStatus::DimensionMismatch
        );
    }
}
