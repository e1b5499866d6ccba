//! Error types shared across the graphics layer and the application
//!
//! Every fallible GPU-facing operation returns one of these instead of
//! silently continuing with a dead handle.

use thiserror::Error;

use crate::gfx::device::{FramebufferStatus, ResourceKind};
use crate::gfx::shader::ShaderStage;

/// Errors raised by resource wrappers and the render device
#[derive(Error, Debug)]
pub enum GfxError {
    #[error("failed to create {kind:?} handle: {reason}")]
    HandleCreation { kind: ResourceKind, reason: String },
    #[error("unknown {kind:?} handle {handle}")]
    UnknownHandle { kind: ResourceKind, handle: u32 },
    #[error("write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },
    #[error("vertex attribute {index} configured before any vertex data was uploaded")]
    AttributeBeforeData { index: u32 },
    #[error("draw issued with no program bound")]
    NoProgramBound,
    #[error("program reads vertex input @location({location}) the vertex array does not provide")]
    MissingVertexInput { location: u32 },
    #[error("framebuffer incomplete: {0:?}")]
    FramebufferIncomplete(FramebufferStatus),
    #[error("unsupported texture upload: {0}")]
    UnsupportedFormat(String),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("pixel data holds {actual} bytes, expected {expected}")]
    PixelDataSize { expected: usize, actual: usize },
    #[error("failed to load image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Shader compile and link failures
///
/// Both variants carry the diagnostic text produced by the compiler so it
/// can be shown to the user verbatim.
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("{stage:?} shader failed to compile:\n{diagnostic}")]
    Compile {
        stage: ShaderStage,
        diagnostic: String,
        shader_source: String,
    },
    #[error("program failed to link:\n{log}")]
    Link { log: String },
}

/// Startup failures of the windowed application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable graphics adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create graphics device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
    #[error(transparent)]
    Gfx(#[from] GfxError),
    #[error(transparent)]
    Vr(#[from] crate::vr::VrError),
}

pub type GfxResult<T> = Result<T, GfxError>;
