//! Frame presentation and the built-in programs

pub mod blit;
pub mod render_engine;
pub mod shaders;

pub use blit::Blit;
pub use render_engine::{FrameStatus, RenderEngine};
