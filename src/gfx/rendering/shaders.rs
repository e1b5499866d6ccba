//! WGSL sources of the built-in programs

pub const SCENE_VERTEX: &str = include_str!("shaders/scene_vertex.wgsl");
pub const SCENE_FRAGMENT: &str = include_str!("shaders/scene_fragment.wgsl");

/// Fullscreen textured quad
pub const BLIT_VERTEX: &str = include_str!("shaders/blit_vertex.wgsl");
pub const BLIT_FRAGMENT: &str = include_str!("shaders/blit_fragment.wgsl");
