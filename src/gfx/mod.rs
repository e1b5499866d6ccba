//! # Graphics Module
//!
//! GL-shaped resource wrappers over a pluggable render device, plus the
//! scene, camera and frame plumbing built on them.
//!
//! ## Architecture Overview
//!
//! - **Device** ([`device`]) - the [`RenderDevice`](device::RenderDevice) seam and its wgpu implementation
//! - **Resources** ([`handle`], [`buffer`], [`texture`], [`framebuffer`], [`shader`], [`mesh`]) -
//!   owned wrappers around device handles, released on drop
//! - **Geometry** ([`geometry`]) - plane, cube and fullscreen quad generators and interleaving
//! - **Camera** ([`camera`]) - first-person fly camera
//! - **Rendering** ([`rendering`]) - surface management, frame submission and the mirror blit
//! - **Scene** ([`scene`]) - the sculpt plane and the objects drawn around it
//!
//! ## Usage
//!
//! ```no_run
//! use gfx_app::gfx::{geometry::{make_cube, make_mesh_from_geometry}, device::BufferUsage};
//!
//! // let mesh = make_mesh_from_geometry(engine.device(), &make_cube(), BufferUsage::Static)?;
//! // program.bind();
//! // mesh.draw_elements(0)?;
//! ```

pub mod buffer;
pub mod camera;
pub mod device;
pub mod framebuffer;
pub mod geometry;
pub mod handle;
pub mod mesh;
pub mod rendering;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod texture;

pub use camera::FlyCamera;
pub use rendering::render_engine::RenderEngine;
