// src/lib.rs
//! gfx-app
//!
//! An interactive graphics sample on wgpu and winit: GL-style resource
//! wrappers, a fly camera, Kelvinlet sculpting of a plane and an optional
//! VR runtime bridge.

pub mod app;
pub mod config;
pub mod error;
pub mod gfx;
pub mod input;
pub mod math;
pub mod performance;
pub mod sculpt;
pub mod ui;
pub mod vr;

pub use app::GfxApp;
pub use config::AppConfig;

/// Creates the application with the compiled-in defaults
pub fn default() -> GfxApp {
    GfxApp::new(AppConfig::default())
}
