//! Head-mounted display bridge.
//!
//! The VR runtime itself lives behind [`VrRuntime`]; [`Hmd`] turns what it
//! reports into head, eye and controller poses once per frame and hands the
//! rendered eye images back to the compositor.

pub mod hmd;

use cgmath::Matrix4;
use thiserror::Error;

use crate::gfx::device::RawHandle;

pub use hmd::{Controller, ControllerModel, Hmd, ModelLoadPolicy};

/// Upper bound on device indices a runtime reports poses for
pub const MAX_TRACKED_DEVICES: usize = 64;

/// Render model loaded for both controllers
pub const CONTROLLER_MODEL_NAME: &str = "vr_controller_vive_1_5";

/// Button mask bit of the trigger (first analog axis)
pub const TRIGGER_BUTTON_MASK: u64 = 1 << 33;

#[derive(Error, Debug)]
pub enum VrError {
    #[error("VR runtime failed to initialize: {0}")]
    Init(String),
    #[error("render model {name} was not ready after {attempts} attempts")]
    ModelLoadTimeout { name: String, attempts: u32 },
    #[error("failed to load render model {name}: {reason}")]
    ModelLoad { name: String, reason: String },
    #[error("failed to fetch device poses: {0}")]
    Poses(String),
    #[error("compositor rejected {eye:?} eye: {reason}")]
    Compositor { eye: Eye, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Invalid,
    Hmd,
    Controller,
    TrackingReference,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Invalid,
    LeftHand,
    RightHand,
}

/// Runtime notifications, drained each frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VrEvent {
    DeviceActivated(u32),
    DeviceDeactivated(u32),
    DeviceUpdated(u32),
    Other { kind: u32, device: u32 },
}

/// Device-to-world transform as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPose {
    /// Row-major 3x4
    pub device_to_world: [[f32; 4]; 3],
    pub valid: bool,
}

impl Default for TrackedPose {
    fn default() -> Self {
        Self {
            device_to_world: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            valid: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub buttons_pressed: u64,
    pub buttons_touched: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderModel {
    pub vertices: Vec<RenderModelVertex>,
    /// Triangle list
    pub indices: Vec<u16>,
    pub texture_id: i32,
}

/// RGBA8 texture of a render model
#[derive(Debug, Clone, PartialEq)]
pub struct RenderModelTexture {
    pub width: u16,
    pub height: u16,
    pub rgba: Vec<u8>,
}

/// The external VR runtime
///
/// The loaders are non-blocking: `Ok(None)` means the asset is still being
/// loaded and the call should be repeated later.
pub trait VrRuntime {
    fn poll_event(&mut self) -> Option<VrEvent>;

    /// Blocks until the compositor is ready for the next frame
    fn wait_get_poses(&mut self, poses: &mut [TrackedPose]) -> Result<(), VrError>;

    fn device_class(&self, index: u32) -> DeviceClass;
    fn controller_role(&self, index: u32) -> ControllerRole;
    fn controller_state(&self, index: u32) -> Option<ControllerState>;

    fn load_render_model(&mut self, name: &str) -> Result<Option<RenderModel>, VrError>;
    fn load_texture(&mut self, texture_id: i32) -> Result<Option<RenderModelTexture>, VrError>;

    fn recommended_render_target_size(&self) -> (u32, u32);
    /// Row-major 3x4 eye-to-head transform
    fn eye_to_head(&self, eye: Eye) -> [[f32; 4]; 3];
    /// Clip-space projection with a 0..1 depth range
    fn projection(&self, eye: Eye, near: f32, far: f32) -> Matrix4<f32>;

    fn submit(&mut self, eye: Eye, texture: RawHandle) -> Result<(), VrError>;
}
