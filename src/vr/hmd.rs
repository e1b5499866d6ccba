use std::thread;
use std::time::Duration;

use cgmath::{vec2, Matrix4};

use super::{
    ControllerRole, DeviceClass, Eye, Hand, RenderModel, RenderModelTexture, TrackedPose,
    VrError, VrEvent, VrRuntime, CONTROLLER_MODEL_NAME, MAX_TRACKED_DEVICES,
    TRIGGER_BUTTON_MASK,
};
use crate::gfx::device::RawHandle;
use crate::gfx::geometry::Geometry;
use crate::math::Pose;

/// How long [`Hmd::new`] keeps polling for the controller render model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLoadPolicy {
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for ModelLoadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 500,
            retry_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Controller {
    pub pose: Pose,
    pub trigger: bool,
    /// Whether a pose was reported this frame
    pub tracked: bool,
}

/// Controller mesh and its RGBA8 texture
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerModel {
    pub geometry: Geometry,
    pub texture_width: u32,
    pub texture_height: u32,
    pub rgba: Vec<u8>,
}

impl ControllerModel {
    fn new(model: RenderModel, texture: RenderModelTexture) -> Self {
        let geometry = Geometry {
            vertices: model.vertices.iter().map(|v| v.position.into()).collect(),
            normals: model.vertices.iter().map(|v| v.normal.into()).collect(),
            tex_coords: model
                .vertices
                .iter()
                .map(|v| vec2(v.tex_coord[0], v.tex_coord[1]))
                .collect(),
            triangles: model
                .indices
                .chunks_exact(3)
                .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
                .collect(),
        };
        Self {
            geometry,
            texture_width: texture.width as u32,
            texture_height: texture.height as u32,
            rgba: texture.rgba,
        }
    }
}

/// Per-frame view of the headset and both controllers
pub struct Hmd {
    runtime: Box<dyn VrRuntime>,
    poses: Vec<TrackedPose>,
    head: Pose,
    left: Controller,
    right: Controller,
    controller_model: ControllerModel,
    render_target_size: (u32, u32),
}

impl Hmd {
    /// Loads the controller model, failing once `policy` is exhausted
    pub fn new(mut runtime: Box<dyn VrRuntime>, policy: &ModelLoadPolicy) -> Result<Self, VrError> {
        let render_target_size = runtime.recommended_render_target_size();
        log::info!(
            "VR render target {}x{}",
            render_target_size.0,
            render_target_size.1
        );

        let controller_model = load_controller_model(runtime.as_mut(), policy)?;
        log::info!(
            "Loaded {} ({} vertices, {}x{} texture)",
            CONTROLLER_MODEL_NAME,
            controller_model.geometry.vertex_count(),
            controller_model.texture_width,
            controller_model.texture_height
        );

        Ok(Self {
            runtime,
            poses: vec![TrackedPose::default(); MAX_TRACKED_DEVICES],
            head: Pose::default(),
            left: Controller::default(),
            right: Controller::default(),
            controller_model,
            render_target_size,
        })
    }

    /// Drains runtime events, then blocks for fresh poses and classifies them
    pub fn update(&mut self) -> Result<(), VrError> {
        while let Some(event) = self.runtime.poll_event() {
            match event {
                VrEvent::DeviceActivated(device) => log::info!("VR device {device} attached"),
                VrEvent::DeviceDeactivated(device) => log::info!("VR device {device} detached"),
                VrEvent::DeviceUpdated(device) => log::debug!("VR device {device} updated"),
                VrEvent::Other { kind, device } => {
                    log::debug!("VR event {kind} on device {device}")
                }
            }
        }

        self.runtime.wait_get_poses(&mut self.poses)?;

        self.left.tracked = false;
        self.right.tracked = false;
        for (index, tracked) in self.poses.iter().enumerate() {
            if !tracked.valid {
                continue;
            }
            let index = index as u32;
            let pose = Pose::from_matrix34(&tracked.device_to_world);
            match self.runtime.device_class(index) {
                DeviceClass::Hmd => self.head = pose,
                DeviceClass::Controller => {
                    let controller = match self.runtime.controller_role(index) {
                        ControllerRole::LeftHand => &mut self.left,
                        ControllerRole::RightHand => &mut self.right,
                        ControllerRole::Invalid => continue,
                    };
                    controller.pose = pose;
                    controller.tracked = true;
                    controller.trigger = self
                        .runtime
                        .controller_state(index)
                        .is_some_and(|s| s.buttons_pressed & TRIGGER_BUTTON_MASK != 0);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Hands both eye images to the compositor
    pub fn submit(&mut self, left: RawHandle, right: RawHandle) -> Result<(), VrError> {
        self.runtime.submit(Eye::Left, left)?;
        self.runtime.submit(Eye::Right, right)
    }

    pub fn head_pose(&self) -> Pose {
        self.head
    }

    pub fn eye_pose(&self, eye: Eye) -> Pose {
        self.head * Pose::from_matrix34(&self.runtime.eye_to_head(eye))
    }

    /// World-to-clip transform for one eye
    pub fn eye_view_proj(&self, eye: Eye, near: f32, far: f32) -> Matrix4<f32> {
        self.runtime.projection(eye, near, far) * self.eye_pose(eye).inverse().matrix()
    }

    pub fn controller(&self, hand: Hand) -> &Controller {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    pub fn controller_model(&self) -> &ControllerModel {
        &self.controller_model
    }

    pub fn render_target_size(&self) -> (u32, u32) {
        self.render_target_size
    }
}

fn load_controller_model(
    runtime: &mut dyn VrRuntime,
    policy: &ModelLoadPolicy,
) -> Result<ControllerModel, VrError> {
    let mut model = None;
    let mut texture = None;

    for attempt in 0..policy.max_attempts {
        if model.is_none() {
            model = runtime.load_render_model(CONTROLLER_MODEL_NAME)?;
        }
        if let (Some(m), None) = (&model, &texture) {
            texture = runtime.load_texture(m.texture_id)?;
        }
        match (model.take(), texture.take()) {
            (Some(m), Some(t)) => {
                log::debug!("Controller model ready after {} attempts", attempt + 1);
                return Ok(ControllerModel::new(m, t));
            }
            (m, t) => {
                model = m;
                texture = t;
            }
        }
        thread::sleep(policy.retry_interval);
    }

    Err(VrError::ModelLoadTimeout {
        name: CONTROLLER_MODEL_NAME.to_string(),
        attempts: policy.max_attempts,
    })
}

impl std::fmt::Debug for Hmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hmd")
            .field("head", &self.head)
            .field("left", &self.left)
            .field("right", &self.right)
            .field("render_target_size", &self.render_target_size)
            .finish_non_exhaustive()
    }
}
