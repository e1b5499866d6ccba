//! Compile-time defaults and the configuration assembled from them

use std::time::Duration;

use cgmath::{vec3, Vector3};

use crate::sculpt::SculptSettings;
use crate::vr::ModelLoadPolicy;

pub const WINDOW_WIDTH: u32 = 1280;
pub const WINDOW_HEIGHT: u32 = 720;
pub const WINDOW_TITLE: &str = "gfx-app";

pub const CAMERA_POSITION: [f32; 3] = [0.0, 2.0, 5.0];
pub const CAMERA_YFOV: f32 = 1.33;
pub const CAMERA_NEAR: f32 = 0.001;
pub const CAMERA_FAR: f32 = 256.0;

pub const CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Side length of the square sculpting plane
pub const SCULPT_PLANE_SIZE: f32 = 4.0;
/// Quads along each side of the sculpting plane
pub const SCULPT_PLANE_DIVISIONS: u32 = 48;

/// Width of the fixed panel on the left edge
pub const PANEL_WIDTH: f32 = 300.0;

pub const MODEL_LOAD_ATTEMPTS: u32 = 500;
pub const MODEL_LOAD_INTERVAL: Duration = Duration::from_millis(10);

/// Everything the application is started with
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub camera_position: Vector3<f32>,
    pub yfov: f32,
    pub near_clip: f32,
    pub far_clip: f32,
    pub clear_color: [f32; 4],
    pub plane_size: f32,
    pub plane_divisions: u32,
    pub sculpt: SculptSettings,
    pub model_load: ModelLoadPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        let [x, y, z] = CAMERA_POSITION;
        Self {
            title: WINDOW_TITLE.to_owned(),
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            camera_position: vec3(x, y, z),
            yfov: CAMERA_YFOV,
            near_clip: CAMERA_NEAR,
            far_clip: CAMERA_FAR,
            clear_color: CLEAR_COLOR,
            plane_size: SCULPT_PLANE_SIZE,
            plane_divisions: SCULPT_PLANE_DIVISIONS,
            sculpt: SculptSettings::default(),
            model_load: ModelLoadPolicy {
                max_attempts: MODEL_LOAD_ATTEMPTS,
                retry_interval: MODEL_LOAD_INTERVAL,
            },
        }
    }
}

impl AppConfig {
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_owned();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_camera(mut self, position: Vector3<f32>, yfov: f32, near: f32, far: f32) -> Self {
        self.camera_position = position;
        self.yfov = yfov;
        self.near_clip = near;
        self.far_clip = far;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_plane(mut self, size: f32, divisions: u32) -> Self {
        self.plane_size = size;
        self.plane_divisions = divisions.max(1);
        self
    }

    pub fn with_sculpt(mut self, sculpt: SculptSettings) -> Self {
        self.sculpt = sculpt;
        self
    }

    pub fn with_model_load(mut self, policy: ModelLoadPolicy) -> Self {
        self.model_load = policy;
        self
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.title, "gfx-app");
        assert_eq!(config.camera_position, vec3(0.0, 2.0, 5.0));
        assert_eq!(config.model_load.max_attempts, MODEL_LOAD_ATTEMPTS);
    }

    #[test]
    fn test_builder_overrides() {
        let config = AppConfig::default()
            .with_size(640, 0)
            .with_plane(2.0, 0)
            .with_title("sculpt");
        assert_eq!(config.title, "sculpt");
        assert_eq!(config.plane_divisions, 1);
        assert_eq!(config.aspect(), 640.0);
    }
}
