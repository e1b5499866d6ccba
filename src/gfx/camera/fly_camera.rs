use cgmath::*;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use super::OPENGL_TO_WGPU_MATRIX;
use crate::input::{InputEvent, InputKind, InputListener};
use crate::math::Ray;

/// Units per second
pub const MOVE_SPEED: f32 = 10.0;
/// Radians per pixel of cursor motion
pub const LOOK_SPEED: f32 = 0.005;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Movement {
    forward: bool,
    left: bool,
    back: bool,
    right: bool,
    up: bool,
    down: bool,
}

/// Free-flying camera steered with WASD + QE while the right mouse button is held
#[derive(Debug, Clone, Copy)]
pub struct FlyCamera {
    pub position: Vector3<f32>,
    pub yaw: f32,
    pub pitch: f32,
    pub yfov: f32,
    pub near_clip: f32,
    pub far_clip: f32,
    movement: Movement,
    mouse_left: bool,
    mouse_right: bool,
    last_cursor: Vector2<f32>,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vector3::zero(),
            yaw: 0.0,
            pitch: 0.0,
            yfov: 1.0,
            near_clip: 0.01,
            far_clip: 100.0,
            movement: Movement::default(),
            mouse_left: false,
            mouse_right: false,
            last_cursor: Vector2::zero(),
        }
    }
}

impl FlyCamera {
    pub fn new(position: Vector3<f32>, yfov: f32, near_clip: f32, far_clip: f32) -> Self {
        Self {
            position,
            yfov,
            near_clip,
            far_clip,
            ..Self::default()
        }
    }

    /// Yaw about +Y, then pitch about +X
    pub fn orientation(&self) -> Quaternion<f32> {
        Quaternion::from_axis_angle(Vector3::unit_y(), Rad(self.yaw))
            * Quaternion::from_axis_angle(Vector3::unit_x(), Rad(self.pitch))
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::from(self.orientation().conjugate()) * Matrix4::from_translation(-self.position)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(Rad(self.yfov), aspect, self.near_clip, self.far_clip)
    }

    pub fn view_proj_matrix(&self, aspect: f32) -> Matrix4<f32> {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn is_looking(&self) -> bool {
        self.mouse_right
    }

    pub fn update_input(&mut self, event: &InputEvent) {
        match event.kind {
            InputKind::Key(code) => {
                let down = event.is_down();
                match code {
                    KeyCode::KeyW => self.movement.forward = down,
                    KeyCode::KeyA => self.movement.left = down,
                    KeyCode::KeyS => self.movement.back = down,
                    KeyCode::KeyD => self.movement.right = down,
                    KeyCode::KeyE => self.movement.up = down,
                    KeyCode::KeyQ => self.movement.down = down,
                    _ => {}
                }
            }
            InputKind::MouseButton(MouseButton::Left) => self.mouse_left = event.is_down(),
            InputKind::MouseButton(MouseButton::Right) => self.mouse_right = event.is_down(),
            InputKind::Cursor => {
                let delta = event.cursor - self.last_cursor;
                if self.mouse_right {
                    self.yaw -= delta.x * LOOK_SPEED;
                    self.pitch -= delta.y * LOOK_SPEED;
                }
                self.last_cursor = event.cursor;
            }
            _ => {}
        }
    }

    /// Moves along the camera's local axes, forward being -Z
    pub fn update(&mut self, timestep: f32) {
        if !self.mouse_right {
            return;
        }

        let q = self.orientation();
        let (x, y, z) = (
            q.rotate_vector(Vector3::unit_x()),
            q.rotate_vector(Vector3::unit_y()),
            q.rotate_vector(Vector3::unit_z()),
        );

        let mut step = Vector3::zero();
        let m = self.movement;
        if m.forward {
            step -= z;
        }
        if m.left {
            step -= x;
        }
        if m.back {
            step += z;
        }
        if m.right {
            step += x;
        }
        if m.up {
            step += y;
        }
        if m.down {
            step -= y;
        }

        if step.magnitude2() > 0.0 {
            self.position += step.normalize() * (timestep * MOVE_SPEED);
        }
    }

    /// World-space ray through a window pixel
    pub fn screen_ray(&self, cursor: Vector2<f32>, window_size: (u32, u32)) -> Option<Ray> {
        let (w, h) = (window_size.0.max(1) as f32, window_size.1.max(1) as f32);
        let ndc = vec2(2.0 * cursor.x / w - 1.0, 1.0 - 2.0 * cursor.y / h);
        let inverse = self.view_proj_matrix(w / h).invert()?;

        let near = inverse * vec4(ndc.x, ndc.y, 0.0, 1.0);
        let far = inverse * vec4(ndc.x, ndc.y, 1.0, 1.0);
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;
        Some(Ray::new(near, far - near))
    }
}

impl InputListener for FlyCamera {
    fn on_input(&mut self, event: &InputEvent) {
        self.update_input(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Action, InputTranslator};
    use winit::window::WindowId;

    fn input() -> InputTranslator {
        InputTranslator::new(WindowId::from(1u64), (800, 600))
    }

    fn assert_close(a: Vector3<f32>, b: Vector3<f32>) {
        assert!((a - b).magnitude() < 1e-4, "{a:?} != {b:?}");
    }

    #[test]
    fn test_forward_moves_ten_units_per_second() {
        let mut camera = FlyCamera::default();
        let mut input = input();
        camera.update_input(&input.key(KeyCode::KeyW, Action::Press));
        camera.update_input(&input.mouse_button(MouseButton::Right, Action::Press));

        camera.update(1.0);
        assert_close(camera.position, vec3(0.0, 0.0, -10.0));
    }

    #[test]
    fn test_no_movement_without_right_button() {
        let mut camera = FlyCamera::default();
        let mut input = input();
        camera.update_input(&input.key(KeyCode::KeyD, Action::Press));
        camera.update(1.0);
        assert_eq!(camera.position, Vector3::zero());
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let mut camera = FlyCamera::default();
        let mut input = input();
        camera.update_input(&input.key(KeyCode::KeyD, Action::Press));
        camera.update_input(&input.key(KeyCode::KeyE, Action::Press));
        camera.update_input(&input.mouse_button(MouseButton::Right, Action::Press));
        camera.update(0.5);
        assert!((camera.position.magnitude() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_look_only_while_right_held() {
        let mut camera = FlyCamera::default();
        let mut input = input();
        camera.update_input(&input.cursor_moved(100.0, 100.0));
        camera.update_input(&input.cursor_moved(140.0, 100.0));
        assert_eq!(camera.yaw, 0.0);

        camera.update_input(&input.mouse_button(MouseButton::Right, Action::Press));
        camera.update_input(&input.cursor_moved(160.0, 90.0));
        assert!((camera.yaw + 20.0 * LOOK_SPEED).abs() < 1e-6);
        assert!((camera.pitch - 10.0 * LOOK_SPEED).abs() < 1e-6);
    }

    #[test]
    fn test_view_matrix_moves_eye_to_origin() {
        let mut camera = FlyCamera::new(vec3(0.0, 2.0, 5.0), 1.33, 0.001, 256.0);
        camera.yaw = 0.7;
        camera.pitch = -0.2;
        let eye = camera.view_matrix() * camera.position.extend(1.0);
        assert_close(eye.truncate(), Vector3::zero());
    }

    #[test]
    fn test_center_ray_looks_forward() {
        let camera = FlyCamera::new(vec3(0.0, 0.0, 5.0), 1.0, 0.1, 100.0);
        let ray = camera.screen_ray(vec2(400.0, 300.0), (800, 600)).unwrap();
        assert_close(ray.direction, -Vector3::unit_z());
        let hit = ray.intersect_plane_z(0.0).unwrap();
        assert_close(hit, Vector3::zero());
    }
}
