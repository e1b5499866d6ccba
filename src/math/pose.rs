use std::ops::Mul;

use cgmath::*;

/// Orientation plus position of a tracked device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub orientation: Quaternion<f32>,
    pub position: Vector3<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            orientation: Quaternion::one(),
            position: Vector3::zero(),
        }
    }
}

impl Pose {
    pub fn new(orientation: Quaternion<f32>, position: Vector3<f32>) -> Self {
        Self {
            orientation,
            position,
        }
    }

    /// From a row-major 3x4 device-to-world matrix
    pub fn from_matrix34(m: &[[f32; 4]; 3]) -> Self {
        let rotation = Matrix3::from_cols(
            vec3(m[0][0], m[1][0], m[2][0]),
            vec3(m[0][1], m[1][1], m[2][1]),
            vec3(m[0][2], m[1][2], m[2][2]),
        );
        Self {
            orientation: rotation_quat(&rotation),
            position: vec3(m[0][3], m[1][3], m[2][3]),
        }
    }

    pub fn inverse(&self) -> Self {
        let inv = self.orientation.invert();
        Self {
            orientation: inv,
            position: inv.rotate_vector(-self.position),
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position) * Matrix4::from(self.orientation)
    }

    pub fn transform_vector(&self, v: Vector3<f32>) -> Vector3<f32> {
        self.orientation.rotate_vector(v)
    }

    pub fn transform_coord(&self, p: Vector3<f32>) -> Vector3<f32> {
        self.position + self.transform_vector(p)
    }

    pub fn detransform_coord(&self, p: Vector3<f32>) -> Vector3<f32> {
        self.orientation.invert().rotate_vector(p - self.position)
    }

    pub fn xdir(&self) -> Vector3<f32> {
        self.transform_vector(Vector3::unit_x())
    }

    pub fn zdir(&self) -> Vector3<f32> {
        self.transform_vector(Vector3::unit_z())
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            orientation: self.orientation * rhs.orientation,
            position: self.transform_coord(rhs.position),
        }
    }
}

fn quat(x: f32, y: f32, z: f32, w: f32) -> Quaternion<f32> {
    Quaternion::new(w, x, y, z)
}

/// Rotation matrix to unit quaternion, choosing the largest diagonal term for stability
fn rotation_quat(m: &Matrix3<f32>) -> Quaternion<f32> {
    let magw = m[0][0] + m[1][1] + m[2][2];

    let wvsz = magw > m[2][2];
    let magzw = if wvsz { magw } else { m[2][2] };
    let prezw = if wvsz { vec3(1.0, 1.0, 1.0) } else { vec3(-1.0, -1.0, 1.0) };
    let postzw = if wvsz { quat(0.0, 0.0, 0.0, 1.0) } else { quat(0.0, 0.0, 1.0, 0.0) };

    let xvsy = m[0][0] > m[1][1];
    let magxy = if xvsy { m[0][0] } else { m[1][1] };
    let prexy = if xvsy { vec3(1.0, -1.0, -1.0) } else { vec3(-1.0, 1.0, -1.0) };
    let postxy = if xvsy { quat(1.0, 0.0, 0.0, 0.0) } else { quat(0.0, 1.0, 0.0, 0.0) };

    let (pre, post) = if magzw > magxy {
        (prezw, postzw)
    } else {
        (prexy, postxy)
    };

    let t = pre.x * m[0][0] + pre.y * m[1][1] + pre.z * m[2][2] + 1.0;
    let s = 1.0 / t.sqrt() / 2.0;
    let qp = quat(
        pre.y * m[1][2] - pre.z * m[2][1],
        pre.z * m[2][0] - pre.x * m[0][2],
        pre.x * m[0][1] - pre.y * m[1][0],
        t,
    ) * s;
    qp * post
}
