//! Brush-driven sculpting of vertex positions.
//!
//! A brush stroke is sampled as a sequence of [`BrushPose`]s. Two consecutive
//! poses define a [`Motion`], which is turned into an affine [`Deformation`]
//! and from there into a velocity field: either a [`Kelvinlet`] (elastic,
//! localized) or the deformation itself (rigid, global). Vertices are then
//! advected through the field by an ODE [`Solver`].

pub mod kelvinlet;
pub mod ode;
pub mod sculptor;

use cgmath::*;

pub use kelvinlet::{Kelvinlet, Pinch};
pub use ode::Solver;
pub use sculptor::{BrushMode, SculptSettings, Sculptor};

/// Rotations below this angle are treated as none
const MIN_ROTATION: f32 = 1e-6;

/// A velocity defined everywhere in space at every time
pub trait VelocityField {
    fn velocity(&self, t: f32, x: Vector3<f32>) -> Vector3<f32>;
}

impl<F: VelocityField + ?Sized> VelocityField for &F {
    fn velocity(&self, t: f32, x: Vector3<f32>) -> Vector3<f32> {
        (**self).velocity(t, x)
    }
}

/// Superposition of two fields, each evaluated at its own time base
impl<A: VelocityField, B: VelocityField> VelocityField for (A, B) {
    fn velocity(&self, t: f32, x: Vector3<f32>) -> Vector3<f32> {
        self.0.velocity(t, x) + self.1.velocity(t, x)
    }
}

/// Position, orientation and uniform scale of the brush at an instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushPose {
    pub position: Vector3<f32>,
    pub orientation: Quaternion<f32>,
    pub scale: f32,
    pub time: f32,
}

impl BrushPose {
    pub fn new(position: Vector3<f32>, time: f32) -> Self {
        Self {
            position,
            orientation: Quaternion::one(),
            scale: 1.0,
            time,
        }
    }
}

/// Change of brush pose between two samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub origin: Vector3<f32>,
    pub translation: Vector3<f32>,
    pub axis: Vector3<f32>,
    pub angle: f32,
    pub scale: f32,
    pub time: f32,
    pub dt: f32,
}

impl Motion {
    /// `None` unless time moves forward and both scales are positive
    pub fn between(start: &BrushPose, end: &BrushPose) -> Option<Self> {
        let dt = end.time - start.time;
        if dt <= 0.0 || start.scale <= 0.0 || end.scale <= 0.0 {
            return None;
        }

        let mut rotation = end.orientation * start.orientation.invert();
        // Shortest arc
        if rotation.s < 0.0 {
            rotation = -rotation;
        }
        let sin_half = rotation.v.magnitude();
        let (axis, angle) = if sin_half < MIN_ROTATION {
            (Vector3::unit_x(), 0.0)
        } else {
            (rotation.v / sin_half, 2.0 * sin_half.atan2(rotation.s))
        };

        Some(Self {
            origin: start.position,
            translation: end.position - start.position,
            axis,
            angle,
            scale: end.scale / start.scale,
            time: start.time,
            dt,
        })
    }

    pub fn linear_velocity(&self) -> Vector3<f32> {
        self.translation / self.dt
    }

    pub fn angular_velocity(&self) -> Vector3<f32> {
        self.axis * (self.angle / self.dt)
    }
}

/// Affine velocity field of a brush motion: a translation rate plus a
/// displacement gradient made of a rotation (skew) and a strain (diagonal) part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deformation {
    pub origin: Vector3<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub rotation: Matrix3<f32>,
    pub strain: Matrix3<f32>,
    pub gradient: Matrix3<f32>,
    pub time: f32,
    pub dt: f32,
}

impl Deformation {
    pub fn from_motion(motion: &Motion) -> Self {
        let w = motion.angular_velocity();
        let rotation = skew(w);
        let strain = Matrix3::identity() * (motion.scale.ln() / motion.dt);
        Self {
            origin: motion.origin,
            linear_velocity: motion.linear_velocity(),
            angular_velocity: w,
            rotation,
            strain,
            gradient: rotation + strain,
            time: motion.time,
            dt: motion.dt,
        }
    }

    pub fn advected_origin(&self, t: f32) -> Vector3<f32> {
        self.origin + self.linear_velocity * (t - self.time)
    }
}

/// Rigid (non-elastic) motion of all space with the brush
impl VelocityField for Deformation {
    fn velocity(&self, t: f32, x: Vector3<f32>) -> Vector3<f32> {
        self.linear_velocity + self.gradient * (x - self.advected_origin(t))
    }
}

/// Matrix of `v x _`
fn skew(v: Vector3<f32>) -> Matrix3<f32> {
    #[rustfmt::skip]
    let m = Matrix3::new(
        0.0, v.z, -v.y,
        -v.z, 0.0, v.x,
        v.y, -v.x, 0.0,
    );
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vector3<f32>, b: Vector3<f32>, eps: f32) {
        assert!((a - b).magnitude() < eps, "{a:?} != {b:?}");
    }

    #[test]
    fn test_motion_requires_forward_time() {
        let a = BrushPose::new(Vector3::zero(), 1.0);
        let b = BrushPose::new(Vector3::unit_x(), 1.0);
        assert!(Motion::between(&a, &b).is_none());
        assert!(Motion::between(&b, &a).is_none());

        let c = BrushPose::new(Vector3::unit_x(), 1.5);
        let motion = Motion::between(&a, &c).unwrap();
        assert_close(motion.linear_velocity(), vec3(2.0, 0.0, 0.0), 1e-6);
        assert_eq!(motion.angle, 0.0);
        assert_eq!(motion.axis, Vector3::unit_x());
    }

    #[test]
    fn test_motion_extracts_rotation() {
        let a = BrushPose {
            orientation: Quaternion::from_angle_y(Rad(0.2)),
            ..BrushPose::new(Vector3::zero(), 0.0)
        };
        let b = BrushPose {
            orientation: Quaternion::from_angle_y(Rad(0.5)),
            ..BrushPose::new(Vector3::zero(), 0.5)
        };
        let motion = Motion::between(&a, &b).unwrap();
        assert!((motion.angle - 0.3).abs() < 1e-5);
        assert_close(motion.angular_velocity(), vec3(0.0, 0.6, 0.0), 1e-5);
    }

    #[test]
    fn test_skew_is_cross_product() {
        let w = vec3(0.3, -1.2, 0.7);
        let x = vec3(2.0, 0.5, -1.0);
        assert_close(skew(w) * x, w.cross(x), 1e-6);
    }

    #[test]
    fn test_scale_becomes_log_strain() {
        let a = BrushPose::new(Vector3::zero(), 0.0);
        let b = BrushPose {
            scale: std::f32::consts::E,
            ..BrushPose::new(Vector3::zero(), 0.5)
        };
        let deformation = Deformation::from_motion(&Motion::between(&a, &b).unwrap());
        assert!((deformation.strain.x.x - 2.0).abs() < 1e-5);
        assert_eq!(deformation.strain.x.y, 0.0);
    }

    #[test]
    fn test_non_elastic_translation_moves_everything() {
        let a = BrushPose::new(vec3(1.0, 1.0, 0.0), 0.0);
        let b = BrushPose::new(vec3(1.0, 1.0, 0.5), 0.25);
        let deformation = Deformation::from_motion(&Motion::between(&a, &b).unwrap());
        for x in [Vector3::zero(), vec3(10.0, -3.0, 2.0)] {
            assert_close(deformation.velocity(0.1, x), vec3(0.0, 0.0, 2.0), 1e-6);
        }
    }

    #[test]
    fn test_field_pair_sums() {
        let a = BrushPose::new(Vector3::zero(), 0.0);
        let b = BrushPose::new(Vector3::unit_x(), 1.0);
        let deformation = Deformation::from_motion(&Motion::between(&a, &b).unwrap());
        let both = (&deformation, &deformation);
        assert_close(both.velocity(0.0, Vector3::zero()), vec3(2.0, 0.0, 0.0), 1e-6);
    }
}
