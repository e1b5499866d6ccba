//! Regularized Kelvinlet displacement fields
//!
//! Each field is evaluated as the difference of two Kelvinlets with radii
//! `r` and `1.1 r` (biscale falloff), which confines the deformation to a
//! neighbourhood of the brush.

use std::f32::consts::PI;

use cgmath::{InnerSpace, Matrix3, Vector3};

use super::{Deformation, VelocityField};

/// Ratio between the two radii of a biscale Kelvinlet
pub const BISCALE_RADIUS: f32 = 1.1;

/// Stiffness the calibration factors are computed for. A Kelvinlet evaluated
/// with this stiffness moves the material at the brush tip exactly with the brush.
pub const DEFAULT_STIFFNESS: f32 = 1.0;

/// Scale loads are evaluated incompressible-free; 0.5 would divide by zero
const SCALE_COMPRESSIBILITY: f32 = 0.0;

fn material(stiffness: f32, compressibility: f32) -> (f32, f32) {
    let a = 1.0 / (4.0 * PI * stiffness);
    let b = a / (4.0 * (1.0 - compressibility));
    (a, b)
}

fn biscale_linear(radius: f32) -> f32 {
    let outer = radius * BISCALE_RADIUS;
    1.0 / (1.0 / radius - 1.0 / outer)
}

fn biscale_cubic(radius: f32) -> f32 {
    let outer = radius * BISCALE_RADIUS;
    1.0 / (1.0 / radius.powi(3) - 1.0 / outer.powi(3))
}

pub fn translation_calibration(radius: f32, compressibility: f32) -> f32 {
    let (a, b) = material(DEFAULT_STIFFNESS, compressibility);
    let c = 2.0 / (3.0 * a - 2.0 * b);
    c * biscale_linear(radius)
}

pub fn twist_calibration(radius: f32) -> f32 {
    let (a, _) = material(DEFAULT_STIFFNESS, 0.0);
    let c = -2.0 / (5.0 * a);
    c * biscale_cubic(radius)
}

pub fn scale_calibration(radius: f32, compressibility: f32) -> f32 {
    let (a, b) = material(DEFAULT_STIFFNESS, compressibility);
    let c = 2.0 / ((2.0 * b - a) * 5.0);
    c * biscale_cubic(radius)
}

pub fn pinch_calibration(radius: f32, compressibility: f32) -> f32 {
    let (a, b) = material(DEFAULT_STIFFNESS, compressibility);
    let c = 2.0 * radius.powi(3) / (4.0 * b - 5.0 * a);
    c * biscale_cubic(radius)
}

fn regularized(r: Vector3<f32>, radius: f32) -> f32 {
    (r.magnitude2() + radius * radius).sqrt()
}

fn translation_inner(
    r: Vector3<f32>,
    force: Vector3<f32>,
    radius: f32,
    stiffness: f32,
    compressibility: f32,
) -> Vector3<f32> {
    let (a, b) = material(stiffness, compressibility);
    let re = regularized(r, radius);
    let re3 = re * re * re;

    let first = (a - b) / re;
    let second = r * (b / re3 * r.dot(force));
    let third = a * radius * radius / (2.0 * re3);
    force * (first + third) + second
}

fn twist_inner(r: Vector3<f32>, load: &Matrix3<f32>, radius: f32, stiffness: f32) -> Vector3<f32> {
    let (a, _) = material(stiffness, 0.0);
    let re = regularized(r, radius);
    let falloff = 1.0 / re.powi(3) + 3.0 * radius * radius / (2.0 * re.powi(5));
    load * r * (-a * falloff)
}

fn scale_inner(
    r: Vector3<f32>,
    load: &Matrix3<f32>,
    radius: f32,
    stiffness: f32,
    compressibility: f32,
) -> Vector3<f32> {
    let (a, b) = material(stiffness, compressibility);
    let re = regularized(r, radius);
    let falloff = 1.0 / re.powi(3) + 3.0 * radius * radius / (2.0 * re.powi(5));
    load * r * ((2.0 * b - a) * falloff)
}

fn pinch_inner(
    r: Vector3<f32>,
    load: &Matrix3<f32>,
    radius: f32,
    stiffness: f32,
    compressibility: f32,
) -> Vector3<f32> {
    let (a, b) = material(stiffness, compressibility);
    let re = regularized(r, radius);
    let fr = load * r;

    let first = fr * ((2.0 * b - a) / re.powi(3));
    let second = (r * (2.0 * b * r.dot(fr)) + fr * (a * radius * radius)) * (-3.0 / (2.0 * re.powi(5)));
    first + second
}

/// Translation displacement of the point at offset `r` from the load
pub fn translation(
    r: Vector3<f32>,
    force: Vector3<f32>,
    radius: f32,
    stiffness: f32,
    compressibility: f32,
) -> Vector3<f32> {
    translation_inner(r, force, radius, stiffness, compressibility)
        - translation_inner(r, force, radius * BISCALE_RADIUS, stiffness, compressibility)
}

/// Displacement for a skew-symmetric (rotation) load
pub fn twist(r: Vector3<f32>, load: &Matrix3<f32>, radius: f32, stiffness: f32) -> Vector3<f32> {
    twist_inner(r, load, radius, stiffness) - twist_inner(r, load, radius * BISCALE_RADIUS, stiffness)
}

/// Displacement for a uniform scale load
pub fn scale(
    r: Vector3<f32>,
    load: &Matrix3<f32>,
    radius: f32,
    stiffness: f32,
    compressibility: f32,
) -> Vector3<f32> {
    scale_inner(r, load, radius, stiffness, compressibility)
        - scale_inner(r, load, radius * BISCALE_RADIUS, stiffness, compressibility)
}

/// Displacement for a symmetric, traceless (pinch) load
pub fn pinch(
    r: Vector3<f32>,
    load: &Matrix3<f32>,
    radius: f32,
    stiffness: f32,
    compressibility: f32,
) -> Vector3<f32> {
    pinch_inner(r, load, radius, stiffness, compressibility)
        - pinch_inner(r, load, radius * BISCALE_RADIUS, stiffness, compressibility)
}

/// Calibrated loads of one brush motion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kelvinlet {
    pub origin: Vector3<f32>,
    pub linear_velocity: Vector3<f32>,
    pub force: Vector3<f32>,
    pub twist: Matrix3<f32>,
    pub scale: Matrix3<f32>,
    pub time: f32,
    pub dt: f32,
    pub radius: f32,
    pub stiffness: f32,
    pub compressibility: f32,
}

impl Kelvinlet {
    pub fn from_deformation(
        deformation: &Deformation,
        stiffness: f32,
        compressibility: f32,
        radius: f32,
    ) -> Self {
        Self {
            origin: deformation.origin,
            linear_velocity: deformation.linear_velocity,
            force: deformation.linear_velocity * translation_calibration(radius, compressibility),
            twist: deformation.rotation * twist_calibration(radius),
            scale: deformation.strain * scale_calibration(radius, SCALE_COMPRESSIBILITY),
            time: deformation.time,
            dt: deformation.dt,
            radius,
            stiffness,
            compressibility,
        }
    }

    /// Load origin carried along with the brush at time `t`
    pub fn advected_origin(&self, t: f32) -> Vector3<f32> {
        self.origin + self.linear_velocity * (t - self.time)
    }

    /// Translate + twist + scale displacement rate at `x`
    pub fn evaluate(&self, t: f32, x: Vector3<f32>) -> Vector3<f32> {
        let r = x - self.advected_origin(t);
        translation(r, self.force, self.radius, self.stiffness, self.compressibility)
            + twist(r, &self.twist, self.radius, self.stiffness)
            + scale(r, &self.scale, self.radius, self.stiffness, SCALE_COMPRESSIBILITY)
    }

    /// Pinch displacement rate at `x`, using the scale load as the pinch matrix
    pub fn evaluate_pinch(&self, x: Vector3<f32>) -> Vector3<f32> {
        let r = x - self.origin;
        pinch(r, &self.scale, self.radius, self.stiffness, self.compressibility)
    }
}

impl VelocityField for Kelvinlet {
    fn velocity(&self, t: f32, x: Vector3<f32>) -> Vector3<f32> {
        self.evaluate(t, x)
    }
}

/// A Kelvinlet evaluated through its pinch field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinch(pub Kelvinlet);

impl VelocityField for Pinch {
    fn velocity(&self, _t: f32, x: Vector3<f32>) -> Vector3<f32> {
        self.0.evaluate_pinch(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sculpt::{BrushPose, Motion};
    use cgmath::{vec3, Quaternion, Rad, Rotation3, SquareMatrix, Zero};

    fn grab(delta: Vector3<f32>) -> Kelvinlet {
        let start = BrushPose::new(Vector3::zero(), 0.0);
        let end = BrushPose::new(delta, 1.0);
        let motion = Motion::between(&start, &end).unwrap();
        Kelvinlet::from_deformation(&Deformation::from_motion(&motion), 1.0, 0.3, 0.5)
    }

    #[test]
    fn test_brush_tip_follows_translation() {
        let kelvinlet = grab(vec3(0.2, 0.0, 0.0));
        let v = kelvinlet.evaluate(0.0, Vector3::zero());
        assert!((v - vec3(0.2, 0.0, 0.0)).magnitude() < 1e-4, "{v:?}");
    }

    #[test]
    fn test_displacement_decays_with_distance() {
        let kelvinlet = grab(vec3(0.0, 0.0, 1.0));
        let near = kelvinlet.evaluate(0.0, vec3(0.1, 0.0, 0.0)).magnitude();
        let far = kelvinlet.evaluate(0.0, vec3(5.0, 0.0, 0.0)).magnitude();
        assert!(near > 0.5);
        assert!(far < 0.01 * near);
    }

    #[test]
    fn test_stiffer_material_moves_less() {
        let soft = grab(vec3(1.0, 0.0, 0.0));
        let stiff = Kelvinlet {
            stiffness: 4.0,
            ..soft
        };
        let x = vec3(0.1, 0.1, 0.0);
        assert!(stiff.evaluate(0.0, x).magnitude() < soft.evaluate(0.0, x).magnitude());
    }

    #[test]
    fn test_twist_rotates_about_axis() {
        let start = BrushPose::new(Vector3::zero(), 0.0);
        let end = BrushPose {
            orientation: Quaternion::from_angle_z(Rad(0.5)),
            ..BrushPose::new(Vector3::zero(), 1.0)
        };
        let motion = Motion::between(&start, &end).unwrap();
        let kelvinlet = Kelvinlet::from_deformation(&Deformation::from_motion(&motion), 1.0, 0.3, 1.0);

        let x = vec3(0.05, 0.0, 0.0);
        let v = kelvinlet.evaluate(0.0, x);
        // Counter-clockwise about +Z moves +X towards +Y
        assert!(v.y > 0.0);
        assert!(v.x.abs() < 1e-4 && v.z.abs() < 1e-4);
        // Near the tip the rate approaches omega x r
        assert!((v.y - 0.5 * 0.05).abs() < 2e-3, "{v:?}");
    }

    #[test]
    fn test_pinch_vanishes_at_origin_and_is_finite() {
        let load = Matrix3::from_diagonal(vec3(1.0, -1.0, 0.0));
        let kelvinlet = Kelvinlet {
            scale: load * pinch_calibration(0.5, 0.3),
            ..grab(Vector3::zero())
        };
        assert_eq!(Pinch(kelvinlet).velocity(0.0, kelvinlet.origin), Vector3::zero());
        let v = Pinch(kelvinlet).velocity(0.0, vec3(0.2, 0.1, 0.0));
        assert!(v.x.is_finite() && v.y.is_finite());
        assert!(v.magnitude() > 0.0);
    }

    #[test]
    fn test_identity_scale_load_is_radial() {
        let r = vec3(0.3, -0.2, 0.1);
        let v = scale(r, &Matrix3::identity(), 0.5, 1.0, 0.0);
        assert!(v.normalize().dot(r.normalize()).abs() > 0.9999);
    }
}
