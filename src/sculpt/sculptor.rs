use cgmath::Vector3;

use super::{BrushPose, Deformation, Kelvinlet, Motion, Pinch, Solver, VelocityField};

/// Which field a brush motion drives the vertices with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushMode {
    /// Localized Kelvinlet: translate, twist and scale
    #[default]
    Elastic,
    /// Localized Kelvinlet pinch driven by the brush scale
    Pinch,
    /// Everything moves rigidly with the brush
    Rigid,
}

impl BrushMode {
    pub const ALL: [BrushMode; 3] = [BrushMode::Elastic, BrushMode::Pinch, BrushMode::Rigid];

    pub fn name(&self) -> &'static str {
        match self {
            BrushMode::Elastic => "Elastic",
            BrushMode::Pinch => "Pinch",
            BrushMode::Rigid => "Rigid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SculptSettings {
    pub mode: BrushMode,
    pub radius: f32,
    pub stiffness: f32,
    /// Poisson ratio, in [0, 0.5)
    pub compressibility: f32,
    pub solver: Solver,
}

impl Default for SculptSettings {
    fn default() -> Self {
        Self {
            mode: BrushMode::Elastic,
            radius: 0.5,
            stiffness: 1.0,
            compressibility: 0.3,
            solver: Solver::default(),
        }
    }
}

/// The field for one stroke segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrushField {
    Elastic(Kelvinlet),
    Pinch(Pinch),
    Rigid(Deformation),
}

impl VelocityField for BrushField {
    fn velocity(&self, t: f32, x: Vector3<f32>) -> Vector3<f32> {
        match self {
            BrushField::Elastic(k) => k.velocity(t, x),
            BrushField::Pinch(p) => p.velocity(t, x),
            BrushField::Rigid(d) => d.velocity(t, x),
        }
    }
}

/// Applies a brush stroke to vertex positions, one segment per sampled pose
#[derive(Debug, Clone, Default)]
pub struct Sculptor {
    pub settings: SculptSettings,
    last: Option<BrushPose>,
}

impl Sculptor {
    pub fn new(settings: SculptSettings) -> Self {
        Self {
            settings,
            last: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.last.is_some()
    }

    pub fn last_pose(&self) -> Option<&BrushPose> {
        self.last.as_ref()
    }

    pub fn begin(&mut self, pose: BrushPose) {
        log::debug!("Stroke started at {:?}", pose.position);
        self.last = Some(pose);
    }

    pub fn end(&mut self) {
        self.last = None;
    }

    pub fn field(&self, motion: &Motion) -> BrushField {
        let deformation = Deformation::from_motion(motion);
        let s = &self.settings;
        let kelvinlet = || {
            Kelvinlet::from_deformation(&deformation, s.stiffness, s.compressibility, s.radius)
        };
        match s.mode {
            BrushMode::Elastic => BrushField::Elastic(kelvinlet()),
            BrushMode::Pinch => BrushField::Pinch(Pinch(kelvinlet())),
            BrushMode::Rigid => BrushField::Rigid(deformation),
        }
    }

    /// Moves `vertices` through the field of the motion from the previous pose
    /// to `pose`. Returns whether anything was moved; outside a stroke, or
    /// when time has not advanced, nothing is.
    pub fn stroke(&mut self, pose: BrushPose, vertices: &mut [Vector3<f32>]) -> bool {
        let Some(start) = self.last else {
            return false;
        };
        let Some(motion) = Motion::between(&start, &pose) else {
            return false;
        };
        self.last = Some(pose);

        let field = self.field(&motion);
        let (t0, t1) = (motion.time, motion.time + motion.dt);
        for v in vertices.iter_mut() {
            *v = self.settings.solver.integrate(&field, *v, t0, t1);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{vec3, InnerSpace, Zero};

    fn vertices() -> Vec<Vector3<f32>> {
        vec![Vector3::zero(), vec3(0.1, 0.0, 0.0), vec3(8.0, 0.0, 0.0)]
    }

    #[test]
    fn test_stroke_needs_begin() {
        let mut sculptor = Sculptor::default();
        let mut v = vertices();
        assert!(!sculptor.stroke(BrushPose::new(Vector3::unit_z(), 1.0), &mut v));
        assert_eq!(v, vertices());
    }

    #[test]
    fn test_elastic_grab_moves_tip_with_brush() {
        let mut sculptor = Sculptor::default();
        let mut v = vertices();
        sculptor.begin(BrushPose::new(Vector3::zero(), 0.0));
        assert!(sculptor.stroke(BrushPose::new(vec3(0.0, 0.0, 0.2), 0.1), &mut v));

        assert!((v[0] - vec3(0.0, 0.0, 0.2)).magnitude() < 1e-3, "{:?}", v[0]);
        assert!(v[1].z > 0.1 && v[1].z < 0.2);
        assert!((v[2] - vec3(8.0, 0.0, 0.0)).magnitude() < 1e-3);
    }

    #[test]
    fn test_rigid_moves_everything() {
        let mut sculptor = Sculptor::new(SculptSettings {
            mode: BrushMode::Rigid,
            solver: Solver::FixedRk4,
            ..SculptSettings::default()
        });
        let mut v = vertices();
        sculptor.begin(BrushPose::new(Vector3::zero(), 2.0));
        sculptor.stroke(BrushPose::new(vec3(0.5, 0.0, 0.0), 2.5), &mut v);
        for (moved, original) in v.iter().zip(vertices()) {
            assert!((moved - original - vec3(0.5, 0.0, 0.0)).magnitude() < 1e-4);
        }
    }

    #[test]
    fn test_stalled_time_keeps_start_pose() {
        let mut sculptor = Sculptor::default();
        let mut v = vertices();
        sculptor.begin(BrushPose::new(Vector3::zero(), 1.0));
        assert!(!sculptor.stroke(BrushPose::new(Vector3::unit_x(), 1.0), &mut v));
        assert_eq!(sculptor.last_pose().map(|p| p.position), Some(Vector3::zero()));

        sculptor.end();
        assert!(!sculptor.is_active());
    }
}
