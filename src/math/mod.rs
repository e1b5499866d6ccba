//! Rigid transforms and rays

pub mod pose;

use cgmath::{InnerSpace, Vector3};

pub use pose::Pose;

/// Half-line with a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn at(&self, t: f32) -> Vector3<f32> {
        self.origin + self.direction * t
    }

    /// Where the ray crosses the plane `z = height`, if it does in front of the origin
    pub fn intersect_plane_z(&self, height: f32) -> Option<Vector3<f32>> {
        if self.direction.z.abs() < f32::EPSILON {
            return None;
        }
        let t = (height - self.origin.z) / self.direction.z;
        (t >= 0.0).then(|| self.at(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::vec3;

    #[test]
    fn test_ray_plane_hit_and_miss() {
        let ray = Ray::new(vec3(1.0, 2.0, 4.0), vec3(0.0, 0.0, -2.0));
        assert_eq!(ray.intersect_plane_z(0.0), Some(vec3(1.0, 2.0, 0.0)));
        assert_eq!(ray.intersect_plane_z(5.0), None);

        let parallel = Ray::new(vec3(0.0, 0.0, 1.0), vec3(1.0, 0.0, 0.0));
        assert_eq!(parallel.intersect_plane_z(0.0), None);
    }
}
