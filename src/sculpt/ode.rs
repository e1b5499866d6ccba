//! Explicit Runge-Kutta integrators for advecting points through a [`VelocityField`]

use cgmath::{InnerSpace, Vector3};

use super::VelocityField;

/// First adaptive step, as a fraction of the integration span
pub const ADAPTIVE_INITIAL_DT: f32 = 0.1;
/// Smallest step the adaptive solvers will shrink to; such steps are always accepted
pub const ADAPTIVE_MINIMUM_DT: f32 = 0.001;
const SAFETY: f32 = 0.9;
const FIXED_EULER_STEPS: u32 = 100;
const FIXED_RK4_STEPS: u32 = 10;

/// A pair of solutions of different order from one embedded step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Embedded {
    pub higher: Vector3<f32>,
    pub lower: Vector3<f32>,
}

pub fn euler<F: VelocityField + ?Sized>(f: &F, t: f32, dt: f32, x: Vector3<f32>) -> Vector3<f32> {
    x + f.velocity(t, x) * dt
}

pub fn rk4<F: VelocityField + ?Sized>(f: &F, t: f32, dt: f32, x: Vector3<f32>) -> Vector3<f32> {
    let k1 = f.velocity(t, x) * dt;
    let k2 = f.velocity(t + dt * 0.5, x + k1 * 0.5) * dt;
    let k3 = f.velocity(t + dt * 0.5, x + k2 * 0.5) * dt;
    let k4 = f.velocity(t + dt, x + k3) * dt;
    x + k1 / 6.0 + k2 / 3.0 + k3 / 3.0 + k4 / 6.0
}

/// Runge-Kutta-Fehlberg 4(5)
pub fn rkf45<F: VelocityField + ?Sized>(f: &F, t: f32, dt: f32, x: Vector3<f32>) -> Embedded {
    let k1 = f.velocity(t, x) * dt;
    let k2 = f.velocity(t + dt / 4.0, x + k1 / 4.0) * dt;
    let k3 = f.velocity(t + dt * 3.0 / 8.0, x + k1 * (3.0 / 32.0) + k2 * (9.0 / 32.0)) * dt;
    let k4 = f.velocity(
        t + dt * 12.0 / 13.0,
        x + k1 * (1932.0 / 2197.0) + k2 * (-7200.0 / 2197.0) + k3 * (7296.0 / 2197.0),
    ) * dt;
    let k5 = f.velocity(
        t + dt,
        x + k1 * (439.0 / 216.0) + k2 * -8.0 + k3 * (3680.0 / 513.0) + k4 * (-845.0 / 4104.0),
    ) * dt;
    let k6 = f.velocity(
        t + dt / 2.0,
        x + k1 * (-8.0 / 27.0)
            + k2 * 2.0
            + k3 * (-3544.0 / 2565.0)
            + k4 * (1859.0 / 4104.0)
            + k5 * (-11.0 / 40.0),
    ) * dt;

    Embedded {
        higher: x
            + k1 * (16.0 / 135.0)
            + k3 * (6656.0 / 12825.0)
            + k4 * (28561.0 / 56430.0)
            + k5 * (-9.0 / 50.0)
            + k6 * (2.0 / 55.0),
        lower: x + k1 * (25.0 / 216.0) + k3 * (1408.0 / 2565.0) + k4 * (2197.0 / 4104.0) + k5 * (-1.0 / 5.0),
    }
}

/// Dormand-Prince 5(4)
pub fn dp54<F: VelocityField + ?Sized>(f: &F, t: f32, dt: f32, x: Vector3<f32>) -> Embedded {
    let k1 = f.velocity(t, x) * dt;
    let k2 = f.velocity(t + dt / 5.0, x + k1 / 5.0) * dt;
    let k3 = f.velocity(t + dt * 3.0 / 10.0, x + k1 * (3.0 / 40.0) + k2 * (9.0 / 40.0)) * dt;
    let k4 = f.velocity(
        t + dt * 4.0 / 5.0,
        x + k1 * (44.0 / 45.0) + k2 * (-56.0 / 15.0) + k3 * (32.0 / 9.0),
    ) * dt;
    let k5 = f.velocity(
        t + dt * 8.0 / 9.0,
        x + k1 * (19372.0 / 6561.0)
            + k2 * (-25360.0 / 2187.0)
            + k3 * (64448.0 / 6561.0)
            + k4 * (-212.0 / 729.0),
    ) * dt;
    let k6 = f.velocity(
        t + dt,
        x + k1 * (9017.0 / 3168.0)
            + k2 * (-355.0 / 33.0)
            + k3 * (46732.0 / 5247.0)
            + k4 * (49.0 / 176.0)
            + k5 * (-5103.0 / 18656.0),
    ) * dt;

    let higher = x
        + k1 * (35.0 / 384.0)
        + k3 * (500.0 / 1113.0)
        + k4 * (125.0 / 192.0)
        + k5 * (-2187.0 / 6784.0)
        + k6 * (11.0 / 84.0);
    // First same as last: the seventh stage is evaluated at the fifth order answer
    let k7 = f.velocity(t + dt, higher) * dt;

    Embedded {
        higher,
        lower: x
            + k1 * (5179.0 / 57600.0)
            + k3 * (7571.0 / 16695.0)
            + k4 * (393.0 / 640.0)
            + k5 * (-92097.0 / 339200.0)
            + k6 * (187.0 / 2100.0)
            + k7 / 40.0,
    }
}

/// Bogacki-Shampine 3(2)
pub fn bs32<F: VelocityField + ?Sized>(f: &F, t: f32, dt: f32, x: Vector3<f32>) -> Embedded {
    let k1 = f.velocity(t, x) * dt;
    let k2 = f.velocity(t + dt / 2.0, x + k1 / 2.0) * dt;
    let k3 = f.velocity(t + dt * 3.0 / 4.0, x + k2 * (3.0 / 4.0)) * dt;
    let higher = x + k1 * (2.0 / 9.0) + k2 / 3.0 + k3 * (4.0 / 9.0);
    let k4 = f.velocity(t + dt, higher) * dt;

    Embedded {
        higher,
        lower: x + k1 * (7.0 / 24.0) + k2 / 4.0 + k3 / 3.0 + k4 / 8.0,
    }
}

/// How a point is carried from `t0` to `t1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Solver {
    /// 100 Euler steps
    FixedEuler,
    /// 10 RK4 steps
    FixedRk4,
    /// One RK4 step over the whole span
    Rk4,
    /// RK4 with step doubling for the error estimate
    AdaptiveRk4 { max_error: f32 },
    Rkf45 { max_error: f32 },
    Dp54 { max_error: f32 },
    Bs32 { max_error: f32 },
}

impl Default for Solver {
    fn default() -> Self {
        Solver::Dp54 { max_error: 1e-3 }
    }
}

impl Solver {
    pub const NAMES: [&'static str; 7] = [
        "Fixed Euler",
        "Fixed RK4",
        "RK4",
        "Adaptive RK4",
        "RKF45",
        "DP54",
        "BS32",
    ];

    /// Position in [`Solver::NAMES`]
    pub fn index(&self) -> usize {
        match self {
            Solver::FixedEuler => 0,
            Solver::FixedRk4 => 1,
            Solver::Rk4 => 2,
            Solver::AdaptiveRk4 { .. } => 3,
            Solver::Rkf45 { .. } => 4,
            Solver::Dp54 { .. } => 5,
            Solver::Bs32 { .. } => 6,
        }
    }

    /// Solver at `index` in [`Solver::NAMES`], with `max_error` for the adaptive ones
    pub fn from_index(index: usize, max_error: f32) -> Option<Self> {
        Some(match index {
            0 => Solver::FixedEuler,
            1 => Solver::FixedRk4,
            2 => Solver::Rk4,
            3 => Solver::AdaptiveRk4 { max_error },
            4 => Solver::Rkf45 { max_error },
            5 => Solver::Dp54 { max_error },
            6 => Solver::Bs32 { max_error },
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        Self::NAMES[self.index()]
    }

    /// Error tolerance of the adaptive solvers
    pub fn max_error(&self) -> Option<f32> {
        match *self {
            Solver::AdaptiveRk4 { max_error }
            | Solver::Rkf45 { max_error }
            | Solver::Dp54 { max_error }
            | Solver::Bs32 { max_error } => Some(max_error),
            Solver::FixedEuler | Solver::FixedRk4 | Solver::Rk4 => None,
        }
    }

    pub fn integrate<F: VelocityField + ?Sized>(
        &self,
        field: &F,
        x: Vector3<f32>,
        t0: f32,
        t1: f32,
    ) -> Vector3<f32> {
        if t1 <= t0 {
            return x;
        }

        match *self {
            Solver::FixedEuler => fixed(field, x, t0, t1, FIXED_EULER_STEPS, euler),
            Solver::FixedRk4 => fixed(field, x, t0, t1, FIXED_RK4_STEPS, rk4),
            Solver::Rk4 => rk4(field, t0, t1 - t0, x),
            Solver::AdaptiveRk4 { max_error } => {
                adaptive(field, x, t0, t1, max_error, 0.2, |f, t, dt, x| {
                    let full = rk4(f, t, dt, x);
                    let half = rk4(f, t, dt / 2.0, x);
                    let two_halves = rk4(f, t + dt / 2.0, dt / 2.0, half);
                    (full, (full - two_halves).magnitude() / 15.0)
                })
            }
            Solver::Rkf45 { max_error } => {
                adaptive(field, x, t0, t1, max_error, 0.2, embedded(rkf45::<F>))
            }
            Solver::Dp54 { max_error } => {
                adaptive(field, x, t0, t1, max_error, 0.2, embedded(dp54::<F>))
            }
            Solver::Bs32 { max_error } => {
                adaptive(field, x, t0, t1, max_error, 1.0 / 3.0, embedded(bs32::<F>))
            }
        }
    }
}

fn fixed<F: VelocityField + ?Sized>(
    field: &F,
    mut x: Vector3<f32>,
    t0: f32,
    t1: f32,
    steps: u32,
    step: fn(&F, f32, f32, Vector3<f32>) -> Vector3<f32>,
) -> Vector3<f32> {
    let dt = (t1 - t0) / steps as f32;
    for i in 0..steps {
        x = step(field, t0 + dt * i as f32, dt, x);
    }
    x
}

/// Uses the higher order answer (local extrapolation)
fn embedded<F: VelocityField + ?Sized>(
    step: fn(&F, f32, f32, Vector3<f32>) -> Embedded,
) -> impl Fn(&F, f32, f32, Vector3<f32>) -> (Vector3<f32>, f32) {
    move |f: &F, t: f32, dt: f32, x: Vector3<f32>| {
        let e = step(f, t, dt, x);
        (e.higher, (e.higher - e.lower).magnitude())
    }
}

/// Step-size control shared by the adaptive solvers. `step` returns the
/// candidate position and its local error estimate.
fn adaptive<F, S>(
    field: &F,
    mut x: Vector3<f32>,
    t0: f32,
    t1: f32,
    max_error: f32,
    exponent: f32,
    step: S,
) -> Vector3<f32>
where
    F: VelocityField + ?Sized,
    S: Fn(&F, f32, f32, Vector3<f32>) -> (Vector3<f32>, f32),
{
    let mut t = t0;
    let mut dt = (t1 - t0) * ADAPTIVE_INITIAL_DT;
    while t < t1 {
        dt = dt.min(t1 - t);
        if t + dt <= t {
            break;
        }

        let (next, error) = step(field, t, dt, x);
        let error = error / dt;
        let new_dt = dt * SAFETY * (max_error / error).powf(exponent);

        if error <= max_error || dt <= ADAPTIVE_MINIMUM_DT {
            x = next;
            t += dt;
            dt = new_dt;
        } else {
            // Halve when the controller stops making progress
            dt = if (new_dt - dt).abs() < 1e-5 { dt / 2.0 } else { new_dt };
            dt = dt.max(ADAPTIVE_MINIMUM_DT);
        }
    }
    x
}
