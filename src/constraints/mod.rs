use crate::common::BodyHandle;
use crate::error::{PhysicsError, Result};
use crate::math::Vec2;
use crate::objects::rigid_body::{safe_inverse, RigidBody};

pub mod damped_rotary_spring;
pub mod damped_spring;
pub mod gear_joint;
pub mod groove_joint;
pub mod pin_joint;
pub mod pivot_joint;
pub mod ratchet_joint;
pub mod rotary_limit_joint;
pub mod simple_motor;
pub mod slide_joint;

pub use damped_rotary_spring::DampedRotarySpring;
pub use damped_spring::DampedSpring;
pub use gear_joint::GearJoint;
pub use groove_joint::GrooveJoint;
pub use pin_joint::PinJoint;
pub use pivot_joint::PivotJoint;
pub use ratchet_joint::RatchetJoint;
pub use rotary_limit_joint::RotaryLimitJoint;
pub use simple_motor::SimpleMotor;
pub use slide_joint::SlideJoint;

/// Solver contract shared by every joint kind.
///
/// `pre_step` runs once per step before velocities are integrated,
/// `apply_cached_impulse` warm starts the accumulated impulse, and
/// `apply_impulse` runs once per solver iteration.
pub(crate) trait JointSolver {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits);
    fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64);
    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits);
    /// Magnitude of the impulse applied by the last solve.
    fn impulse(&self) -> f64;
}

/// Force and correction limits of a constraint, copied out for the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Limits {
    pub max_force: f64,
    pub error_bias: f64,
    pub max_bias: f64,
}

/// Fraction of the remaining error corrected in one step of length `dt`,
/// for an `error_bias` that leaves that fraction after one second.
pub(crate) fn bias_coef(error_bias: f64, dt: f64) -> f64 {
    1.0 - error_bias.powf(dt)
}

/// Anchor offset from the center of gravity, rotated into world space.
pub(crate) fn world_offset(body: &RigidBody, anchor: Vec2) -> Vec2 {
    body.transform.apply_vector(anchor - body.local_center_of_mass())
}

/// Effective rotational mass of the pair.
pub(crate) fn angular_mass(a: &RigidBody, b: &RigidBody) -> f64 {
    let sum = a.inv_inertia() + b.inv_inertia();
    debug_assert!(sum != 0.0, "unsolvable constraint");
    safe_inverse(sum)
}

/// Applies an angular impulse `j` to `b` and `-j` to `a`.
pub(crate) fn apply_angular_impulses(a: &mut RigidBody, b: &mut RigidBody, j: f64) {
    a.angular_velocity -= j * a.inv_inertia();
    b.angular_velocity += j * b.inv_inertia();
}

/// The joint kinds. Each one keeps its own anchors, limits and solver
/// scratch.
#[derive(Debug, Clone, PartialEq)]
pub enum Joint {
    Pin(PinJoint),
    Slide(SlideJoint),
    Pivot(PivotJoint),
    Groove(GrooveJoint),
    Gear(GearJoint),
    Ratchet(RatchetJoint),
    RotaryLimit(RotaryLimitJoint),
    Motor(SimpleMotor),
    DampedSpring(DampedSpring),
    DampedRotarySpring(DampedRotarySpring),
}

macro_rules! each_joint {
    ($joint:expr, $j:ident => $body:expr) => {
        match $joint {
            Joint::Pin($j) => $body,
            Joint::Slide($j) => $body,
            Joint::Pivot($j) => $body,
            Joint::Groove($j) => $body,
            Joint::Gear($j) => $body,
            Joint::Ratchet($j) => $body,
            Joint::RotaryLimit($j) => $body,
            Joint::Motor($j) => $body,
            Joint::DampedSpring($j) => $body,
            Joint::DampedRotarySpring($j) => $body,
        }
    };
}

macro_rules! impl_from_joint {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for Joint {
            fn from(joint: $ty) -> Self {
                Joint::$variant(joint)
            }
        })*
    };
}

impl_from_joint!(
    Pin(PinJoint),
    Slide(SlideJoint),
    Pivot(PivotJoint),
    Groove(GrooveJoint),
    Gear(GearJoint),
    Ratchet(RatchetJoint),
    RotaryLimit(RotaryLimitJoint),
    Motor(SimpleMotor),
    DampedSpring(DampedSpring),
    DampedRotarySpring(DampedRotarySpring),
);

/// A joint between two bodies, solved alongside the contacts.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    /// Largest force the constraint may apply. Infinite by default.
    pub max_force: f64,
    /// Fraction of the joint error left uncorrected after one second.
    pub error_bias: f64,
    /// Largest correction speed. Infinite by default.
    pub max_bias: f64,
    /// When false, shapes on the two bodies never collide.
    pub collide_bodies: bool,
    pub joint: Joint,
}

impl Constraint {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, joint: impl Into<Joint>) -> Result<Self> {
        if body_a == body_b {
            return Err(PhysicsError::SelfConstraint);
        }
        Ok(Constraint {
            body_a,
            body_b,
            max_force: f64::INFINITY,
            error_bias: (1.0f64 - 0.1).powf(60.0),
            max_bias: f64::INFINITY,
            collide_bodies: true,
            joint: joint.into(),
        })
    }

    pub fn with_max_force(mut self, max_force: f64) -> Self {
        self.max_force = max_force;
        self
    }

    pub fn with_error_bias(mut self, error_bias: f64) -> Self {
        self.error_bias = error_bias;
        self
    }

    pub fn with_max_bias(mut self, max_bias: f64) -> Self {
        self.max_bias = max_bias;
        self
    }

    pub fn with_collide_bodies(mut self, collide_bodies: bool) -> Self {
        self.collide_bodies = collide_bodies;
        self
    }

    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body_a, self.body_b)
    }

    /// The other body of the constraint.
    pub(crate) fn other_body(&self, body: BodyHandle) -> BodyHandle {
        if self.body_a == body {
            self.body_b
        } else {
            self.body_a
        }
    }

    /// Magnitude of the impulse applied during the last step. Divide by
    /// the step length for the force.
    pub fn impulse(&self) -> f64 {
        each_joint!(&self.joint, j => j.impulse())
    }

    fn limits(&self) -> Limits {
        Limits {
            max_force: self.max_force,
            error_bias: self.error_bias,
            max_bias: self.max_bias,
        }
    }

    pub(crate) fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64) {
        let limits = self.limits();
        each_joint!(&mut self.joint, j => j.pre_step(a, b, dt, &limits))
    }

    pub(crate) fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        each_joint!(&mut self.joint, j => j.apply_cached_impulse(a, b, dt_coef))
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64) {
        let limits = self.limits();
        each_joint!(&mut self.joint, j => j.apply_impulse(a, b, dt, &limits))
    }
}

/// Runs full solver steps on a pair of free bodies, for joint tests.
#[cfg(test)]
pub(crate) fn step_pair(
    constraint: &mut Constraint,
    a: &mut RigidBody,
    b: &mut RigidBody,
    dt: f64,
    steps: usize,
) {
    for _ in 0..steps {
        a.update_position(dt);
        b.update_position(dt);
        constraint.pre_step(a, b, dt);
        a.update_velocity(Vec2::ZERO, 1.0, dt);
        b.update_velocity(Vec2::ZERO, 1.0, dt);
        constraint.apply_cached_impulse(a, b, 1.0);
        for _ in 0..10 {
            constraint.apply_impulse(a, b, dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Arena;

    fn handles() -> (BodyHandle, BodyHandle) {
        let mut arena = Arena::new();
        (BodyHandle(arena.insert(())), BodyHandle(arena.insert(())))
    }

    #[test]
    fn test_constraint_rejects_self_connection() {
        let (a, _) = handles();
        let joint = SimpleMotor::new(1.0);
        assert_eq!(
            Constraint::new(a, a, joint).unwrap_err(),
            PhysicsError::SelfConstraint
        );
    }

    #[test]
    fn test_constraint_defaults() {
        let (a, b) = handles();
        let c = Constraint::new(a, b, SimpleMotor::new(1.0)).unwrap();
        assert_eq!(c.max_force, f64::INFINITY);
        assert_eq!(c.max_bias, f64::INFINITY);
        assert!(c.collide_bodies);
        assert!((c.error_bias - 0.9f64.powf(60.0)).abs() < 1e-15);
        assert_eq!(c.other_body(a), b);
        assert!(matches!(c.joint, Joint::Motor(_)));
    }

    #[test]
    fn test_bias_coef_is_framerate_independent() {
        let error_bias = 0.25;
        let one = 1.0 - bias_coef(error_bias, 1.0);
        let halves = (1.0 - bias_coef(error_bias, 0.5)).powi(2);
        assert!((one - halves).abs() < 1e-12);
        assert!((one - 0.25).abs() < 1e-12);
    }
}
