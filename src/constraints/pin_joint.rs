use log::warn;

use crate::math::vec2::Vec2;
use crate::objects::rigid_body::{
    apply_impulses, k_scalar, normal_relative_velocity, safe_inverse, RigidBody,
};

use super::{bias_coef, world_offset, JointSolver, Limits};

/// Keeps two anchor points (one on each body) at a fixed distance, like
/// a massless rod.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinJoint {
    /// Anchor on body A, relative to its origin.
    pub anchor_a: Vec2,
    /// Anchor on body B, relative to its origin.
    pub anchor_b: Vec2,
    /// Distance the joint holds the anchors at.
    pub distance: f64,

    r1: Vec2,
    r2: Vec2,
    n: Vec2,
    n_mass: f64,
    jn_acc: f64,
    bias: f64,
}

impl PinJoint {
    /// Pins the anchors at their current distance.
    pub fn new(a: &RigidBody, b: &RigidBody, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        let p1 = a.local_to_world(anchor_a);
        let p2 = b.local_to_world(anchor_b);
        let distance = p1.distance(p2);
        if distance == 0.0 {
            warn!("zero length pin joint; a pivot joint is more stable");
        }
        Self::with_distance(anchor_a, anchor_b, distance)
    }

    pub fn with_distance(anchor_a: Vec2, anchor_b: Vec2, distance: f64) -> Self {
        Self {
            anchor_a,
            anchor_b,
            distance,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            n: Vec2::ZERO,
            n_mass: 0.0,
            jn_acc: 0.0,
            bias: 0.0,
        }
    }
}

impl JointSolver for PinJoint {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        self.r1 = world_offset(a, self.anchor_a);
        self.r2 = world_offset(b, self.anchor_b);

        let delta = (b.position + self.r2) - (a.position + self.r1);
        let dist = delta.magnitude();
        self.n = delta.normalize();
        self.n_mass = if self.n == Vec2::ZERO {
            0.0
        } else {
            safe_inverse(k_scalar(a, b, self.r1, self.r2, self.n))
        };

        let max_bias = limits.max_bias;
        self.bias = (-bias_coef(limits.error_bias, dt) * (dist - self.distance) / dt)
            .clamp(-max_bias, max_bias);
    }

    fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        self.jn_acc *= dt_coef;
        apply_impulses(a, b, self.r1, self.r2, self.n * self.jn_acc);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let n = self.n;
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, n);
        let jn_max = limits.max_force * dt;

        let jn = (self.bias - vrn) * self.n_mass;
        let jn_old = self.jn_acc;
        self.jn_acc = (jn_old + jn).clamp(-jn_max, jn_max);

        apply_impulses(a, b, self.r1, self.r2, n * (self.jn_acc - jn_old));
    }

    fn impulse(&self) -> f64 {
        self.jn_acc.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Arena, BodyHandle};
    use crate::constraints::{step_pair, Constraint};
    const EPSILON: f64 = 1e-9;

    fn bodies() -> (RigidBody, RigidBody) {
        let mut a = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        let mut b = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        a.set_position(Vec2::new(0.0, 0.0));
        b.set_position(Vec2::new(4.0, 0.0));
        (a, b)
    }

    fn constraint(joint: PinJoint) -> Constraint {
        let mut arena = Arena::new();
        let ha = BodyHandle(arena.insert(()));
        let hb = BodyHandle(arena.insert(()));
        Constraint::new(ha, hb, joint).unwrap()
    }

    #[test]
    fn test_pin_joint_new_measures_distance() {
        let (a, b) = bodies();
        let pj = PinJoint::new(&a, &b, Vec2::new(1.0, 0.0), Vec2::new(-1.0, 0.0));
        assert!((pj.distance - 2.0).abs() < EPSILON);
        assert_eq!(pj.anchor_a, Vec2::new(1.0, 0.0));
        assert_eq!(pj.anchor_b, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_pin_joint_stops_separation() {
        let (mut a, mut b) = bodies();
        let joint = PinJoint::new(&a, &b, Vec2::ZERO, Vec2::ZERO);
        let mut c = constraint(joint);
        a.linear_velocity = Vec2::new(-1.0, 0.0);
        b.linear_velocity = Vec2::new(1.0, 0.0);

        step_pair(&mut c, &mut a, &mut b, 1.0 / 60.0, 60);

        assert!((a.position().distance(b.position()) - 4.0).abs() < 1e-3);
        assert!(a.linear_velocity.x.abs() < 1e-3);
        assert!((a.linear_velocity + b.linear_velocity).magnitude() < EPSILON);
        assert!(c.impulse() >= 0.0);
    }

    #[test]
    fn test_pin_joint_one_static() {
        let mut fixed = RigidBody::new_static();
        let mut ball = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        ball.set_position(Vec2::new(3.0, 0.0));
        let joint = PinJoint::new(&fixed, &ball, Vec2::ZERO, Vec2::ZERO);
        let mut c = constraint(joint);
        ball.linear_velocity = Vec2::new(0.0, 2.0);

        step_pair(&mut c, &mut fixed, &mut ball, 1.0 / 60.0, 120);

        assert_eq!(fixed.position(), Vec2::ZERO);
        assert!((ball.position().magnitude() - 3.0).abs() < 1e-2);
        // The rod turns the motion into a swing about the pin.
        let radial = ball.linear_velocity.dot(ball.position().normalize());
        assert!(radial.abs() < 0.05);
        assert!(ball.linear_velocity.magnitude() > 1.0);
    }

    #[test]
    fn test_pin_joint_already_satisfied() {
        let (mut a, mut b) = bodies();
        let joint = PinJoint::new(&a, &b, Vec2::ZERO, Vec2::ZERO);
        let mut c = constraint(joint);
        step_pair(&mut c, &mut a, &mut b, 1.0 / 60.0, 5);
        assert_eq!(a.position(), Vec2::ZERO);
        assert_eq!(b.position(), Vec2::new(4.0, 0.0));
        assert_eq!(c.impulse(), 0.0);
    }
}
