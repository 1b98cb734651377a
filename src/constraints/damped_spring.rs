use crate::math::Vec2;
use crate::objects::rigid_body::{
    apply_impulses, k_scalar, normal_relative_velocity, safe_inverse, RigidBody,
};

use super::{world_offset, JointSolver, Limits};

/// Damped linear spring between two anchors. Pulls toward `rest_length`
/// with `stiffness` and damps the relative speed along the spring axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampedSpring {
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    pub rest_length: f64,
    pub stiffness: f64,
    pub damping: f64,

    r1: Vec2,
    r2: Vec2,
    n: Vec2,
    n_mass: f64,
    target_vrn: f64,
    v_coef: f64,
    j_acc: f64,
}

impl DampedSpring {
    pub fn new(
        anchor_a: Vec2,
        anchor_b: Vec2,
        rest_length: f64,
        stiffness: f64,
        damping: f64,
    ) -> Self {
        Self {
            anchor_a,
            anchor_b,
            rest_length,
            stiffness,
            damping,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            n: Vec2::ZERO,
            n_mass: 0.0,
            target_vrn: 0.0,
            v_coef: 0.0,
            j_acc: 0.0,
        }
    }

    /// Spring force for the given anchor distance. Positive pushes apart.
    pub fn spring_force(&self, dist: f64) -> f64 {
        (self.rest_length - dist) * self.stiffness
    }
}

impl JointSolver for DampedSpring {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, _limits: &Limits) {
        self.r1 = world_offset(a, self.anchor_a);
        self.r2 = world_offset(b, self.anchor_b);

        let delta = (b.position + self.r2) - (a.position + self.r1);
        let dist = delta.magnitude();
        self.n = delta.normalize();

        let k = if self.n == Vec2::ZERO {
            0.0
        } else {
            k_scalar(a, b, self.r1, self.r2, self.n)
        };
        self.n_mass = safe_inverse(k);

        self.target_vrn = 0.0;
        self.v_coef = 1.0 - (-self.damping * dt * k).exp();

        // The spring itself is applied once per step, explicitly.
        self.j_acc = self.spring_force(dist) * dt;
        apply_impulses(a, b, self.r1, self.r2, self.n * self.j_acc);
    }

    fn apply_cached_impulse(&mut self, _a: &mut RigidBody, _b: &mut RigidBody, _dt_coef: f64) {}

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, _dt: f64, _limits: &Limits) {
        let n = self.n;
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, n);

        let v_damp = (self.target_vrn - vrn) * self.v_coef;
        self.target_vrn = vrn + v_damp;

        let j_damp = v_damp * self.n_mass;
        self.j_acc += j_damp;
        apply_impulses(a, b, self.r1, self.r2, n * j_damp);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Arena, BodyHandle};
    use crate::constraints::{step_pair, Constraint};
    use approx::assert_abs_diff_eq;

    fn constraint(joint: DampedSpring) -> Constraint {
        let mut arena = Arena::new();
        let ha = BodyHandle(arena.insert(()));
        let hb = BodyHandle(arena.insert(()));
        Constraint::new(ha, hb, joint).unwrap()
    }

    #[test]
    fn test_damped_spring_force() {
        let spring = DampedSpring::new(Vec2::ZERO, Vec2::ZERO, 2.0, 10.0, 0.0);
        assert_eq!(spring.spring_force(3.0), -10.0);
        assert_eq!(spring.spring_force(1.0), 10.0);
    }

    #[test]
    fn test_damped_spring_pulls_stretched_bodies_together() {
        let mut a = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        let mut b = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        b.set_position(Vec2::new(3.0, 0.0));
        let mut c = constraint(DampedSpring::new(Vec2::ZERO, Vec2::ZERO, 2.0, 10.0, 0.0));

        step_pair(&mut c, &mut a, &mut b, 1.0 / 60.0, 1);

        assert!(a.linear_velocity.x > 0.0);
        assert!(b.linear_velocity.x < 0.0);
        assert_abs_diff_eq!(a.linear_velocity.x + b.linear_velocity.x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_damped_spring_settles_at_rest_length() {
        let mut anchor = RigidBody::new_static();
        let mut weight = RigidBody::new_dynamic(1.0, f64::INFINITY).unwrap();
        weight.set_position(Vec2::new(3.0, 0.0));
        let mut c = constraint(DampedSpring::new(Vec2::ZERO, Vec2::ZERO, 2.0, 20.0, 5.0));

        step_pair(&mut c, &mut anchor, &mut weight, 1.0 / 60.0, 600);

        assert_abs_diff_eq!(weight.position().x, 2.0, epsilon = 1e-2);
        assert!(weight.linear_velocity.magnitude() < 1e-2);
    }
}
