use crate::error::{PhysicsError, Result};
use crate::math::Vec2;
use crate::objects::rigid_body::{
    apply_impulses, k_scalar, relative_velocity, safe_inverse, RigidBody,
};

use super::{bias_coef, world_offset, JointSolver, Limits};

/// Like a pin joint, but the distance may vary between `min` and `max`.
/// Acts as a rope when `min` is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideJoint {
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    pub min: f64,
    pub max: f64,

    r1: Vec2,
    r2: Vec2,
    n: Vec2,
    n_mass: f64,
    jn_acc: f64,
    bias: f64,
}

impl SlideJoint {
    pub fn new(anchor_a: Vec2, anchor_b: Vec2, min: f64, max: f64) -> Result<Self> {
        if !(min <= max) || min < 0.0 {
            return Err(PhysicsError::InvalidJoint(
                "slide joint needs 0 <= min <= max",
            ));
        }
        Ok(Self {
            anchor_a,
            anchor_b,
            min,
            max,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            n: Vec2::ZERO,
            n_mass: 0.0,
            jn_acc: 0.0,
            bias: 0.0,
        })
    }
}

impl JointSolver for SlideJoint {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        self.r1 = world_offset(a, self.anchor_a);
        self.r2 = world_offset(b, self.anchor_b);

        let delta = (b.position + self.r2) - (a.position + self.r1);
        let dist = delta.magnitude();
        let mut pdist = 0.0;
        if dist > self.max {
            pdist = dist - self.max;
            self.n = delta.normalize();
        } else if dist < self.min {
            pdist = self.min - dist;
            self.n = -delta.normalize();
        } else {
            self.n = Vec2::ZERO;
            self.jn_acc = 0.0;
        }

        self.n_mass = if self.n == Vec2::ZERO {
            0.0
        } else {
            safe_inverse(k_scalar(a, b, self.r1, self.r2, self.n))
        };

        let max_bias = limits.max_bias;
        self.bias = (-bias_coef(limits.error_bias, dt) * pdist / dt).clamp(-max_bias, max_bias);
    }

    fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        self.jn_acc *= dt_coef;
        apply_impulses(a, b, self.r1, self.r2, self.n * self.jn_acc);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        // Within range.
        if self.n == Vec2::ZERO {
            return;
        }

        let n = self.n;
        let vrn = relative_velocity(a, b, self.r1, self.r2).dot(n);

        let jn = (self.bias - vrn) * self.n_mass;
        let jn_old = self.jn_acc;
        self.jn_acc = (jn_old + jn).clamp(-limits.max_force * dt, 0.0);

        apply_impulses(a, b, self.r1, self.r2, n * (self.jn_acc - jn_old));
    }

    fn impulse(&self) -> f64 {
        self.jn_acc.abs()
    }
}
