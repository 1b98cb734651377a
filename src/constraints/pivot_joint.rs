use crate::math::Vec2;
use crate::objects::rigid_body::{apply_impulses, k_tensor, relative_velocity, Mat2, RigidBody};

use super::{bias_coef, world_offset, JointSolver, Limits};

/// Holds two anchor points together so the bodies can only rotate about
/// the shared point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotJoint {
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,

    r1: Vec2,
    r2: Vec2,
    k: Mat2,
    j_acc: Vec2,
    bias: Vec2,
}

impl PivotJoint {
    pub fn new(anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self {
            anchor_a,
            anchor_b,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            k: Mat2::default(),
            j_acc: Vec2::ZERO,
            bias: Vec2::ZERO,
        }
    }

    /// Pivot about a world-space point, using the bodies' current poses.
    pub fn from_world_pivot(a: &RigidBody, b: &RigidBody, pivot: Vec2) -> Self {
        Self::new(a.world_to_local(pivot), b.world_to_local(pivot))
    }
}

impl JointSolver for PivotJoint {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        self.r1 = world_offset(a, self.anchor_a);
        self.r2 = world_offset(b, self.anchor_b);
        self.k = k_tensor(a, b, self.r1, self.r2);

        let delta = (b.position + self.r2) - (a.position + self.r1);
        self.bias = (delta * (-bias_coef(limits.error_bias, dt) / dt)).clamp_length(limits.max_bias);
    }

    fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        self.j_acc = self.j_acc * dt_coef;
        apply_impulses(a, b, self.r1, self.r2, self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let vr = relative_velocity(a, b, self.r1, self.r2);
        let j = self.k.transform(self.bias - vr);

        let j_old = self.j_acc;
        self.j_acc = (self.j_acc + j).clamp_length(limits.max_force * dt);

        apply_impulses(a, b, self.r1, self.r2, self.j_acc - j_old);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.magnitude()
    }
}
