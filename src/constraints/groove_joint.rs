use crate::math::Vec2;
use crate::objects::rigid_body::{apply_impulses, k_tensor, relative_velocity, Mat2, RigidBody};

use super::{bias_coef, world_offset, JointSolver, Limits};

/// Pivot that slides along a groove on body A, from `groove_a` to
/// `groove_b` in A's local coordinates. `anchor_b` rides in the groove.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrooveJoint {
    pub groove_a: Vec2,
    pub groove_b: Vec2,
    pub anchor_b: Vec2,
    groove_normal: Vec2,

    groove_tangent: Vec2,
    clamp: f64,
    r1: Vec2,
    r2: Vec2,
    k: Mat2,
    j_acc: Vec2,
    bias: Vec2,
}

impl GrooveJoint {
    pub fn new(groove_a: Vec2, groove_b: Vec2, anchor_b: Vec2) -> Self {
        Self {
            groove_a,
            groove_b,
            anchor_b,
            groove_normal: (groove_b - groove_a).normalize().perpendicular(),
            groove_tangent: Vec2::ZERO,
            clamp: 0.0,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            k: Mat2::default(),
            j_acc: Vec2::ZERO,
            bias: Vec2::ZERO,
        }
    }

    /// Keeps the impulse inside the groove unless an end is pushing back.
    fn constrain(&self, j: Vec2, dt: f64, limits: &Limits) -> Vec2 {
        let n = self.groove_tangent;
        let j_clamp = if self.clamp * j.cross(n) > 0.0 {
            j
        } else {
            j.project(n)
        };
        j_clamp.clamp_length(limits.max_force * dt)
    }
}

impl JointSolver for GrooveJoint {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let ta = a.local_to_world(self.groove_a);
        let tb = a.local_to_world(self.groove_b);

        let n = a.transform.apply_vector(self.groove_normal);
        let d = ta.dot(n);
        self.groove_tangent = n;
        self.r2 = world_offset(b, self.anchor_b);

        // Position of the anchor along the groove.
        let td = (b.position + self.r2).cross(n);
        if td <= ta.cross(n) {
            self.clamp = 1.0;
            self.r1 = ta - a.position;
        } else if td >= tb.cross(n) {
            self.clamp = -1.0;
            self.r1 = tb - a.position;
        } else {
            self.clamp = 0.0;
            self.r1 = (n.perpendicular() * -td + n * d) - a.position;
        }

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
        self.j_acc = self.constrain(j_old + j, dt, limits);

        apply_impulses(a, b, self.r1, self.r2, self.j_acc - j_old);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.magnitude()
    }
}
