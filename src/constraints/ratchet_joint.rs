use crate::error::{PhysicsError, Result};
use crate::objects::rigid_body::RigidBody;

use super::{angular_mass, apply_angular_impulses, bias_coef, JointSolver, Limits};

/// Socket-wrench ratchet: the relative angle may only advance in the
/// direction of `ratchet`, catching on every multiple of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatchetJoint {
    /// Current catch angle, relative to body A.
    pub angle: f64,
    pub phase: f64,
    ratchet: f64,

    i_sum: f64,
    bias: f64,
    j_acc: f64,
}

impl RatchetJoint {
    /// Starts caught at the bodies' current relative angle.
    pub fn new(a: &RigidBody, b: &RigidBody, phase: f64, ratchet: f64) -> Result<Self> {
        if ratchet == 0.0 || !ratchet.is_finite() {
            return Err(PhysicsError::InvalidJoint("ratchet spacing must be finite and non-zero"));
        }
        Ok(Self {
            angle: b.angle() - a.angle(),
            phase,
            ratchet,
            i_sum: 0.0,
            bias: 0.0,
            j_acc: 0.0,
        })
    }

    /// Angular distance between clicks. The sign picks the free direction.
    pub fn ratchet(&self) -> f64 {
        self.ratchet
    }
}

impl JointSolver for RatchetJoint {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let delta = b.angle - a.angle;
        let diff = self.angle - delta;

        let mut pdist = 0.0;
        if diff * self.ratchet > 0.0 {
            pdist = diff;
        } else {
            self.angle = ((delta - self.phase) / self.ratchet).floor() * self.ratchet + self.phase;
        }

        self.i_sum = angular_mass(a, b);

        let max_bias = limits.max_bias;
        self.bias = (-bias_coef(limits.error_bias, dt) * pdist / dt).clamp(-max_bias, max_bias);

        // Not caught, nothing to warm start.
        if self.bias == 0.0 {
            self.j_acc = 0.0;
        }
    }

    fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        self.j_acc *= dt_coef;
        apply_angular_impulses(a, b, self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        if self.bias == 0.0 {
            return;
        }

        let wr = b.angular_velocity - a.angular_velocity;
        let ratchet = self.ratchet;
        let j_max = limits.max_force * dt;

        let j = -(self.bias + wr) * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = ((j_old + j) * ratchet).clamp(0.0, j_max * ratchet.abs()) / ratchet;

        apply_angular_impulses(a, b, self.j_acc - j_old);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}
