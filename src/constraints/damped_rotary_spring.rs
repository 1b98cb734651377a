use crate::objects::rigid_body::{safe_inverse, RigidBody};

use super::{JointSolver, Limits};

/// Angular counterpart of [`DampedSpring`](super::DampedSpring). Pulls
/// body A's angle minus body B's toward `rest_angle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampedRotarySpring {
    pub rest_angle: f64,
    pub stiffness: f64,
    pub damping: f64,

    i_sum: f64,
    target_wrn: f64,
    w_coef: f64,
    j_acc: f64,
}

impl DampedRotarySpring {
    pub fn new(rest_angle: f64, stiffness: f64, damping: f64) -> Self {
        Self {
            rest_angle,
            stiffness,
            damping,
            i_sum: 0.0,
            target_wrn: 0.0,
            w_coef: 0.0,
            j_acc: 0.0,
        }
    }

    /// Spring torque for the given relative angle.
    pub fn spring_torque(&self, relative_angle: f64) -> f64 {
        (relative_angle - self.rest_angle) * self.stiffness
    }
}

impl JointSolver for DampedRotarySpring {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, _limits: &Limits) {
        let moment = a.inv_inertia() + b.inv_inertia();
        debug_assert!(moment != 0.0, "unsolvable constraint");
        self.i_sum = safe_inverse(moment);

        self.w_coef = 1.0 - (-self.damping * dt * moment).exp();
        self.target_wrn = 0.0;

        let j_spring = self.spring_torque(a.angle - b.angle) * dt;
        self.j_acc = j_spring;
        a.angular_velocity -= j_spring * a.inv_inertia();
        b.angular_velocity += j_spring * b.inv_inertia();
    }

    fn apply_cached_impulse(&mut self, _a: &mut RigidBody, _b: &mut RigidBody, _dt_coef: f64) {}

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, _dt: f64, _limits: &Limits) {
        let wrn = a.angular_velocity - b.angular_velocity;

        let w_damp = (self.target_wrn - wrn) * self.w_coef;
        self.target_wrn = wrn + w_damp;

        let j_damp = w_damp * self.i_sum;
        a.angular_velocity += j_damp * a.inv_inertia();
        b.angular_velocity -= j_damp * b.inv_inertia();
        self.j_acc += j_damp;
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}
