use crate::objects::rigid_body::RigidBody;

use super::{angular_mass, apply_angular_impulses, JointSolver, Limits};

/// Spins body A relative to body B at a constant `rate`, in radians per
/// second. Without a `max_force` the motor has unlimited torque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleMotor {
    pub rate: f64,

    i_sum: f64,
    j_acc: f64,
}

impl SimpleMotor {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            i_sum: 0.0,
            j_acc: 0.0,
        }
    }
}

impl JointSolver for SimpleMotor {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, _dt: f64, _limits: &Limits) {
        self.i_sum = angular_mass(a, b);
    }

    fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        self.j_acc *= dt_coef;
        apply_angular_impulses(a, b, self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let wr = b.angular_velocity - a.angular_velocity + self.rate;
        let j_max = limits.max_force * dt;

        let j = -wr * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = (j_old + j).clamp(-j_max, j_max);

        apply_angular_impulses(a, b, self.j_acc - j_old);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}
