use crate::error::{PhysicsError, Result};
use crate::objects::rigid_body::RigidBody;

use super::{angular_mass, apply_angular_impulses, bias_coef, JointSolver, Limits};

/// Keeps the angle of body B relative to body A within `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotaryLimitJoint {
    pub min: f64,
    pub max: f64,

    i_sum: f64,
    bias: f64,
    j_acc: f64,
}

impl RotaryLimitJoint {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min <= max) {
            return Err(PhysicsError::InvalidJoint("rotary limit needs min <= max"));
        }
        Ok(Self {
            min,
            max,
            i_sum: 0.0,
            bias: 0.0,
            j_acc: 0.0,
        })
    }
}

impl JointSolver for RotaryLimitJoint {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let dist = b.angle - a.angle;
        let mut pdist = 0.0;
        if dist > self.max {
            pdist = self.max - dist;
        } else if dist < self.min {
            pdist = self.min - dist;
        }

        self.i_sum = angular_mass(a, b);

        let max_bias = limits.max_bias;
        self.bias = (-bias_coef(limits.error_bias, dt) * pdist / dt).clamp(-max_bias, max_bias);

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
        let j_max = limits.max_force * dt;

        let j = -(self.bias + wr) * self.i_sum;
        let j_old = self.j_acc;
        // Below the minimum the joint may only push forward, above the
        // maximum only back.
        self.j_acc = if self.bias < 0.0 {
            (j_old + j).clamp(0.0, j_max)
        } else {
            (j_old + j).clamp(-j_max, 0.0)
        };

        apply_angular_impulses(a, b, self.j_acc - j_old);
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

    fn constraint(joint: RotaryLimitJoint) -> Constraint {
        let mut arena = Arena::new();
        let ha = BodyHandle(arena.insert(()));
        let hb = BodyHandle(arena.insert(()));
        Constraint::new(ha, hb, joint).unwrap()
    }

    #[test]
    fn test_rotary_limit_rejects_inverted_range() {
        assert!(RotaryLimitJoint::new(1.0, -1.0).is_err());
    }

    #[test]
    fn test_rotary_limit_stops_at_max() {
        let mut a = RigidBody::new_static();
        let mut b = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        b.angular_velocity = 2.0;
        let mut c = constraint(RotaryLimitJoint::new(-0.5, 0.5).unwrap());

        step_pair(&mut c, &mut a, &mut b, 1.0 / 60.0, 60);

        assert!(b.angle() < 0.52);
        assert!(b.angle() > 0.45);
        assert!(b.angular_velocity.abs() < 0.05);
    }

    #[test]
    fn test_rotary_limit_free_inside_range() {
        let mut a = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        let mut b = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        b.angular_velocity = -0.5;
        let mut c = constraint(RotaryLimitJoint::new(-1.0, 1.0).unwrap());

        step_pair(&mut c, &mut a, &mut b, 1.0 / 60.0, 60);

        assert_eq!(b.angular_velocity, -0.5);
        assert_eq!(a.angular_velocity, 0.0);
        assert_eq!(c.impulse(), 0.0);
    }
}
