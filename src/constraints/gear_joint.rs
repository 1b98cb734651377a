use crate::error::{PhysicsError, Result};
use crate::objects::rigid_body::{safe_inverse, RigidBody};

use super::{bias_coef, JointSolver, Limits};

/// Keeps the angular velocity ratio of two bodies constant. `phase` is
/// the initial angular offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearJoint {
    pub phase: f64,
    ratio: f64,
    ratio_inv: f64,

    i_sum: f64,
    bias: f64,
    j_acc: f64,
}

impl GearJoint {
    pub fn new(phase: f64, ratio: f64) -> Result<Self> {
        if ratio == 0.0 || !ratio.is_finite() {
            return Err(PhysicsError::InvalidJoint("gear ratio must be finite and non-zero"));
        }
        Ok(Self {
            phase,
            ratio,
            ratio_inv: 1.0 / ratio,
            i_sum: 0.0,
            bias: 0.0,
            j_acc: 0.0,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: f64) -> Result<()> {
        let checked = Self::new(self.phase, ratio)?;
        self.ratio = checked.ratio;
        self.ratio_inv = checked.ratio_inv;
        Ok(())
    }

    fn apply(&self, a: &mut RigidBody, b: &mut RigidBody, j: f64) {
        a.angular_velocity -= j * a.inv_inertia() * self.ratio_inv;
        b.angular_velocity += j * b.inv_inertia();
    }
}

impl JointSolver for GearJoint {
    fn pre_step(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let sum = a.inv_inertia() * self.ratio_inv + self.ratio * b.inv_inertia();
        debug_assert!(sum != 0.0, "unsolvable constraint");
        self.i_sum = safe_inverse(sum);

        let error = b.angle * self.ratio - a.angle - self.phase;
        let max_bias = limits.max_bias;
        self.bias = (-bias_coef(limits.error_bias, dt) * error / dt).clamp(-max_bias, max_bias);
    }

    fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        self.j_acc *= dt_coef;
        self.apply(a, b, self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64, limits: &Limits) {
        let wr = b.angular_velocity * self.ratio - a.angular_velocity;
        let j_max = limits.max_force * dt;

        let j = (self.bias - wr) * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = (j_old + j).clamp(-j_max, j_max);

        self.apply(a, b, self.j_acc - j_old);
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

    fn constraint(joint: GearJoint) -> Constraint {
        let mut arena = Arena::new();
        let ha = BodyHandle(arena.insert(()));
        let hb = BodyHandle(arena.insert(()));
        Constraint::new(ha, hb, joint).unwrap()
    }

    #[test]
    fn test_gear_joint_rejects_zero_ratio() {
        assert!(GearJoint::new(0.0, 0.0).is_err());
        let mut gear = GearJoint::new(0.5, 2.0).unwrap();
        assert!(gear.set_ratio(0.0).is_err());
        gear.set_ratio(4.0).unwrap();
        assert_eq!(gear.ratio(), 4.0);
        assert_eq!(gear.phase, 0.5);
    }

    #[test]
    fn test_gear_joint_holds_ratio() {
        let mut a = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        let mut b = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        a.angular_velocity = 3.0;
        let mut c = constraint(GearJoint::new(0.0, 2.0).unwrap());

        step_pair(&mut c, &mut a, &mut b, 1.0 / 60.0, 60);

        assert_abs_diff_eq!(b.angular_velocity * 2.0, a.angular_velocity, epsilon = 1e-3);
        assert_abs_diff_eq!(b.angle() * 2.0, a.angle(), epsilon = 1e-2);
        assert!(a.angular_velocity > 0.0);
    }
}
