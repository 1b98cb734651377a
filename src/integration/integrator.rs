use crate::math::Vec2;
use crate::objects::rigid_body::{BodyType, RigidBody};

/// Semi-implicit Euler velocity update. `damping` is the fraction of
/// velocity kept after this step, already raised to the power of `dt`.
///
/// Kinematic and static bodies keep their velocity. Force and torque are
/// cleared for every body.
pub fn integrate_velocity(body: &mut RigidBody, gravity: Vec2, damping: f64, dt: f64) {
    if body.body_type() == BodyType::Dynamic {
        let v = body.linear_velocity * damping + (gravity + body.force * body.inv_mass()) * dt;
        let w = body.angular_velocity * damping + body.torque * body.inv_inertia() * dt;

        body.linear_velocity = v.clamp_length(body.velocity_limit);
        let w_limit = body.angular_velocity_limit;
        body.angular_velocity = w.clamp(-w_limit, w_limit);
    }

    body.clear_accumulators();
}

/// Position update from the solved velocity plus the position-correction
/// bias. The angle is never wrapped so joints can track full turns.
pub fn integrate_position(body: &mut RigidBody, dt: f64) {
    if body.body_type() == BodyType::Static {
        return;
    }

    body.position += (body.linear_velocity + body.v_bias) * dt;
    let angle = body.angle + (body.angular_velocity + body.w_bias) * dt;
    body.set_angle(angle);

    body.v_bias = Vec2::ZERO;
    body.w_bias = 0.0;
}
