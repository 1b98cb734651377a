use super::vec2::Vec2;

/// Rigid transform: rotation by a unit rotation vector, then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    /// `(cos a, sin a)` of the rotation angle.
    pub rot: Vec2,
}

impl Transform {
    pub fn new(position: Vec2, angle: f64) -> Self {
        Self {
            position,
            rot: Vec2::for_angle(angle),
        }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec2::ZERO,
            rot: Vec2::X,
        }
    }

    /// Maps a local point to world space.
    pub fn apply(self, point: Vec2) -> Vec2 {
        point.rotate_by(self.rot) + self.position
    }

    /// Maps a local direction to world space (rotation only).
    pub fn apply_vector(self, vector: Vec2) -> Vec2 {
        vector.rotate_by(self.rot)
    }

    /// Maps a world point back to local space.
    pub fn apply_inverse(self, point: Vec2) -> Vec2 {
        (point - self.position).unrotate_by(self.rot)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_transform_identity_is_noop() {
        let t = Transform::identity();
        let p = Vec2::new(5.0, -3.0);
        assert_eq!(t.apply(p), p);
        assert_eq!(t.apply_inverse(p), p);
    }

    #[test]
    fn test_transform_rotation_then_translation() {
        let t = Transform::new(Vec2::new(10.0, 5.0), PI / 2.0);
        let p = t.apply(Vec2::new(1.0, 0.0));
        assert!((p.x - 10.0).abs() < EPSILON);
        assert!((p.y - 6.0).abs() < EPSILON);

        let v = t.apply_vector(Vec2::new(1.0, 0.0));
        assert!(v.x.abs() < EPSILON);
        assert!((v.y - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_transform_inverse_round_trips() {
        let t = Transform::new(Vec2::new(-2.0, 7.5), 1.3);
        let p = Vec2::new(3.0, -4.0);
        let back = t.apply_inverse(t.apply(p));
        assert!((back.x - p.x).abs() < EPSILON);
        assert!((back.y - p.y).abs() < EPSILON);
    }
}
