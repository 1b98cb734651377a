use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 2D vector of `f64` components. Also used as a unit rotation vector
/// `(cos a, sin a)` by [`Vec2::rotate_by`] and [`Vec2::unrotate_by`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const X: Vec2 = Vec2 { x: 1.0, y: 0.0 };
    pub const Y: Vec2 = Vec2 { x: 0.0, y: 1.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians).
    pub fn for_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    /// Angle of the vector in radians, in `(-PI, PI]`.
    pub fn to_angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product of the two vectors.
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn magnitude_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn magnitude(self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    /// Unit vector in the same direction. The zero vector stays zero.
    pub fn normalize(self) -> Self {
        let mag = self.magnitude();
        if mag == 0.0 {
            Self::ZERO
        } else {
            self * (1.0 / mag)
        }
    }

    pub fn distance_squared(self, other: Self) -> f64 {
        (self - other).magnitude_squared()
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).magnitude()
    }

    /// Counter-clockwise perpendicular, `(-y, x)`.
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Clockwise perpendicular, `(y, -x)`.
    pub fn rperp(self) -> Self {
        Self::new(self.y, -self.x)
    }

    /// Rotates the vector by `angle` radians.
    pub fn rotate(self, angle: f64) -> Self {
        self.rotate_by(Self::for_angle(angle))
    }

    /// Complex multiplication with the rotation vector `rot`.
    pub fn rotate_by(self, rot: Self) -> Self {
        Self::new(
            self.x * rot.x - self.y * rot.y,
            self.x * rot.y + self.y * rot.x,
        )
    }

    /// Inverse of [`Vec2::rotate_by`] for a unit `rot`.
    pub fn unrotate_by(self, rot: Self) -> Self {
        Self::new(
            self.x * rot.x + self.y * rot.y,
            self.y * rot.x - self.x * rot.y,
        )
    }

    /// Projection of `self` onto `onto`.
    pub fn project(self, onto: Self) -> Self {
        onto * (self.dot(onto) / onto.dot(onto))
    }

    pub fn lerp(self, other: Self, t: f64) -> Self {
        self * (1.0 - t) + other * t
    }

    /// Scales the vector down so its length does not exceed `len`.
    pub fn clamp_length(self, len: f64) -> Self {
        if self.magnitude_squared() > len * len {
            self.normalize() * len
        } else {
            self
        }
    }

    /// True when the two points are closer than `dist`.
    pub fn near(self, other: Self, dist: f64) -> bool {
        self.distance_squared(other) < dist * dist
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl Mul<Vec2> for f64 {
    type Output = Vec2;

    fn mul(self, vec: Vec2) -> Vec2 {
        vec * self
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}
