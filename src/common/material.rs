//! Surface properties combined per contact pair.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Surface response of a shape. The arbiter for a pair multiplies the
/// two shapes' values.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Coefficient of restitution. 0 is perfectly inelastic, 1 perfectly
    /// elastic.
    pub restitution: f64,
    /// Coulomb friction coefficient, `>= 0`.
    pub friction: f64,
}

impl Material {
    pub fn new(restitution: f64, friction: f64) -> Self {
        Material {
            restitution: restitution.clamp(0.0, 1.0),
            friction: friction.max(0.0),
        }
    }

    /// Elasticity and friction of a contact between two materials.
    pub fn combine(self, other: Material) -> Material {
        Material {
            restitution: self.restitution * other.restitution,
            friction: self.friction * other.friction,
        }
    }
}

impl Default for Material {
    /// Inelastic and frictionless.
    fn default() -> Self {
        Material {
            restitution: 0.0,
            friction: 0.0,
        }
    }
}
