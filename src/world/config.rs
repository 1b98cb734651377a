//! Tunables of a [`Space`](super::Space).

use crate::error::{PhysicsError, Result};
use crate::math::Vec2;

pub use crate::collision::NarrowPhase;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solver, sleeping and contact settings of a space.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SpaceConfig {
    /// Solver iterations per step.
    pub iterations: usize,
    pub gravity: Vec2,
    /// Fraction of velocity kept after one second. 1 disables damping.
    pub damping: f64,
    /// Speed under which a body counts as idle. 0 derives it from gravity.
    pub idle_speed_threshold: f64,
    /// Seconds a whole component must stay idle before it falls asleep.
    /// Infinity disables sleeping.
    pub sleep_time_threshold: f64,
    /// Overlap allowed between shapes before position correction kicks in.
    pub collision_slop: f64,
    /// Fraction of overlap left uncorrected after one second.
    pub collision_bias: f64,
    /// Steps an arbiter is kept after its shapes stop touching.
    pub collision_persistence: u32,
    pub narrow_phase: NarrowPhase,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        SpaceConfig {
            iterations: 10,
            gravity: Vec2::ZERO,
            damping: 1.0,
            idle_speed_threshold: 0.0,
            sleep_time_threshold: f64::INFINITY,
            collision_slop: 0.1,
            collision_bias: (1.0f64 - 0.1).powf(60.0),
            collision_persistence: 3,
            narrow_phase: NarrowPhase::Gjk,
        }
    }
}

impl SpaceConfig {
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_sleep_time_threshold(mut self, seconds: f64) -> Self {
        self.sleep_time_threshold = seconds;
        self
    }

    pub fn with_idle_speed_threshold(mut self, speed: f64) -> Self {
        self.idle_speed_threshold = speed;
        self
    }

    pub fn with_narrow_phase(mut self, narrow_phase: NarrowPhase) -> Self {
        self.narrow_phase = narrow_phase;
        self
    }

    pub fn sleeping_enabled(&self) -> bool {
        self.sleep_time_threshold != f64::INFINITY
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1"));
        }
        if !self.gravity.x.is_finite() || !self.gravity.y.is_finite() {
            return Err(invalid("gravity must be finite"));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(invalid(format!("damping must be in (0, 1], got {}", self.damping)));
        }
        if !(self.collision_bias > 0.0 && self.collision_bias <= 1.0) {
            return Err(invalid(format!(
                "collision bias must be in (0, 1], got {}",
                self.collision_bias
            )));
        }
        if !(self.collision_slop >= 0.0) {
            return Err(invalid("collision slop must be non-negative"));
        }
        if !(self.idle_speed_threshold >= 0.0) || !(self.sleep_time_threshold >= 0.0) {
            return Err(invalid("sleep thresholds must be non-negative"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> PhysicsError {
    PhysicsError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_config_defaults_are_valid() {
        let config = SpaceConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.sleeping_enabled());
        assert_eq!(config.collision_persistence, 3);
        assert_eq!(config.narrow_phase, NarrowPhase::Gjk);
    }

    #[test]
    fn test_space_config_rejects_bad_values() {
        let bad = [
            SpaceConfig::default().with_iterations(0),
            SpaceConfig::default().with_damping(0.0),
            SpaceConfig::default().with_damping(1.5),
            SpaceConfig::default().with_sleep_time_threshold(-1.0),
            SpaceConfig::default().with_gravity(Vec2::new(f64::NAN, 0.0)),
            SpaceConfig {
                collision_bias: 0.0,
                ..SpaceConfig::default()
            },
            SpaceConfig {
                collision_slop: -0.1,
                ..SpaceConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(PhysicsError::InvalidConfig(_))));
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_space_config_serde_fills_missing_fields() {
        let config: SpaceConfig =
            serde_json::from_str(r#"{ "iterations": 20, "gravity": { "x": 0.0, "y": -10.0 } }"#)
                .unwrap();
        assert_eq!(config.iterations, 20);
        assert_eq!(config.gravity, Vec2::new(0.0, -10.0));
        assert_eq!(config.collision_slop, 0.1);
    }
}
