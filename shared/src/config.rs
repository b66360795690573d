//! Simulation parameters
//!
//! Defaults match the constants in the crate root. A server can override them
//! from a JSON file; any field left out keeps its default.

use crate::physics::MotionParams;
use crate::{
    DEATH_DROP_CAP, FOOD_TARGET, HEAD_RADIUS, INTEREST_RADIUS, MIN_INPUT_INTERVAL_MS,
    PICKUP_RADIUS, SEGMENT_SPACING, SELF_COLLISION_SKIP, SPAWN_EXTENT, START_LENGTH, TICK_RATE,
    WORLD_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Side length of the square world, centered on the origin.
    pub world_size: u16,
    pub tick_rate: u32,
    pub food_target: usize,
    pub start_length: u32,
    pub segment_spacing: f32,
    pub motion: MotionParams,
    pub head_radius: f32,
    pub pickup_radius: f32,
    /// Number of own body points, counted from the head, ignored by self collision.
    pub self_collision_skip: usize,
    pub death_drop_cap: usize,
    pub interest_radius: f32,
    pub min_input_interval_ms: u64,
    /// Spawn heads fall uniformly in `[-spawn_extent, spawn_extent]` on both axes.
    pub spawn_extent: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_size: WORLD_SIZE,
            tick_rate: TICK_RATE,
            food_target: FOOD_TARGET,
            start_length: START_LENGTH,
            segment_spacing: SEGMENT_SPACING,
            motion: MotionParams::default(),
            head_radius: HEAD_RADIUS,
            pickup_radius: PICKUP_RADIUS,
            self_collision_skip: SELF_COLLISION_SKIP,
            death_drop_cap: DEATH_DROP_CAP,
            interest_radius: INTEREST_RADIUS,
            min_input_interval_ms: MIN_INPUT_INTERVAL_MS,
            spawn_extent: SPAWN_EXTENT,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world_size == 0 {
            return Err(ConfigError::Invalid("world_size must be > 0".into()));
        }
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::Invalid("tick_rate must be 1-1000".into()));
        }
        if self.start_length == 0 {
            return Err(ConfigError::Invalid("start_length must be > 0".into()));
        }
        if self.segment_spacing <= 0.0 {
            return Err(ConfigError::Invalid("segment_spacing must be > 0".into()));
        }
        if self.interest_radius <= 0.0 {
            return Err(ConfigError::Invalid("interest_radius must be > 0".into()));
        }
        Ok(())
    }

    pub fn half_extent(&self) -> f32 {
        f32::from(self.world_size) / 2.0
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn min_input_interval(&self) -> Duration {
        Duration::from_millis(self.min_input_interval_ms)
    }
}
