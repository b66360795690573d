//! Types and rules shared by the authoritative server and the predicting client.
//!
//! Everything both sides must agree on lives here: the binary wire protocol,
//! the head physics step, trail body maintenance and the simulation constants.
//! If the server and the client predictor ever disagree on one of these, the
//! client's prediction drifts and every snapshot turns into a visible snap.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod physics;
pub mod protocol;
pub mod trail;

pub use config::SimConfig;
pub use physics::MotionParams;

pub const WORLD_SIZE: u16 = 3000;
pub const TICK_RATE: u32 = 30;
pub const FOOD_TARGET: usize = 800;
pub const START_LENGTH: u32 = 20;
pub const SEGMENT_SPACING: f32 = 8.0;
pub const BASE_SPEED: f32 = 140.0;
pub const BOOST_MULTIPLIER: f32 = 1.3;
pub const TURN_RATE: f32 = 4.0;
pub const HEAD_RADIUS: f32 = 8.0;
pub const PICKUP_RADIUS: f32 = 10.0;
pub const SELF_COLLISION_SKIP: usize = 10;
pub const DEATH_DROP_CAP: usize = 30;
pub const INTEREST_RADIUS: f32 = 1200.0;
pub const MIN_INPUT_INTERVAL_MS: u64 = 1000 / 60;
pub const SPAWN_EXTENT: f32 = 500.0;
pub const MAX_NAME_CHARS: usize = 16;

/// A point or direction in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(&self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }

    pub fn add(&self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    /// Linear interpolation towards `other`; `t = 0` is `self`.
    pub fn lerp(&self, other: Vec2, t: f32) -> Vec2 {
        Vec2::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    pub fn within(&self, other: Vec2, radius: f32) -> bool {
        self.distance_squared(other) <= radius * radius
    }
}

/// One steering command issued by a client.
///
/// `timestamp` is measured on the issuing client's clock in milliseconds and
/// only matters to that client's predictor; it never crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputCommand {
    pub sequence: u16,
    pub angle: f32,
    pub boost: bool,
    pub timestamp: u64,
}

/// Returns true if `candidate` comes strictly after `last`.
///
/// Sequence numbers are `u16` and wrap, so the comparison uses serial number
/// arithmetic: anything up to half the range ahead counts as newer. With no
/// previous sequence every candidate is accepted.
pub fn sequence_newer(candidate: u16, last: Option<u16>) -> bool {
    match last {
        None => true,
        Some(last) => {
            let delta = candidate.wrapping_sub(last);
            delta != 0 && delta < 0x8000
        }
    }
}

/// Truncates a display name to at most [`MAX_NAME_CHARS`] characters.
pub fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec2_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(3.0, 4.0);
        assert_approx_eq!(a.distance(b), 5.0);
        assert_approx_eq!(a.distance_squared(b), 25.0);
    }

    #[test]
    fn test_vec2_lerp() {
        let a = Vec2::new(0.0, 10.0);
        let b = Vec2::new(10.0, 20.0);
        let mid = a.lerp(b, 0.5);
        assert_approx_eq!(mid.x, 5.0);
        assert_approx_eq!(mid.y, 15.0);
    }

    #[test]
    fn test_vec2_within_is_inclusive() {
        let a = Vec2::new(0.0, 0.0);
        assert!(a.within(Vec2::new(10.0, 0.0), 10.0));
        assert!(!a.within(Vec2::new(10.1, 0.0), 10.0));
    }

    #[test]
    fn test_sequence_newer_basic() {
        assert!(sequence_newer(1, None));
        assert!(sequence_newer(2, Some(1)));
        assert!(!sequence_newer(1, Some(1)));
        assert!(!sequence_newer(3, Some(5)));
    }

    #[test]
    fn test_sequence_newer_wraps() {
        assert!(sequence_newer(0, Some(u16::MAX)));
        assert!(sequence_newer(5, Some(65530)));
        assert!(!sequence_newer(65530, Some(5)));
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short"), "short");
        let long = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(truncate_name(long), "abcdefghijklmnop");
        // Multi-byte characters are counted as characters, not bytes
        let wide = "ééééééééééééééééééé";
        assert_eq!(truncate_name(wide).chars().count(), MAX_NAME_CHARS);
    }
}
