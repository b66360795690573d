use crate::{Vec2, BASE_SPEED, BOOST_MULTIPLIER, TURN_RATE};
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Drag applied by the client predictor while not boosting.
pub const CLIENT_IDLE_DRAG: f32 = 0.998;

/// Parameters of the head motion model.
///
/// The server and the client predictor must use the same speed, boost and
/// turn values or their trails diverge between snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    /// Units per second without boost.
    pub base_speed: f32,
    pub boost_multiplier: f32,
    /// Radians per second.
    pub turn_rate: f32,
    /// Speed factor while not boosting.
    pub idle_drag: f32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            base_speed: BASE_SPEED,
            boost_multiplier: BOOST_MULTIPLIER,
            turn_rate: TURN_RATE,
            idle_drag: 1.0,
        }
    }
}

impl MotionParams {
    /// Motion model used by the client predictor, with the slight idle drag.
    pub fn client() -> Self {
        Self {
            idle_drag: CLIENT_IDLE_DRAG,
            ..Self::default()
        }
    }

    pub fn speed(&self, boost: bool) -> f32 {
        if boost {
            self.base_speed * self.boost_multiplier
        } else {
            self.base_speed * self.idle_drag
        }
    }
}

/// Wraps an angle into `(-PI, PI]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Turns `heading` towards `desired` along the shortest arc, at most
/// `turn_rate * dt` radians.
pub fn turn_towards(heading: f32, desired: f32, turn_rate: f32, dt: f32) -> f32 {
    let delta = normalize_angle(desired - heading);
    let max_turn = (turn_rate * dt).max(0.0);
    let turn = delta.clamp(-max_turn, max_turn);
    normalize_angle(heading + turn)
}

/// Advances a head one step: turn-rate limited heading change, then movement
/// along the new heading. `dt` is in seconds. Returns the new position and
/// heading.
pub fn step_head(
    position: Vec2,
    heading: f32,
    desired: f32,
    boost: bool,
    dt: f32,
    params: &MotionParams,
) -> (Vec2, f32) {
    let new_heading = turn_towards(heading, desired, params.turn_rate, dt);
    let distance = params.speed(boost) * dt;
    let new_position = position.add(Vec2::from_angle(new_heading).scale(distance));
    (new_position, new_heading)
}

/// Clamps a position into the square world `[-half, half]` on both axes.
pub fn clamp_to_world(position: Vec2, half_extent: f32) -> Vec2 {
    Vec2::new(
        position.x.clamp(-half_extent, half_extent),
        position.y.clamp(-half_extent, half_extent),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_normalize_angle() {
        assert_approx_eq!(normalize_angle(0.0), 0.0);
        assert_approx_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0, 1e-5);
        assert_approx_eq!(normalize_angle(-3.0 * PI / 2.0), PI / 2.0, 1e-5);
        assert_approx_eq!(normalize_angle(5.0 * TAU + 0.25), 0.25, 1e-4);
        let wrapped = normalize_angle(-PI);
        assert!(wrapped > 0.0);
    }

    #[test]
    fn test_turn_is_clamped() {
        let heading = turn_towards(0.0, PI / 2.0, 4.0, 0.1);
        assert_approx_eq!(heading, 0.4, 1e-5);
    }

    #[test]
    fn test_turn_reaches_target_when_close() {
        let heading = turn_towards(0.0, 0.1, 4.0, 0.1);
        assert_approx_eq!(heading, 0.1, 1e-6);
    }

    #[test]
    fn test_turn_takes_shortest_arc() {
        // From just below +PI to just above -PI is a small positive turn
        let heading = turn_towards(PI - 0.1, -PI + 0.1, 4.0, 1.0);
        assert_approx_eq!(normalize_angle(heading - (-PI + 0.1)), 0.0, 1e-5);

        let partial = turn_towards(PI - 0.1, -PI + 0.1, 1.0, 0.05);
        assert_approx_eq!(partial, PI - 0.05, 1e-5);
    }

    #[test]
    fn test_step_head_moves_along_heading() {
        let params = MotionParams::default();
        let (pos, heading) = step_head(Vec2::new(0.0, 0.0), 0.0, 0.0, false, 0.5, &params);
        assert_approx_eq!(heading, 0.0);
        assert_approx_eq!(pos.x, BASE_SPEED * 0.5, 1e-4);
        assert_approx_eq!(pos.y, 0.0);
    }

    #[test]
    fn test_step_head_boost_and_drag() {
        let server = MotionParams::default();
        assert_approx_eq!(server.speed(false), BASE_SPEED);
        assert_approx_eq!(server.speed(true), BASE_SPEED * BOOST_MULTIPLIER);

        let client = MotionParams::client();
        assert_approx_eq!(client.speed(false), BASE_SPEED * CLIENT_IDLE_DRAG);
        assert_approx_eq!(client.speed(true), BASE_SPEED * BOOST_MULTIPLIER);
    }

    #[test]
    fn test_step_head_zero_dt_is_identity() {
        let params = MotionParams::default();
        let start = Vec2::new(12.0, -4.0);
        let (pos, heading) = step_head(start, 1.0, -2.0, true, 0.0, &params);
        assert_eq!(pos, start);
        assert_approx_eq!(heading, 1.0);
    }

    #[test]
    fn test_clamp_to_world() {
        let clamped = clamp_to_world(Vec2::new(2000.0, -1600.0), 1500.0);
        assert_eq!(clamped, Vec2::new(1500.0, -1500.0));
        let inside = Vec2::new(10.0, 10.0);
        assert_eq!(clamp_to_world(inside, 1500.0), inside);
    }
}
