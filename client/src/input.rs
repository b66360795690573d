//! Client input management with sequencing

use shared::physics::normalize_angle;
use shared::InputCommand;

/// Holds the current steering controls and turns them into sequenced commands
pub struct InputManager {
    next_sequence: u16,
    angle: f32,
    boost: bool,
    /// Constant steering rate in rad/s, for headless clients.
    steer_rate: f32,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            angle: 0.0,
            boost: false,
            steer_rate: 0.0,
        }
    }

    /// An input manager whose target angle sweeps at `steer_rate` rad/s.
    pub fn with_steer_rate(steer_rate: f32) -> Self {
        Self {
            steer_rate,
            ..Self::new()
        }
    }

    pub fn set_controls(&mut self, angle: f32, boost: bool) {
        self.angle = normalize_angle(angle);
        self.boost = boost;
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn boost(&self) -> bool {
        self.boost
    }

    /// Advances automatic steering by `dt` seconds.
    pub fn steer(&mut self, dt: f32) {
        if self.steer_rate != 0.0 {
            self.angle = normalize_angle(self.angle + self.steer_rate * dt);
        }
    }

    /// Produces the next command from the current controls. The sequence
    /// starts at 1 and wraps around after `u16::MAX`.
    pub fn next_command(&mut self, timestamp: u64) -> InputCommand {
        let command = InputCommand {
            sequence: self.next_sequence,
            angle: self.angle,
            boost: self.boost,
            timestamp,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        command
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
