//! Client-side prediction and reconciliation for the local snake
//!
//! The predictor applies every local input immediately with the same physics
//! the server runs. When a snapshot arrives it snaps to the authoritative head
//! and replays the inputs the server cannot have seen yet.

use log::debug;
use shared::physics::{clamp_to_world, step_head};
use shared::protocol::StateSnapshot;
use shared::trail::Trail;
use shared::{
    sequence_newer, InputCommand, MotionParams, Vec2, SEGMENT_SPACING, START_LENGTH, WORLD_SIZE,
};
use std::collections::VecDeque;

/// Number of inputs kept for replay; the oldest is dropped first.
pub const INPUT_BUFFER_CAPACITY: usize = 100;
/// Inputs older than this, relative to a snapshot's reference time, are pruned.
pub const INPUT_RETENTION_MS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
struct BufferedInput {
    command: InputCommand,
    /// Heading of the local snake right before the command was applied.
    heading_before: f32,
}

/// Read-only copy of the predicted state for presentation
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedView {
    pub player_id: Option<u16>,
    pub position: Vec2,
    pub heading: f32,
    pub score: u32,
    pub alive: bool,
    pub body: Vec<Vec2>,
}

pub struct ClientPredictor {
    params: MotionParams,
    spacing: f32,
    half_extent: f32,

    player_id: Option<u16>,
    position: Vec2,
    heading: f32,
    score: u32,
    alive: bool,
    trail: Trail,

    inputs: VecDeque<BufferedInput>,
}

impl ClientPredictor {
    pub fn new(params: MotionParams) -> Self {
        let position = Vec2::default();
        Self {
            params,
            spacing: SEGMENT_SPACING,
            half_extent: f32::from(WORLD_SIZE) / 2.0,
            player_id: None,
            position,
            heading: 0.0,
            score: START_LENGTH,
            alive: false,
            trail: Trail::spawn(position, 0.0, START_LENGTH as usize, SEGMENT_SPACING),
            inputs: VecDeque::with_capacity(INPUT_BUFFER_CAPACITY),
        }
    }

    /// Takes on a new identity, as announced by a Welcome. Buffered inputs
    /// belonged to the previous snake and are dropped.
    pub fn reset(&mut self, player_id: u16, world_size: u16) {
        self.player_id = Some(player_id);
        self.half_extent = f32::from(world_size) / 2.0;
        self.score = START_LENGTH;
        self.alive = true;
        self.trail = Trail::spawn(self.position, self.heading, START_LENGTH as usize, self.spacing);
        self.inputs.clear();
    }

    /// Buffers a command for later replay. Returns false, and buffers
    /// nothing, if its sequence is not newer than the last buffered one.
    pub fn add_input(&mut self, command: InputCommand) -> bool {
        let last = self.inputs.back().map(|b| b.command.sequence);
        if !sequence_newer(command.sequence, last) {
            return false;
        }

        if self.inputs.len() >= INPUT_BUFFER_CAPACITY {
            self.inputs.pop_front();
        }
        self.inputs.push_back(BufferedInput {
            command,
            heading_before: self.heading,
        });
        true
    }

    /// Advances the local snake by `dt` seconds under `command`.
    pub fn apply_input(&mut self, command: &InputCommand, dt: f32) {
        if !self.alive {
            return;
        }
        let (position, heading) = step_head(
            self.position,
            self.heading,
            command.angle,
            command.boost,
            dt,
            &self.params,
        );
        self.heading = heading;
        self.position = clamp_to_world(position, self.half_extent);
        self.trail
            .advance(self.position, self.spacing, self.score as usize);
    }

    /// One frame of local prediction.
    pub fn update(&mut self, command: InputCommand, dt: f32) {
        if self.add_input(command) {
            self.apply_input(&command, dt);
        }
    }

    /// Conforms to an authoritative snapshot and replays the inputs issued
    /// after `reference_time`. Both times are client milliseconds.
    ///
    /// Returns false if the snapshot does not contain the local snake, in
    /// which case nothing changes.
    pub fn reconcile(&mut self, snapshot: &StateSnapshot, reference_time: u64, now: u64) -> bool {
        let Some(me) = self.player_id.and_then(|id| snapshot.player(id)) else {
            return false;
        };

        let before = self.position;
        self.position = me.head;
        self.score = u32::from(me.len);
        self.alive = me.alive;
        self.trail.rebase(self.position);

        let mut replay: Vec<BufferedInput> = self
            .inputs
            .iter()
            .filter(|b| b.command.timestamp > reference_time)
            .copied()
            .collect();
        replay.sort_by_key(|b| b.command.timestamp);

        if let Some(first) = replay.first() {
            self.heading = first.heading_before;
        }
        for (i, buffered) in replay.iter().enumerate() {
            let until = replay
                .get(i + 1)
                .map(|next| next.command.timestamp)
                .unwrap_or(now);
            let dt = until.saturating_sub(buffered.command.timestamp) as f32 / 1000.0;
            self.apply_input(&buffered.command, dt);
        }

        let cutoff = reference_time.saturating_sub(INPUT_RETENTION_MS);
        self.inputs.retain(|b| b.command.timestamp > cutoff);

        debug!(
            "Reconciled tick {}: replayed {} inputs, correction {:.2}",
            snapshot.tick,
            replay.len(),
            before.distance(self.position)
        );
        true
    }

    pub fn player_id(&self) -> Option<u16> {
        self.player_id
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn heading(&self) -> f32 {
        self.heading
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn body(&self) -> Vec<Vec2> {
        self.trail.points().iter().copied().collect()
    }

    pub fn buffered_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn view(&self) -> PredictedView {
        PredictedView {
            player_id: self.player_id,
            position: self.position,
            heading: self.heading,
            score: self.score,
            alive: self.alive,
            body: self.body(),
        }
    }
}

impl Default for ClientPredictor {
    fn default() -> Self {
        Self::new(MotionParams::client())
    }
}
