//! Authoritative snake simulation
//!
//! `GameState` owns every snake and every food pellet. It is mutated only by
//! the server main loop, one tick at a time, so a tick is always observed as a
//! whole: inputs, movement, body maintenance, food, collisions and repletion.

use crate::interest;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::physics::{clamp_to_world, step_head};
use shared::protocol::StateSnapshot;
use shared::trail::Trail;
use shared::{truncate_name, SimConfig, Vec2};
use std::collections::HashMap;
use std::f32::consts::TAU;

/// Upper bound on generated colors (exclusive).
const COLOR_RANGE: u16 = 1023;

#[derive(Debug, Clone)]
pub struct Snake {
    pub id: u16,
    pub name: String,
    pub color: u16,
    pub alive: bool,
    /// Also the maximum number of body points.
    pub score: u32,
    pub heading: f32,
    /// Heading requested by the latest accepted input.
    pub target_heading: f32,
    pub boost: bool,
    pub trail: Trail,
}

impl Snake {
    pub fn head(&self) -> Vec2 {
        self.trail.head()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Food {
    pub position: Vec2,
    pub value: u32,
}

pub struct GameState {
    pub tick: u32,
    players: HashMap<u16, Snake>,
    food: Vec<Food>,
    config: SimConfig,
    rng: StdRng,
    next_id: u16,
}

impl GameState {
    /// Creates an empty world already filled with food up to the target.
    pub fn new(config: SimConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Same as [`GameState::new`] but with a reproducible random stream.
    pub fn with_seed(config: SimConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimConfig, rng: StdRng) -> Self {
        let mut state = Self {
            tick: 0,
            players: HashMap::new(),
            food: Vec::with_capacity(config.food_target),
            config,
            rng,
            next_id: 1,
        };
        state.replenish_food();
        state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn player(&self, id: u16) -> Option<&Snake> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Snake> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn food(&self) -> &[Food] {
        &self.food
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    /// Places food at an exact position. Used for scripted setups.
    pub fn add_food(&mut self, position: Vec2, value: u32) {
        self.food.push(Food { position, value });
    }

    pub fn clear_food(&mut self) {
        self.food.clear();
    }

    /// Spawns a new snake at a random pose and returns its id, or None when
    /// every id is taken.
    pub fn spawn_player(&mut self, name: &str) -> Option<u16> {
        let id = self.allocate_id()?;
        let extent = self.config.spawn_extent.max(0.0);
        let head = Vec2::new(
            self.rng.gen_range(-extent..=extent),
            self.rng.gen_range(-extent..=extent),
        );
        let heading = self.rng.gen_range(0.0..TAU);
        let color = self.rng.gen_range(0..COLOR_RANGE);
        let length = self.config.start_length as usize;

        let snake = Snake {
            id,
            name: truncate_name(name),
            color,
            alive: true,
            score: self.config.start_length,
            heading,
            target_heading: heading,
            boost: false,
            trail: Trail::spawn(head, heading, length, self.config.segment_spacing),
        };

        info!(
            "Spawned player {} '{}' at ({:.1}, {:.1})",
            id, snake.name, head.x, head.y
        );
        self.players.insert(id, snake);
        Some(id)
    }

    /// Places an existing snake at an exact pose. Used for scripted setups.
    pub fn place_player(&mut self, id: u16, head: Vec2, heading: f32) {
        let spacing = self.config.segment_spacing;
        if let Some(snake) = self.players.get_mut(&id) {
            let length = snake.trail.len();
            snake.trail = Trail::spawn(head, heading, length, spacing);
            snake.heading = heading;
            snake.target_heading = heading;
        }
    }

    pub fn remove_player(&mut self, id: u16) -> Option<Snake> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Replaces a dead snake with a fresh one under a new id. The name carries
    /// over. Returns None if `old_id` is unknown or still alive.
    pub fn respawn(&mut self, old_id: u16) -> Option<u16> {
        let name = match self.players.get(&old_id) {
            Some(snake) if !snake.alive => snake.name.clone(),
            _ => return None,
        };
        self.players.remove(&old_id);
        let new_id = self.spawn_player(&name)?;
        info!("Player {} respawned as {}", old_id, new_id);
        Some(new_id)
    }

    pub fn rename(&mut self, id: u16, name: &str) {
        if let Some(snake) = self.players.get_mut(&id) {
            snake.name = truncate_name(name);
            info!("Player {} joined as '{}'", id, snake.name);
        }
    }

    /// Sets the steering target for the next tick. Inputs for dead or unknown
    /// players are ignored.
    pub fn set_input(&mut self, id: u16, angle: f32, boost: bool) {
        if let Some(snake) = self.players.get_mut(&id) {
            if snake.alive && angle.is_finite() {
                snake.target_heading = angle;
                snake.boost = boost;
            }
        }
    }

    /// Advances the world by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.move_snakes(dt);
        self.consume_food();
        self.resolve_collisions();
        self.replenish_food();
        self.tick = self.tick.wrapping_add(1);
    }

    /// The part of the world visible to `observer`, or None if it is unknown.
    pub fn snapshot_for(&self, observer: u16) -> Option<StateSnapshot> {
        let head = self.players.get(&observer)?.head();
        let mut snapshot = interest::cull(
            head,
            self.config.interest_radius,
            self.players.values(),
            &self.food,
        );
        snapshot.tick = self.tick;
        Some(snapshot)
    }

    fn move_snakes(&mut self, dt: f32) {
        let motion = self.config.motion;
        let spacing = self.config.segment_spacing;
        let half = self.config.half_extent();

        for snake in self.players.values_mut().filter(|s| s.alive) {
            let (position, heading) = step_head(
                snake.head(),
                snake.heading,
                snake.target_heading,
                snake.boost,
                dt,
                &motion,
            );
            snake.heading = heading;
            let position = clamp_to_world(position, half);
            snake.trail.advance(position, spacing, snake.score as usize);
        }
    }

    fn consume_food(&mut self) {
        let radius = self.config.pickup_radius;
        let mut ids: Vec<u16> = self
            .players
            .values()
            .filter(|s| s.alive)
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();

        for id in ids {
            let Some(snake) = self.players.get_mut(&id) else {
                continue;
            };
            let head = snake.head();
            let mut gained = 0u32;
            self.food.retain(|food| {
                if head.distance_squared(food.position) < radius * radius {
                    gained = gained.saturating_add(food.value);
                    false
                } else {
                    true
                }
            });
            if gained > 0 {
                snake.score = snake.score.saturating_add(gained);
                debug!("Player {} ate {} (score {})", id, gained, snake.score);
            }
        }
    }

    /// Finds every victim against the positions at the start of this step,
    /// then kills each of them once.
    fn resolve_collisions(&mut self) {
        let radius = self.config.head_radius;
        let skip = self.config.self_collision_skip;

        let mut victims: Vec<u16> = self
            .players
            .values()
            .filter(|s| s.alive)
            .filter(|snake| {
                let head = snake.head();
                self.players.values().filter(|o| o.alive).any(|other| {
                    let start = if other.id == snake.id { skip } else { 0 };
                    other
                        .trail
                        .points()
                        .iter()
                        .skip(start)
                        .any(|p| head.distance_squared(*p) < radius * radius)
                })
            })
            .map(|s| s.id)
            .collect();
        victims.sort_unstable();

        for id in victims {
            self.kill(id);
        }
    }

    fn kill(&mut self, id: u16) {
        let cap = self.config.death_drop_cap;
        let Some(snake) = self.players.get_mut(&id) else {
            return;
        };
        if !snake.alive {
            return;
        }
        snake.alive = false;
        let drops: Vec<Food> = snake
            .trail
            .prefix(cap)
            .map(|position| Food { position, value: 1 })
            .collect();
        info!(
            "Player {} died with score {}, dropping {} food",
            id,
            snake.score,
            drops.len()
        );
        self.food.extend(drops);
    }

    fn replenish_food(&mut self) {
        let half = self.config.half_extent();
        while self.food.len() < self.config.food_target {
            let position = Vec2::new(
                self.rng.gen_range(-half..=half),
                self.rng.gen_range(-half..=half),
            );
            self.food.push(Food { position, value: 1 });
        }
    }

    /// Next free id after the last one handed out. Zero is never used.
    fn allocate_id(&mut self) -> Option<u16> {
        for _ in 0..u16::MAX {
            let candidate = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if candidate != 0 && !self.players.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
