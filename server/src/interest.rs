//! Interest management: what each observer gets to see
//!
//! A snapshot only carries snakes whose head and food whose position lie
//! within the interest radius of the observer's head. Bodies are not sent;
//! clients keep their own trails from successive head positions.

use crate::game::{Food, Snake};
use shared::protocol::{PlayerState, StateSnapshot};
use shared::Vec2;

/// Builds the view of the world around `observer_head`. The radius is
/// inclusive. The returned snapshot has `tick` set to 0.
pub fn cull<'a>(
    observer_head: Vec2,
    radius: f32,
    snakes: impl IntoIterator<Item = &'a Snake>,
    food: &[Food],
) -> StateSnapshot {
    let mut players: Vec<PlayerState> = snakes
        .into_iter()
        .filter(|snake| snake.head().within(observer_head, radius))
        .map(player_state)
        .collect();
    players.sort_unstable_by_key(|p| p.id);

    let food = food
        .iter()
        .map(|f| f.position)
        .filter(|position| position.within(observer_head, radius))
        .collect();

    StateSnapshot {
        tick: 0,
        players,
        food,
    }
}

fn player_state(snake: &Snake) -> PlayerState {
    PlayerState {
        id: snake.id,
        len: u16::try_from(snake.score).unwrap_or(u16::MAX),
        head: snake.head(),
        color: snake.color,
        alive: snake.alive,
    }
}
