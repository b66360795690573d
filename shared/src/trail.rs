//! Trail body maintenance shared by the server simulation and the predictor
//!
//! A trail is an ordered list of points with the head at index 0. Behind the
//! head sit "settled" points, each exactly one spacing from its neighbour. The
//! head itself moves freely; a new settled point is only placed once the head
//! has travelled a full spacing past the last placed point (the anchor), so
//! intermediate head samples are never kept.

use crate::Vec2;
use std::collections::VecDeque;

/// A settled point closer than this fraction of the spacing to the head is
/// folded back into the head. The head-to-neck gap therefore stays within
/// `[NECK_MERGE_FRACTION * spacing, (1 + NECK_MERGE_FRACTION) * spacing)`.
pub const NECK_MERGE_FRACTION: f32 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct Trail {
    points: VecDeque<Vec2>,
    anchor: Vec2,
}

impl Trail {
    /// Creates a straight trail of `length` points trailing behind `head`,
    /// opposite to `heading`.
    pub fn spawn(head: Vec2, heading: f32, length: usize, spacing: f32) -> Self {
        let back = Vec2::from_angle(heading).scale(-spacing);
        let points: VecDeque<Vec2> = (0..length.max(1))
            .map(|i| head.add(back.scale(i as f32)))
            .collect();
        let anchor = points.get(1).copied().unwrap_or(head);
        Self { points, anchor }
    }

    pub fn head(&self) -> Vec2 {
        // spawn always creates at least one point and truncation keeps one
        self.points.front().copied().unwrap_or(self.anchor)
    }

    pub fn anchor(&self) -> Vec2 {
        self.anchor
    }

    pub fn points(&self) -> &VecDeque<Vec2> {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The first `n` points starting from the head.
    pub fn prefix(&self, n: usize) -> impl Iterator<Item = Vec2> + '_ {
        self.points.iter().take(n).copied()
    }

    /// Moves the head to `head`, placing settled points every `spacing` units
    /// along the way from the anchor, then keeps at most `max_points` points.
    pub fn advance(&mut self, head: Vec2, spacing: f32, max_points: usize) {
        let max_points = max_points.max(1);

        if spacing > f32::EPSILON {
            let distance = self.anchor.distance(head);
            let mut steps = (distance / spacing).floor() as usize;

            // Points beyond max_points would be truncated right away; skip
            // the anchor forward instead of placing them.
            if steps > max_points {
                let skipped = (steps - max_points) as f32 * spacing;
                self.anchor = self.anchor.lerp(head, skipped / distance);
                steps = max_points;
            }

            let mut previous_anchor = None;
            for _ in 0..steps {
                let remaining = self.anchor.distance(head);
                if remaining < spacing {
                    break;
                }
                let placed = self.anchor.lerp(head, spacing / remaining);
                self.points.insert(1.min(self.points.len()), placed);
                previous_anchor = Some(self.anchor);
                self.anchor = placed;
            }

            if let Some(previous) = previous_anchor {
                if self.anchor.distance(head) < spacing * NECK_MERGE_FRACTION
                    && self.points.len() > 1
                {
                    self.points.remove(1);
                    self.anchor = previous;
                }
            }
        }

        match self.points.front_mut() {
            Some(front) => *front = head,
            None => self.points.push_front(head),
        }
        self.points.truncate(max_points);
    }

    /// Resets the head and the anchor to an authoritative position. Settled
    /// points behind it are kept; new ones are placed from `head` onward.
    pub fn rebase(&mut self, head: Vec2) {
        match self.points.front_mut() {
            Some(front) => *front = head,
            None => self.points.push_front(head),
        }
        self.anchor = head;
    }
}
