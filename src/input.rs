//! Input mapping
//!
//! Keys, on-screen buttons and touch swipes all reduce to a `Direction`
//! request. Whether the request is applied is the simulation's business.

use glam::Vec2;

use crate::sim::Direction;

/// Minimum travel (px) along the dominant axis before a swipe counts
pub const SWIPE_THRESHOLD_PX: f32 = 10.0;

/// Map a `KeyboardEvent.key` value (arrows or WASD)
pub fn direction_for_key(key: &str) -> Option<Direction> {
    match key {
        "ArrowUp" | "w" | "W" => Some(Direction::Up),
        "ArrowDown" | "s" | "S" => Some(Direction::Down),
        "ArrowLeft" | "a" | "A" => Some(Direction::Left),
        "ArrowRight" | "d" | "D" => Some(Direction::Right),
        _ => None,
    }
}

/// Map an on-screen control button id
pub fn direction_for_button(id: &str) -> Option<Direction> {
    match id {
        "btn-up" => Some(Direction::Up),
        "btn-down" => Some(Direction::Down),
        "btn-left" => Some(Direction::Left),
        "btn-right" => Some(Direction::Right),
        _ => None,
    }
}

/// Turns a touch gesture into at most one direction
#[derive(Debug, Clone, Default)]
pub struct SwipeTracker {
    start: Option<Vec2>,
}

impl SwipeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, pos: Vec2) {
        self.start = Some(pos);
    }

    /// Feed a touch move; yields a direction once the finger travelled past
    /// the threshold on its dominant axis, then waits for the next `begin`.
    pub fn update(&mut self, pos: Vec2) -> Option<Direction> {
        let start = self.start?;
        let delta = pos - start;
        let dir = if delta.x.abs() > delta.y.abs() {
            if delta.x.abs() <= SWIPE_THRESHOLD_PX {
                return None;
            }
            if delta.x > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else {
            if delta.y.abs() <= SWIPE_THRESHOLD_PX {
                return None;
            }
            // Screen y grows downwards, like the grid
            if delta.y > 0.0 {
                Direction::Down
            } else {
                Direction::Up
            }
        };
        self.start = None;
        Some(dir)
    }

    pub fn cancel(&mut self) {
        self.start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(direction_for_key("ArrowUp"), Some(Direction::Up));
        assert_eq!(direction_for_key("d"), Some(Direction::Right));
        assert_eq!(direction_for_key("Escape"), None);
        assert_eq!(direction_for_button("btn-left"), Some(Direction::Left));
        assert_eq!(direction_for_button("btn-jump"), None);
    }

    #[test]
    fn test_swipe_threshold() {
        let mut swipe = SwipeTracker::new();
        assert_eq!(swipe.update(Vec2::new(50.0, 0.0)), None);

        swipe.begin(Vec2::new(100.0, 100.0));
        assert_eq!(swipe.update(Vec2::new(108.0, 102.0)), None);
        assert_eq!(swipe.update(Vec2::new(89.0, 104.0)), Some(Direction::Left));
        // One direction per gesture
        assert_eq!(swipe.update(Vec2::new(50.0, 104.0)), None);
    }

    #[test]
    fn test_swipe_dominant_axis() {
        let mut swipe = SwipeTracker::new();
        swipe.begin(Vec2::new(0.0, 0.0));
        assert_eq!(swipe.update(Vec2::new(9.0, 30.0)), Some(Direction::Down));
        swipe.begin(Vec2::new(0.0, 0.0));
        assert_eq!(swipe.update(Vec2::new(-4.0, -11.0)), Some(Direction::Up));
        swipe.begin(Vec2::new(0.0, 0.0));
        assert_eq!(swipe.update(Vec2::new(25.0, -20.0)), Some(Direction::Right));
    }
}
