//! Grid coordinate space
//!
//! The board is a torus: every coordinate is folded back into
//! `[0, width) x [0, height)` before it is stored anywhere.

use glam::IVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Integer grid coordinate
pub type Point = IVec2;

/// Heading of the snake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// The 180° reversal of this heading
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// One-cell step in screen coordinates (y grows downward)
    pub fn delta(self) -> IVec2 {
        match self {
            Direction::Up => IVec2::new(0, -1),
            Direction::Down => IVec2::new(0, 1),
            Direction::Left => IVec2::new(-1, 0),
            Direction::Right => IVec2::new(1, 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// Board dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        debug_assert!(width > 0 && height > 0, "grid must be non-empty");
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn center(&self) -> Point {
        IVec2::new(self.width / 2, self.height / 2)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height
    }

    /// Fold any coordinate (negative or past the edge) onto the board
    #[inline]
    pub fn wrap(&self, p: Point) -> Point {
        IVec2::new(p.x.rem_euclid(self.width), p.y.rem_euclid(self.height))
    }

    /// Neighbouring cell in the given direction, wrapped
    #[inline]
    pub fn step(&self, p: Point, dir: Direction) -> Point {
        self.wrap(p + dir.delta())
    }

    /// Pick a cell uniformly among those `occupied` rejects.
    ///
    /// Returns `None` when every cell is taken.
    pub fn random_free_cell<R: Rng>(
        &self,
        rng: &mut R,
        occupied: impl Fn(Point) -> bool,
    ) -> Option<Point> {
        let free: Vec<Point> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| IVec2::new(x, y)))
            .filter(|p| !occupied(*p))
            .collect();
        if free.is_empty() {
            return None;
        }
        Some(free[rng.random_range(0..free.len())])
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(crate::consts::GRID_WIDTH, crate::consts::GRID_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_opposites() {
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_eq!(dir.delta() + dir.opposite().delta(), IVec2::ZERO);
        }
    }

    #[test]
    fn test_wrap_edges() {
        let grid = Grid::new(18, 18);
        assert_eq!(grid.wrap(IVec2::new(-1, 5)), IVec2::new(17, 5));
        assert_eq!(grid.wrap(IVec2::new(18, 5)), IVec2::new(0, 5));
        assert_eq!(grid.step(IVec2::new(3, 0), Direction::Up), IVec2::new(3, 17));
    }

    #[test]
    fn test_random_free_cell_full_board() {
        let grid = Grid::new(2, 2);
        let mut rng = Pcg32::seed_from_u64(1);
        assert_eq!(grid.random_free_cell(&mut rng, |_| true), None);
        let only = grid.random_free_cell(&mut rng, |p| p != IVec2::new(1, 1));
        assert_eq!(only, Some(IVec2::new(1, 1)));
    }

    proptest! {
        #[test]
        fn wrapped_points_stay_in_bounds(
            w in 1i32..64,
            h in 1i32..64,
            x in -10_000i32..10_000,
            y in -10_000i32..10_000,
        ) {
            let grid = Grid::new(w, h);
            let p = grid.wrap(IVec2::new(x, y));
            prop_assert!(grid.contains(p));
        }
    }
}
