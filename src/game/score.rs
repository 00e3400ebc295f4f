use crate::types::{PerSide, PlayerSide};
use std::fmt;

/// Running score, credited to the player opposite the goal line crossed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scoreboard {
    points: PerSide<u32>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a goal on `side`; returns the player who scored
    pub fn record_goal(&mut self, side: PlayerSide) -> PlayerSide {
        let scorer = side.opponent();
        self.points[scorer] = self.points[scorer].saturating_add(1);
        scorer
    }

    pub fn score(&self, side: PlayerSide) -> u32 {
        self.points[side]
    }

    pub fn clear(&mut self) {
        self.points = PerSide::default();
    }
}

impl fmt::Display for Scoreboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03} - {:03}", self.points.left, self.points.right)
    }
}
