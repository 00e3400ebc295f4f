//! Shared vocabulary for the game, input and device subsystems
//!
//! Everything that is keyed by player lives in a [`PerSide`] pair so the two
//! sides can never drift apart in shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// One of the two players, identified by the half of the playfield they defend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSide {
    Left,
    Right,
}

impl PlayerSide {
    pub const ALL: [PlayerSide; 2] = [PlayerSide::Left, PlayerSide::Right];

    pub fn opponent(self) -> Self {
        match self {
            PlayerSide::Left => PlayerSide::Right,
            PlayerSide::Right => PlayerSide::Left,
        }
    }
}

impl fmt::Display for PlayerSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerSide::Left => write!(f, "left"),
            PlayerSide::Right => write!(f, "right"),
        }
    }
}

/// A value held once for each player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSide<T> {
    pub left: T,
    pub right: T,
}

impl<T> PerSide<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    /// Builds both entries from a per-side constructor
    pub fn from_fn(mut f: impl FnMut(PlayerSide) -> T) -> Self {
        Self {
            left: f(PlayerSide::Left),
            right: f(PlayerSide::Right),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerSide<U> {
        PerSide {
            left: f(&self.left),
            right: f(&self.right),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerSide, &T)> {
        [(PlayerSide::Left, &self.left), (PlayerSide::Right, &self.right)].into_iter()
    }
}

impl<T> Index<PlayerSide> for PerSide<T> {
    type Output = T;

    fn index(&self, side: PlayerSide) -> &T {
        match side {
            PlayerSide::Left => &self.left,
            PlayerSide::Right => &self.right,
        }
    }
}

impl<T> IndexMut<PlayerSide> for PerSide<T> {
    fn index_mut(&mut self, side: PlayerSide) -> &mut T {
        match side {
            PlayerSide::Left => &mut self.left,
            PlayerSide::Right => &mut self.right,
        }
    }
}

/// Direction a paddle key pushes towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Up,
    Down,
}

/// Connection vocabulary reported to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Runtime tag of the match state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MatchPhase {
    #[default]
    Serving,
    Running,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPhase::Serving => write!(f, "serving"),
            MatchPhase::Running => write!(f, "running"),
        }
    }
}

/// 2D vector in playfield units, both axes spanning [-1, 1] between the walls
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
