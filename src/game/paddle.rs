use crate::types::PlayerSide;

/// Vertical paddle, its center always within [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleState {
    pub side: PlayerSide,
    pub position: f64,
    /// Net velocity from input fusion, refreshed every tick
    pub velocity: f64,
}

impl PaddleState {
    pub fn new(side: PlayerSide) -> Self {
        Self {
            side,
            position: 0.0,
            velocity: 0.0,
        }
    }

    pub fn step(&mut self, dt: f64) {
        let next = self.position + self.velocity * dt;
        // NaN input must not leak into the position
        if !next.is_nan() {
            self.position = next.clamp(-1.0, 1.0);
        }
    }
}
