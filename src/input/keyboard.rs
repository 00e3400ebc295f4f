//! Keyboard collaborator - turns raw key events into paddle key edges
//!
//! Two keys per side, one pushing the paddle up and one pushing it down.
//! Only transitions reach [`InputFusion`]: auto-repeated presses are dropped
//! here, both when the platform flags them and when a press arrives for a
//! key that is already held.

use crate::input::{InputError, InputFusion};
use crate::types::{KeyDirection, PerSide, PlayerSide};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Key codes for one side, using the `KeyboardEvent.code` naming ("KeyQ")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub up: String,
    pub down: String,
}

impl KeyBinding {
    pub fn new(up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            up: up.into(),
            down: down.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyBindings(pub PerSide<KeyBinding>);

impl Default for KeyBindings {
    fn default() -> Self {
        Self(PerSide::new(
            KeyBinding::new("KeyQ", "KeyZ"),
            KeyBinding::new("KeyO", "KeyM"),
        ))
    }
}

impl KeyBindings {
    pub fn validate(&self) -> Result<(), InputError> {
        let mut seen = HashSet::new();
        for (code, side, direction) in self.entries() {
            if code.trim().is_empty() {
                return Err(InputError::EmptyKey(format!("{} {:?}", side, direction)));
            }
            if !seen.insert(code) {
                return Err(InputError::DuplicateKey(code.to_string()));
            }
        }
        Ok(())
    }

    fn entries(&self) -> impl Iterator<Item = (&str, PlayerSide, KeyDirection)> {
        self.0.iter().flat_map(|(side, binding)| {
            [
                (binding.up.as_str(), side, KeyDirection::Up),
                (binding.down.as_str(), side, KeyDirection::Down),
            ]
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

/// A key event as delivered by the windowing or terminal layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: String,
    pub state: KeyState,
    /// Set by the platform for auto-repeated presses
    pub repeat: bool,
}

impl KeyEvent {
    pub fn pressed(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: KeyState::Pressed,
            repeat: false,
        }
    }

    pub fn released(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: KeyState::Released,
            repeat: false,
        }
    }

    pub fn repeated(code: impl Into<String>) -> Self {
        Self {
            repeat: true,
            ..Self::pressed(code)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyOutcome {
    /// Not a paddle key; the caller may handle it elsewhere
    Unbound,
    /// Auto-repeat or duplicate edge, filtered out
    Repeat,
    /// Forwarded to fusion; carries the newly published velocity, if any
    Applied { emitted: Option<f64> },
}

pub struct KeyboardInput {
    table: HashMap<String, (PlayerSide, KeyDirection)>,
    held: HashSet<String>,
    fusion: Arc<InputFusion>,
}

impl KeyboardInput {
    pub fn new(bindings: &KeyBindings, fusion: Arc<InputFusion>) -> Result<Self, InputError> {
        bindings.validate()?;
        let table = bindings
            .entries()
            .map(|(code, side, direction)| (code.to_string(), (side, direction)))
            .collect::<HashMap<_, _>>();
        info!("Keyboard input ready with {} bound keys", table.len());

        Ok(Self {
            table,
            held: HashSet::new(),
            fusion,
        })
    }

    pub fn handle(&mut self, event: &KeyEvent) -> KeyOutcome {
        let Some(&(side, direction)) = self.table.get(&event.code) else {
            debug!("Unbound key {:?}: {}", event.state, event.code);
            return KeyOutcome::Unbound;
        };

        if event.repeat {
            return KeyOutcome::Repeat;
        }

        let pressed = match event.state {
            KeyState::Pressed => {
                if !self.held.insert(event.code.clone()) {
                    return KeyOutcome::Repeat;
                }
                true
            }
            KeyState::Released => {
                if !self.held.remove(&event.code) {
                    return KeyOutcome::Repeat;
                }
                false
            }
        };

        let emitted = self.fusion.set_key_edge(side, direction, pressed);
        KeyOutcome::Applied { emitted }
    }

    pub fn is_held(&self, code: &str) -> bool {
        self.held.contains(code)
    }
}
