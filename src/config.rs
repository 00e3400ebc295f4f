//! Runtime configuration stored as TOML under the user's config directory
//!
//! Only presentation and input settings live here. Physics constants and the
//! serve delay are fixed in [`crate::game`].

use crate::device::IndicatorColor;
use crate::input::{KeyBinding, KeyBindings};
use crate::types::PerSide;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn, Level};

const CONFIG_DIR: &str = "thingy-pong";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub color: IndicatorColor,
    pub keys: KeyBinding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub frame_interval_ms: u64,
    pub log_level: String,
    pub event_capacity: usize,
    pub players: PerSide<PlayerConfig>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let KeyBindings(keys) = KeyBindings::default();
        Self {
            frame_interval_ms: 16,
            log_level: "info".to_string(),
            event_capacity: 256,
            players: PerSide::new(
                PlayerConfig {
                    color: IndicatorColor::RED,
                    keys: keys.left,
                },
                PlayerConfig {
                    color: IndicatorColor::BLUE,
                    keys: keys.right,
                },
            ),
        }
    }
}

impl GameConfig {
    /// `<config dir>/thingy-pong/config.toml`, falling back to the working directory
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        base.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Writes the default config unless a file already exists at `path`
    ///
    /// Returns whether a file was written.
    pub async fn ensure_default(path: &Path) -> Result<bool> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            return Ok(false);
        }

        info!("No config found, writing defaults to {}", path.display());
        Self::default().save(path).await?;
        Ok(true)
    }

    /// Loads `path`, or returns the defaults when the file is missing
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            Self::load(path).await
        } else {
            warn!("Config file {} does not exist, using default", path.display());
            Ok(Self::default())
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_interval_ms == 0 {
            return Err(eyre!("frame_interval_ms must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(eyre!("event_capacity must be greater than zero"));
        }
        self.level()?;
        self.key_bindings()
            .validate()
            .map_err(|e| eyre!("Invalid key bindings: {}", e))?;
        Ok(())
    }

    pub fn level(&self) -> Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| eyre!("Unknown log level: {}", self.log_level))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn key_bindings(&self) -> KeyBindings {
        KeyBindings(self.players.map(|player| player.keys.clone()))
    }

    pub fn colors(&self) -> PerSide<IndicatorColor> {
        self.players.map(|player| player.color)
    }
}
