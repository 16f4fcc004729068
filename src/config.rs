//! Runtime configuration.
//!
//! Everything tunable about the canvas and the engine lives here. The
//! defaults match the stock editor; a JSON file named by the
//! `PATCH_CANVAS_CONFIG` environment variable can override any subset of
//! fields.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "PATCH_CANVAS_CONFIG";

/// Error type for loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub canvas: CanvasConfig,
    pub engine: EngineConfig,
    /// Extra argument templates applied to bare GUI class names, keyed by
    /// class. Entries here replace the built-in template for that class.
    pub gui_defaults: BTreeMap<String, String>,
}

impl Config {
    /// Loads the config named by `PATCH_CANVAS_CONFIG`, or the defaults.
    ///
    /// A broken config file is reported and ignored.
    pub fn load() -> Self {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => match Self::from_file(Path::new(&path)) {
                Ok(config) => {
                    log::info!("loaded config from {}", Path::new(&path).display());
                    config
                }
                Err(error) => {
                    log::warn!("{}, using defaults", error);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Canvas interaction tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Grid spacing in canvas units.
    pub grid_size: i32,
    /// Whether dragged boxes snap to the grid.
    pub grid_enabled: bool,
    /// Pointer travel before a press on a box becomes a drag.
    pub min_drag_distance: f32,
    /// Pointer travel below which a release on a connection counts as a click.
    pub click_distance: f32,
    /// Arrow-key nudge step.
    pub nudge_step: i32,
    /// Distance from the view edge at which dragging scrolls the view.
    pub autoscroll_margin: f32,
    /// Scroll speed while auto-scrolling, per pointer event.
    pub autoscroll_speed: f32,
    /// Maximum distance at which a dragged connection snaps to an edge.
    pub edge_snap_distance: f32,
    /// Offset applied on every paste without a target position.
    pub paste_offset: i32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            grid_size: 25,
            grid_enabled: true,
            min_drag_distance: 5.0,
            click_distance: 2.0,
            nudge_step: 10,
            autoscroll_margin: 50.0,
            autoscroll_speed: 8.5,
            edge_snap_distance: 150.0,
            paste_offset: 10,
        }
    }
}

/// Engine queue and host tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mutation_capacity: usize,
    pub event_capacity: usize,
    /// Bound on blocking waits for engine replies.
    pub reply_timeout_ms: u64,
    /// Bound on waits for room in a full mutation queue.
    pub enqueue_timeout_ms: u64,
    /// Block period of the headless host.
    pub block_period_us: u64,
    /// Drive the engine from the audio device when one is available.
    pub use_audio_device: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mutation_capacity: crate::engine::channels::DEFAULT_MUTATION_BUFFER_SIZE,
            event_capacity: crate::engine::channels::DEFAULT_EVENT_BUFFER_SIZE,
            reply_timeout_ms: 2000,
            enqueue_timeout_ms: 500,
            block_period_us: 1450,
            use_audio_device: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.canvas.grid_size, 25);
        assert_eq!(config.canvas.nudge_step, 10);
        assert_eq!(config.engine.reply_timeout_ms, 2000);
        assert!(config.gui_defaults.is_empty());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_json_str(
            r#"{ "canvas": { "grid_size": 10 }, "engine": { "use_audio_device": false } }"#,
        )
        .unwrap();

        assert_eq!(config.canvas.grid_size, 10);
        assert_eq!(config.canvas.nudge_step, 10);
        assert!(!config.engine.use_audio_device);
        assert_eq!(config.engine.reply_timeout_ms, 2000);
    }

    #[test]
    fn test_gui_defaults_override() {
        let config = Config::from_json_str(r#"{ "gui_defaults": { "tgl": "30 0" } }"#).unwrap();
        assert_eq!(config.gui_defaults.get("tgl").map(String::as_str), Some("30 0"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            Config::from_json_str("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/patch_canvas.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
