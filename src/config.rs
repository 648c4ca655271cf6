//! Playback configuration
//!
//! All fields have defaults, so a partial JSON file (or `{}`) is valid.
//!
//! ```json
//! {
//!   "image_ext": "png",
//!   "reverse": false,
//!   "start_paused": true,
//!   "idle_wait_ms": 5,
//!   "engine_settings": "settings.yaml"
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::sequence::{Direction, Sequence, DEFAULT_IMAGE_EXT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Frame file extension, without the dot
    pub image_ext: String,
    /// Play the sequence last-to-first
    pub reverse: bool,
    /// Begin with processing disabled until a Resume command arrives
    pub start_paused: bool,
    /// How long an idle iteration waits for a command (ms)
    pub idle_wait_ms: u64,
    /// Settings file handed to the engine factory
    pub engine_settings: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            image_ext: DEFAULT_IMAGE_EXT.to_string(),
            reverse: false,
            start_paused: false,
            idle_wait_ms: 5,
            engine_settings: None,
        }
    }
}

impl PlaybackConfig {
    /// Load from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn direction(&self) -> Direction {
        if self.reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }

    /// Unopened sequence using this config's extension and direction
    pub fn sequence<P: Into<PathBuf>, Q: Into<PathBuf>>(&self, base_dir: P, index_path: Q) -> Sequence {
        Sequence::new(base_dir, index_path, self.direction()).with_image_ext(&self.image_ext)
    }
}
