use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::library::DEFAULT_SCENE;

/// Viewer settings read from a TOML file.
///
/// ```toml
/// initial_scene = "pendulum.xml"
/// scenes_dir = "scenes"
/// seed = 7
///
/// [window]
/// width = 1280
/// height = 720
///
/// [params]
/// paused = false
/// ctrl_noise_rate = 0.1
/// ctrl_noise_std = 0.05
/// keyframe = 0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub initial_scene: String,
    /// Directory read into the scene library instead of the bundled scenes.
    pub scenes_dir: Option<PathBuf>,
    /// Seed for control noise; drawn from entropy when unset.
    pub seed: Option<u64>,
    pub window: WindowConfig,
    pub params: ViewerParams,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            initial_scene: DEFAULT_SCENE.to_string(),
            scenes_dir: None,
            seed: None,
            window: WindowConfig::default(),
            params: ViewerParams::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Runtime simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerParams {
    pub paused: bool,
    /// Correlation time of control noise, in seconds.
    pub ctrl_noise_rate: f64,
    /// Standard deviation of control noise; zero disables it.
    pub ctrl_noise_std: f64,
    /// Keyframe applied by the next-keyframe command.
    pub keyframe: usize,
}
