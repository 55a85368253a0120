use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use glam::{DVec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_xy_scale() -> f64 {
    1.0
}

fn default_z_scale() -> f64 {
    100.0
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Conversion settings, usually read from a YAML file and then overridden
/// from the command line.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub materials: MaterialPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Multipliers applied to map coordinates. Elevation is exaggerated relative
/// to planar extent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_xy_scale")]
    pub x: f64,
    #[serde(default = "default_xy_scale")]
    pub y: f64,
    #[serde(default = "default_z_scale")]
    pub z: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            x: default_xy_scale(),
            y: default_xy_scale(),
            z: default_z_scale(),
        }
    }
}

impl ScaleConfig {
    pub fn apply(&self, position: DVec2, elevation: f64) -> Vec3 {
        Vec3::new(
            (position.x * self.x) as f32,
            (position.y * self.y) as f32,
            (elevation * self.z) as f32,
        )
    }
}

/// Which palette entries get an effect and material in the exported scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MaterialPolicy {
    /// Every palette entry, used or not.
    #[default]
    All,
    /// Only biomes that own at least one triangle.
    Used,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

impl ConvertConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ConvertConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, value) in [("x", self.scale.x), ("y", self.scale.y), ("z", self.scale.z)] {
            if !value.is_finite() {
                return Err(ConfigError::Validation(format!(
                    "{axis} scale must be finite, got {value}"
                )));
            }
        }
        if self.scale.x == 0.0 || self.scale.y == 0.0 {
            return Err(ConfigError::Validation(
                "x and y scales must be non-zero".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging level must not be empty".into(),
            ));
        }
        Ok(())
    }
}
