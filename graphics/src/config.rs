//! Render path configuration files.
//!
//! A [`RenderPathConfig`] is loaded from TOML. Every section and field is
//! optional; missing values take their defaults:
//!
//! ```toml
//! [display]
//! width = 1920
//! height = 1080
//! msaa = 4
//! strategy = "deferred"
//!
//! [features]
//! ao = "hbao"
//! ssr = true
//!
//! [postprocess]
//! exposure = 1.2
//!
//! [jobs]
//! workers = 4
//! ```
//!
//! [`RenderPath3D::apply_config`] feeds a config through the public setters.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GraphicsError;
use crate::render_path::{Features, Fsr2Preset, PostprocessSettings, RenderPath3D, RenderStrategy, RendererSettings};

/// Errors from loading a config file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io { path: PathBuf, source: std::io::Error },
    /// The file is not valid TOML or has mistyped fields.
    Parse(String),
    /// Parsed values are out of range.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse(msg) => write!(f, "failed to parse config: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Output surface and shading strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Ignored when `fsr2_preset` is set.
    pub resolution_scale: f32,
    pub msaa: u32,
    pub fsr2_preset: Option<Fsr2Preset>,
    pub strategy: RenderStrategy,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            resolution_scale: 1.0,
            msaa: 1,
            fsr2_preset: None,
            strategy: RenderStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
}

impl JobsConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1)
        })
    }
}

/// Everything a render path can be configured with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderPathConfig {
    pub display: DisplayConfig,
    pub features: Features,
    pub renderer: RendererSettings,
    pub postprocess: PostprocessSettings,
    pub jobs: JobsConfig,
}

impl RenderPathConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!(
            "RenderPathConfig: loaded {} ({}x{}, {})",
            path.display(),
            config.display.width,
            config.display.height,
            config.display.strategy.name()
        );
        Ok(config)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let display = &self.display;
        if display.width == 0 || display.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "display size {}x{} must be non-zero",
                display.width, display.height
            )));
        }
        if !matches!(display.msaa, 1 | 2 | 4 | 8) {
            return Err(ConfigError::Invalid(format!("msaa must be 1, 2, 4 or 8, got {}", display.msaa)));
        }
        if display.fsr2_preset.is_none() && !(display.resolution_scale > 0.0 && display.resolution_scale <= 4.0) {
            return Err(ConfigError::Invalid(format!(
                "resolution_scale {} outside (0, 4]",
                display.resolution_scale
            )));
        }
        if self.jobs.workers == Some(0) {
            return Err(ConfigError::Invalid("jobs.workers must be at least 1".into()));
        }
        Ok(())
    }
}

impl RenderPath3D {
    /// Apply a config through the public setters.
    ///
    /// Feature toggles take effect immediately when resources exist; display
    /// values are picked up by the next `update`.
    pub fn apply_config(&mut self, config: &RenderPathConfig) -> Result<(), GraphicsError> {
        let display = &config.display;
        self.set_strategy(display.strategy);
        self.set_resolution(display.width, display.height);
        match display.fsr2_preset {
            Some(preset) => self.set_fsr2_preset(preset),
            None => self.set_resolution_scale(display.resolution_scale)?,
        }
        self.set_msaa_sample_count(display.msaa)?;

        *self.renderer_mut() = config.renderer;
        *self.postprocess_mut() = config.postprocess;

        let features = &config.features;
        self.set_ao(features.ao)?;
        self.set_ssr_enabled(features.ssr)?;
        self.set_raytraced_reflections_enabled(features.raytraced_reflections)?;
        self.set_ssgi_enabled(features.ssgi)?;
        self.set_raytraced_diffuse_enabled(features.raytraced_diffuse)?;
        self.set_fsr_enabled(features.fsr)?;
        self.set_fsr2_enabled(features.fsr2)?;
        self.set_motion_blur_enabled(features.motion_blur)?;
        self.set_depth_of_field_enabled(features.depth_of_field)?;
        self.set_eye_adaption_enabled(features.eye_adaption)?;
        self.set_reflections_enabled(features.reflections)?;
        self.set_bloom_enabled(features.bloom)?;
        self.set_volume_lights_enabled(features.volume_lights)?;
        self.set_light_shafts_enabled(features.light_shafts)?;
        self.set_outline_enabled(features.outline)?;

        log::debug!(
            "RenderPath3D: applied config ({}x{}, msaa {}, {})",
            display.width,
            display.height,
            display.msaa,
            display.strategy.name()
        );
        Ok(())
    }
}
