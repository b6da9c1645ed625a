// Player configuration
// Loaded from JSON, every field optional

use crate::renderer::{RenderOptions, RendererError, ScaleMode, ShaderSources};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// GPU adapter preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    Default,
    LowPower,
    HighPerformance,
}

impl From<PowerMode> for wgpu::PowerPreference {
    fn from(mode: PowerMode) -> Self {
        match mode {
            PowerMode::Default => wgpu::PowerPreference::None,
            PowerMode::LowPower => wgpu::PowerPreference::LowPower,
            PowerMode::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Window title
    pub title: String,
    /// Initial window size
    pub width: u32,
    pub height: u32,
    pub scale_mode: ScaleMode,
    /// RGBA, 0.0 - 1.0
    pub clear_color: [f64; 4],
    /// WGSL overrides; both or neither
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
    /// Redraw every event loop iteration instead of on submission
    pub continuous_redraw: bool,
    pub power_preference: PowerMode,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            title: "I420 Player".to_string(),
            width: 1280,
            height: 720,
            scale_mode: ScaleMode::Stretch,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: None,
            fragment_shader: None,
            continuous_redraw: false,
            power_preference: PowerMode::Default,
        }
    }
}

impl PlayerConfig {
    pub fn from_file(path: &Path) -> Result<Self, RendererError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RendererError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: PlayerConfig = serde_json::from_str(&text).map_err(|e| {
            RendererError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RendererError> {
        if self.width == 0 || self.height == 0 {
            return Err(RendererError::Config(format!(
                "Window size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(RendererError::Config(format!(
                "Clear color components must be within 0.0 - 1.0, got {:?}",
                self.clear_color
            )));
        }
        if self.vertex_shader.is_some() != self.fragment_shader.is_some() {
            return Err(RendererError::Config(
                "vertex_shader and fragment_shader must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            scale_mode: self.scale_mode,
            clear_color: self.clear_color,
        }
    }

    /// Shader sources from the configured paths, or the bundled pair
    pub fn shader_sources(&self) -> Result<ShaderSources, RendererError> {
        match (&self.vertex_shader, &self.fragment_shader) {
            (Some(vertex), Some(fragment)) => ShaderSources::load(vertex, fragment),
            (None, None) => Ok(ShaderSources::bundled()),
            _ => Err(RendererError::Config(
                "vertex_shader and fragment_shader must be set together".to_string(),
            )),
        }
    }
}
