use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, SpectrumError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.audio.validate()?;
        Ok(config)
    }
}

/// What to do with the frames left over when fewer than one block remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    /// Stop streaming without playing the partial block.
    #[default]
    Drop,
    /// Pad the partial block with silence and deliver it as a final block.
    ZeroPad,
}

/// Window applied to each block before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    #[default]
    Rectangular,
    Hann,
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Frames per callback and samples per analysed block.
    pub block_size: usize,
    pub tail: TailPolicy,
    pub window: WindowFunction,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_size: 1024,
            tail: TailPolicy::Drop,
            window: WindowFunction::Rectangular,
        }
    }
}

impl AudioConfig {
    /// Rejects block sizes the transform cannot split into `N/2` bins.
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 2 || self.block_size % 2 != 0 {
            return Err(SpectrumError::Config(format!(
                "block size must be an even number of at least 2 samples, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

/// Configuration for the spectrum consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Weight kept from the previous frame when smoothing magnitudes.
    pub smoothing_decay: f32,
    pub bands: usize,
    /// Frames between two log lines of the trace visualiser.
    pub log_every: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            smoothing_decay: 0.95,
            bands: 128,
            log_every: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_player() {
        let config = AppConfig::default();
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.audio.tail, TailPolicy::Drop);
        assert_eq!(config.audio.window, WindowFunction::Rectangular);
        assert_eq!(config.render.bands, 128);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "audio": { "block_size": 2048, "tail": "zero_pad" } }"#)
                .unwrap();

        assert_eq!(config.audio.block_size, 2048);
        assert_eq!(config.audio.tail, TailPolicy::ZeroPad);
        assert_eq!(config.audio.window, WindowFunction::Rectangular);
        assert!((config.render.smoothing_decay - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_odd_or_tiny_block_sizes() {
        for block_size in [0, 1, 3, 1023] {
            let config = AudioConfig {
                block_size,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(SpectrumError::Config(_))));
        }
    }

    #[test]
    fn loads_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, r#"{ "audio": { "window": "hann" }, "render": { "bands": 32 } }"#)
            .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.audio.window, WindowFunction::Hann);
        assert_eq!(config.render.bands, 32);
    }
}
