use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

use gbemu_core::config::{AudioConfig, DEFAULT_BUFFER_FRAMES, DEFAULT_SAMPLE_RATE};
use gbemu_core::{Config, ModelPreference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmulationMode {
    #[default]
    Auto,
    ForceDmg,
    ForceCgb,
}

impl From<EmulationMode> for ModelPreference {
    fn from(mode: EmulationMode) -> Self {
        match mode {
            EmulationMode::Auto => ModelPreference::Auto,
            EmulationMode::ForceDmg => ModelPreference::Dmg,
            EmulationMode::ForceCgb => ModelPreference::Cgb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub emulation_mode: EmulationMode,
    /// Frames to run before exiting.
    pub frames: u32,
    pub sample_rate: u32,
    pub buffer_frames: usize,
    /// Print bytes sent over the serial port.
    pub serial: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            emulation_mode: EmulationMode::Auto,
            frames: 60,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            serial: false,
        }
    }
}

impl RunnerConfig {
    pub fn core_config(&self) -> Config {
        Config {
            model: self.emulation_mode.into(),
            audio: AudioConfig {
                sample_rate: self.sample_rate.max(1),
                buffer_frames: self.buffer_frames.max(1),
            },
        }
    }
}

pub fn load_from_file(path: &Path) -> RunnerConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to read config {}: {e}; using defaults", path.display());
            return RunnerConfig::default();
        }
    };

    match toml::from_str::<RunnerConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            RunnerConfig::default()
        }
    }
}
