use crate::cartridge::Header;
use crate::hardware::Model;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_BUFFER_FRAMES: usize = 1024;

/// Which console to emulate for a given cartridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ModelPreference {
    /// CGB when the header advertises color support, otherwise DMG.
    #[default]
    Auto,
    Dmg,
    Cgb,
}

impl ModelPreference {
    pub fn resolve(self, header: &Header) -> Model {
        match self {
            ModelPreference::Auto if header.cgb_supported() => Model::Cgb,
            ModelPreference::Auto | ModelPreference::Dmg => Model::Dmg,
            ModelPreference::Cgb => Model::Cgb,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Stereo frames per buffer handed to the audio sink.
    pub buffer_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Config {
    pub model: ModelPreference,
    pub audio: AudioConfig,
}
