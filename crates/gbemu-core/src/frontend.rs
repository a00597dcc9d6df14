//! Callbacks through which the core hands video and audio to a frontend.

/// One RGB888 pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn from_rgb(rgb: u32) -> Self {
        Self {
            r: (rgb >> 16) as u8,
            g: (rgb >> 8) as u8,
            b: rgb as u8,
        }
    }
}

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

pub trait VideoSink: Send {
    /// A visible scanline finished rendering.
    fn on_render_line(&mut self, line: u8, pixels: &[Color; SCREEN_WIDTH]);

    /// The PPU entered V-Blank; all 144 lines of the frame were delivered.
    fn on_render_frame(&mut self) {}
}

pub trait AudioSink: Send {
    /// Interleaved stereo samples (left, right, left, ...).
    fn on_audio_buffer_full(&mut self, samples: &[i16]);
}

/// Used when no frontend is attached.
#[derive(Default)]
pub struct NullVideoSink;

impl VideoSink for NullVideoSink {
    fn on_render_line(&mut self, _line: u8, _pixels: &[Color; SCREEN_WIDTH]) {}
}

#[derive(Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn on_audio_buffer_full(&mut self, _samples: &[i16]) {}
}
