#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use gbemu_core::bus::Bus;
use gbemu_core::cartridge::{Cartridge, Header, ROM_BANK_SIZE};
use gbemu_core::config::AudioConfig;
use gbemu_core::frontend::{AudioSink, Color, SCREEN_WIDTH, VideoSink};
use gbemu_core::{Config, GameBoy, Model, ModelPreference};

pub const PROGRAM_START: usize = 0x0100;

/// Assembles a ROM image with a valid header around a test program.
pub struct RomBuilder {
    rom: Vec<u8>,
    tag_banks: bool,
}

impl RomBuilder {
    pub fn new() -> Self {
        let mut rom = vec![0; 2 * ROM_BANK_SIZE];
        rom[0x0134..0x0138].copy_from_slice(b"TEST");
        Self {
            rom,
            tag_banks: false,
        }
    }

    pub fn cart_type(mut self, cart_type: u8) -> Self {
        self.rom[0x0147] = cart_type;
        self
    }

    pub fn ram_size_code(mut self, code: u8) -> Self {
        self.rom[0x0149] = code;
        self
    }

    /// Resize to `banks` 16 KiB banks (a power of two, at least 2).
    pub fn rom_banks(mut self, banks: usize) -> Self {
        self.rom.resize(banks * ROM_BANK_SIZE, 0);
        self.rom[0x0148] = (banks / 2).trailing_zeros() as u8;
        self
    }

    pub fn cgb(mut self) -> Self {
        self.rom[0x0143] = 0x80;
        self
    }

    /// Store each bank's number in its first byte.
    pub fn tag_banks(mut self) -> Self {
        self.tag_banks = true;
        self
    }

    pub fn program(self, code: &[u8]) -> Self {
        self.bytes_at(PROGRAM_START, code)
    }

    pub fn bytes_at(mut self, addr: usize, bytes: &[u8]) -> Self {
        self.rom[addr..addr + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        if self.tag_banks {
            for bank in 1..self.rom.len() / ROM_BANK_SIZE {
                self.rom[bank * ROM_BANK_SIZE] = bank as u8;
            }
        }
        self.rom[0x014D] = Header::compute_checksum(&self.rom);
        self.rom
    }

    pub fn cartridge(self) -> Cartridge {
        Cartridge::from_bytes(self.build()).expect("test ROM should load")
    }
}

pub fn dmg_with_program(code: &[u8]) -> GameBoy {
    GameBoy::with_config(RomBuilder::new().program(code).cartridge(), dmg_config())
}

pub fn cgb_with_program(code: &[u8]) -> GameBoy {
    GameBoy::with_config(
        RomBuilder::new().cgb().program(code).cartridge(),
        Config {
            model: ModelPreference::Cgb,
            ..Config::default()
        },
    )
}

pub fn dmg_config() -> Config {
    Config {
        model: ModelPreference::Dmg,
        ..Config::default()
    }
}

pub fn bus(model: Model) -> Bus {
    let mut builder = RomBuilder::new();
    if model.is_cgb() {
        builder = builder.cgb();
    }
    let mut bus = Bus::new(builder.cartridge(), model, AudioConfig::default());
    bus.apply_boot_state();
    bus
}

/// Counts callbacks; clones share the counters so a copy can be handed to the
/// emulator and inspected afterwards.
#[derive(Clone, Default)]
pub struct RecordingVideo {
    pub lines: Arc<Mutex<Vec<u8>>>,
    pub frames: Arc<Mutex<u32>>,
}

impl VideoSink for RecordingVideo {
    fn on_render_line(&mut self, line: u8, _pixels: &[Color; SCREEN_WIDTH]) {
        self.lines.lock().unwrap().push(line);
    }

    fn on_render_frame(&mut self) {
        *self.frames.lock().unwrap() += 1;
    }
}

#[derive(Clone, Default)]
pub struct RecordingAudio {
    pub buffers: Arc<Mutex<Vec<Vec<i16>>>>,
}

impl AudioSink for RecordingAudio {
    fn on_audio_buffer_full(&mut self, samples: &[i16]) {
        self.buffers.lock().unwrap().push(samples.to_vec());
    }
}
