use std::io;
use std::path::Path;

use crate::bus::Bus;
use crate::cartridge::{Cartridge, CartridgeError};
use crate::config::Config;
use crate::cpu::Cpu;
use crate::frontend::{
    AudioSink, Color, NullAudioSink, NullVideoSink, SCREEN_HEIGHT, SCREEN_WIDTH, VideoSink,
};
use crate::hardware::Model;
use crate::joypad::Key;

#[cfg(feature = "debugger")]
use crate::debugger::DebugListener;

/// Frame length used for pacing while the LCD is off.
pub const CYCLES_PER_FRAME: u32 = 71_520;

/// The whole machine: CPU, bus and everything hanging off it, plus the
/// frontend sinks that receive video and audio.
pub struct GameBoy {
    pub cpu: Cpu,
    pub bus: Bus,
    video: Box<dyn VideoSink>,
    audio: Box<dyn AudioSink>,
    config: Config,
}

impl GameBoy {
    pub fn new(cart: Cartridge) -> Self {
        Self::with_config(cart, Config::default())
    }

    /// Build a machine in the post-boot state for the model `config` picks
    /// for this cartridge.
    pub fn with_config(cart: Cartridge, config: Config) -> Self {
        let model = config.model.resolve(cart.header());
        log::info!("Starting \"{}\" as {model:?}", cart.title());
        let mut bus = Bus::new(cart, model, config.audio);
        bus.apply_boot_state();
        Self {
            cpu: Cpu::new(model),
            bus,
            video: Box::new(NullVideoSink),
            audio: Box::new(NullAudioSink),
            config,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P, config: Config) -> Result<Self, CartridgeError> {
        let cart = Cartridge::from_file(path)?;
        Ok(Self::with_config(cart, config))
    }

    /// Replace the cartridge and reset the machine. The previous cartridge is
    /// flushed to disk when dropped.
    pub fn load_rom<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CartridgeError> {
        let cart = Cartridge::from_file(path)?;
        let model = self.config.model.resolve(cart.header());
        let mut bus = Bus::new(cart, model, self.config.audio);
        bus.apply_boot_state();
        self.bus = bus;
        self.cpu = Cpu::new(model);
        Ok(())
    }

    pub fn model(&self) -> Model {
        self.bus.model()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_video_sink(&mut self, sink: Box<dyn VideoSink>) {
        self.video = sink;
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.audio = sink;
    }

    /// Run one CPU step and advance every peripheral by the cycles it took.
    /// Peripheral order is fixed: interrupts they raise are seen by the next
    /// step, never the current one.
    pub fn tick(&mut self) -> u32 {
        let cycles = self.cpu.tick(&mut self.bus);
        let bus = &mut self.bus;
        bus.timer.step(cycles, &mut bus.interrupts);
        bus.apu.tick(cycles, self.audio.as_mut());
        let hblanks = bus
            .ppu
            .tick(cycles, &mut bus.interrupts, self.video.as_mut());
        for _ in 0..hblanks {
            bus.hdma_hblank();
        }
        bus.serial.step(cycles, &mut bus.interrupts);
        bus.cart.step_rtc(cycles);
        cycles
    }

    /// Run until the PPU completes a frame, or for one frame's worth of
    /// cycles while the LCD is off. Returns the cycles executed.
    pub fn tick_one_frame(&mut self) -> u32 {
        let start = self.bus.ppu.frames();
        let mut elapsed = 0u32;
        loop {
            elapsed += self.tick();
            if self.bus.ppu.frames() != start {
                break;
            }
            if !self.bus.ppu.lcd_enabled() && elapsed >= CYCLES_PER_FRAME {
                break;
            }
        }
        elapsed
    }

    pub fn press_key(&mut self, key: Key) {
        self.bus.joypad.press(key, &mut self.bus.interrupts);
    }

    pub fn release_key(&mut self, key: Key) {
        self.bus.joypad.release(key);
    }

    /// Flush battery RAM and RTC state to their sibling files.
    pub fn save_ram_rtc(&mut self) -> io::Result<()> {
        self.bus.cart.save()
    }

    pub fn framebuffer(&self) -> &[Color; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.bus.ppu.framebuffer()
    }

    pub fn frames(&self) -> u64 {
        self.bus.ppu.frames()
    }

    /// Bytes shifted out of the serial port since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.bus.serial.take_output()
    }

    #[cfg(feature = "debugger")]
    pub fn attach_debugger(&mut self, listener: Box<dyn DebugListener>) {
        self.bus.debugger = Some(listener);
    }

    #[cfg(feature = "debugger")]
    pub fn detach_debugger(&mut self) -> Option<Box<dyn DebugListener>> {
        self.bus.debugger.take()
    }
}
