//! Game Boy / Game Boy Color emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU, bus, PPU,
//! APU, cartridge mappers and the minor peripherals). Frontends live in
//! separate crates and drive the core through the [`gameboy`] facade and the
//! sink traits in [`frontend`].

/// Audio Processing Unit (APU) emulation.
pub mod apu;

/// Memory map, delegate table and DMA engines.
pub mod bus;

/// Cartridge mappers (MBC) and ROM/RAM/RTC handling.
pub mod cartridge;

/// Model and audio settings chosen by the frontend.
pub mod config;

/// LR35902 CPU core.
pub mod cpu;

/// Instruction and memory-access listener hooks.
#[cfg(feature = "debugger")]
pub mod debugger;

/// Video and audio callbacks consumed by frontends.
pub mod frontend;

/// High-level facade that wires the CPU and bus into a single machine.
pub mod gameboy;

/// Hardware models.
pub mod hardware;

/// Interrupt request and enable registers.
pub mod interrupts;

/// Joypad input register.
pub mod joypad;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// Register and address value types with their arithmetic.
pub mod register;

/// Serial unit and link cable stub.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

/// Master clock in T-cycles per second.
pub const CPU_CLOCK_HZ: u32 = 4_194_304;

pub use cartridge::{Cartridge, CartridgeError};
pub use config::{AudioConfig, Config, ModelPreference};
pub use frontend::{AudioSink, Color, VideoSink};
pub use gameboy::GameBoy;
pub use hardware::Model;
pub use joypad::Key;
