//! Memory map and hardware plumbing.
//!
//! Every CPU access lands in [`Bus::read`] / [`Bus::write`]. A per-address
//! delegate table routes memory-mapped registers to the device that owns
//! them; everything else is dispatched by address range.

use crate::apu::Apu;
use crate::cartridge::{Cartridge, ROM_RANGE, XRAM_RANGE};
use crate::config::AudioConfig;
use crate::hardware::Model;
use crate::interrupts::{IE_ADDR, IF_ADDR, Interrupts};
use crate::joypad::{JOYP, Joypad};
use crate::ppu::{Mode, OAM_RANGE, Ppu, VRAM_RANGE};
use crate::register::{Address16, AddressRange};
use crate::serial::{self, Serial};
use crate::timer::{self, Timer};

#[cfg(feature = "debugger")]
use crate::debugger::DebugListener;

pub const WRAM_RANGE: AddressRange = AddressRange::new(0xC000, 0xDFFF);
pub const ECHO_RANGE: AddressRange = AddressRange::new(0xE000, 0xFDFF);
pub const HRAM_RANGE: AddressRange = AddressRange::new(0xFF80, 0xFFFE);

pub const DMA: u16 = 0xFF46;
pub const KEY1: u16 = 0xFF4D;
pub const HDMA1: u16 = 0xFF51;
pub const HDMA2: u16 = 0xFF52;
pub const HDMA3: u16 = 0xFF53;
pub const HDMA4: u16 = 0xFF54;
pub const HDMA5: u16 = 0xFF55;
pub const SVBK: u16 = 0xFF70;

const WRAM_BANK_SIZE: usize = 0x1000;
const WRAM_BANKS: usize = 8;
const HDMA_BLOCK: u16 = 0x10;
const OAM_DMA_LEN: u16 = 0xA0;

/// Owner of a memory-mapped register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Joypad,
    Serial,
    Timer,
    InterruptFlag,
    InterruptEnable,
    Apu,
    Ppu,
    OamDma,
    Hdma,
    WramBank,
    Speed,
}

/// Binds one address to the device answering reads and writes there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryDelegate {
    pub address: u16,
    pub device: Device,
}

impl MemoryDelegate {
    fn new(address: u16, device: Device) -> Self {
        Self { address, device }
    }
}

/// Fixed regions behind the delegate table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Region {
    Rom,
    Vram,
    ExternalRam,
    WorkRam,
    EchoRam,
    Oam,
    HighRam,
    Unmapped,
}

impl Region {
    fn of(addr: u16) -> Self {
        if ROM_RANGE.contains(addr) {
            Region::Rom
        } else if VRAM_RANGE.contains(addr) {
            Region::Vram
        } else if XRAM_RANGE.contains(addr) {
            Region::ExternalRam
        } else if WRAM_RANGE.contains(addr) {
            Region::WorkRam
        } else if ECHO_RANGE.contains(addr) {
            Region::EchoRam
        } else if OAM_RANGE.contains(addr) {
            Region::Oam
        } else if HRAM_RANGE.contains(addr) {
            Region::HighRam
        } else {
            Region::Unmapped
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HdmaMode {
    General,
    HBlank,
}

#[derive(Debug)]
struct HdmaState {
    src: u16,
    /// Destination in VRAM (0x8000 | (dst & 0x1FF0))
    dst: u16,
    /// Blocks of 0x10 bytes still to copy.
    blocks: u8,
    mode: HdmaMode,
    active: bool,
}

pub struct Bus {
    pub cart: Cartridge,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub joypad: Joypad,
    pub serial: Serial,
    pub interrupts: Interrupts,
    wram: Box<[[u8; WRAM_BANK_SIZE]; WRAM_BANKS]>,
    /// SVBK as last written.
    wram_select: u8,
    hram: [u8; 0x7F],
    hdma: HdmaState,
    oam_dma_source: u8,
    key1: u8,
    delegates: Box<[Option<Device>]>,
    /// DMA engines are not subject to the PPU's VRAM/OAM lockout.
    dma_in_progress: bool,
    model: Model,
    #[cfg(feature = "debugger")]
    pub(crate) debugger: Option<Box<dyn DebugListener>>,
}

impl Bus {
    pub fn new(cart: Cartridge, model: Model, audio: AudioConfig) -> Self {
        let cgb = model.is_cgb();
        let mut delegates = vec![None; 0x10000].into_boxed_slice();
        for delegate in Self::memory_delegates(model) {
            let slot = &mut delegates[delegate.address as usize];
            debug_assert!(
                slot.is_none(),
                "two devices registered at {}",
                Address16(delegate.address)
            );
            *slot = Some(delegate.device);
        }

        Self {
            cart,
            ppu: Ppu::new(cgb),
            apu: Apu::new(cgb, audio),
            timer: Timer::new(),
            joypad: Joypad::new(),
            serial: Serial::new(cgb),
            interrupts: Interrupts::new(),
            wram: Box::new([[0; WRAM_BANK_SIZE]; WRAM_BANKS]),
            wram_select: 0,
            hram: [0; 0x7F],
            hdma: HdmaState {
                src: 0,
                dst: Self::sanitize_vram_dma_dest(0),
                blocks: 0,
                mode: HdmaMode::General,
                active: false,
            },
            oam_dma_source: 0xFF,
            key1: 0,
            delegates,
            dma_in_progress: false,
            model,
            #[cfg(feature = "debugger")]
            debugger: None,
        }
    }

    /// Every register each device answers for under `model`. CGB-only
    /// registers are left out on DMG so they read as open bus.
    pub fn memory_delegates(model: Model) -> Vec<MemoryDelegate> {
        let mut list = vec![
            MemoryDelegate::new(JOYP, Device::Joypad),
            MemoryDelegate::new(IF_ADDR, Device::InterruptFlag),
            MemoryDelegate::new(IE_ADDR, Device::InterruptEnable),
            MemoryDelegate::new(DMA, Device::OamDma),
        ];
        list.extend(
            serial::REGISTERS
                .into_iter()
                .map(|a| MemoryDelegate::new(a, Device::Serial)),
        );
        list.extend(
            timer::REGISTERS
                .into_iter()
                .map(|a| MemoryDelegate::new(a, Device::Timer)),
        );
        list.extend(Apu::registers().map(|a| MemoryDelegate::new(a, Device::Apu)));
        list.extend(Ppu::registers(model.is_cgb()).map(|a| MemoryDelegate::new(a, Device::Ppu)));
        if model.is_cgb() {
            list.extend(
                [HDMA1, HDMA2, HDMA3, HDMA4, HDMA5]
                    .into_iter()
                    .map(|a| MemoryDelegate::new(a, Device::Hdma)),
            );
            list.push(MemoryDelegate::new(SVBK, Device::WramBank));
            list.push(MemoryDelegate::new(KEY1, Device::Speed));
        }
        list
    }

    /// I/O state the boot ROM leaves behind when it jumps to 0x0100.
    pub fn apply_boot_state(&mut self) {
        let cgb = self.model.is_cgb();
        self.ppu.apply_boot_state();
        if cgb && !self.cart.cgb_supported() {
            self.ppu.apply_dmg_compatibility_palettes();
        }
        self.apu.apply_boot_state();
        self.timer.apply_boot_state(cgb);
        self.interrupts.write_flags(0xE1);
        self.oam_dma_source = 0xFF;
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn delegate_at(&self, addr: u16) -> Option<Device> {
        self.delegates[addr as usize]
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        #[cfg(feature = "debugger")]
        if let Some(listener) = self.debugger.as_mut() {
            listener.on_read_access(addr);
        }
        match self.delegates[addr as usize] {
            Some(device) => self.read_device(device, addr),
            None => self.read_region(addr),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        #[cfg(feature = "debugger")]
        if let Some(listener) = self.debugger.as_mut() {
            listener.on_write_access(addr, val);
        }
        match self.delegates[addr as usize] {
            Some(device) => self.write_device(device, addr, val),
            None => self.write_region(addr, val),
        }
    }

    pub fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write_word(&mut self, addr: u16, val: u16) {
        self.write(addr, val as u8);
        self.write(addr.wrapping_add(1), (val >> 8) as u8);
    }

    /// Copy `len` bytes with ordinary read/write semantics. The PPU's
    /// VRAM/OAM lockout does not apply to the copy.
    pub fn dma(&mut self, src: u16, dst: u16, len: u16) {
        self.dma_in_progress = true;
        for i in 0..len {
            let byte = self.read(src.wrapping_add(i));
            self.write(dst.wrapping_add(i), byte);
        }
        self.dma_in_progress = false;
    }

    fn read_device(&mut self, device: Device, addr: u16) -> u8 {
        match device {
            Device::Joypad => self.joypad.read(),
            Device::Serial => self.serial.read(addr),
            Device::Timer => self.timer.read(addr),
            Device::InterruptFlag => self.interrupts.read_flags(),
            Device::InterruptEnable => self.interrupts.enable,
            Device::Apu => self.apu.read_reg(addr),
            Device::Ppu => self.ppu.read_reg(addr),
            Device::OamDma => self.oam_dma_source,
            Device::Hdma => match addr {
                HDMA5 => {
                    let remaining = self.hdma.blocks.wrapping_sub(1) & 0x7F;
                    if self.hdma.active {
                        remaining
                    } else {
                        0x80 | remaining
                    }
                }
                _ => 0xFF,
            },
            Device::WramBank => 0xF8 | self.wram_select,
            // Speed switching is not emulated: always normal speed.
            Device::Speed => 0x7E | (self.key1 & 0x01),
        }
    }

    fn write_device(&mut self, device: Device, addr: u16, val: u8) {
        match device {
            Device::Joypad => self.joypad.write(val),
            Device::Serial => self.serial.write(addr, val),
            Device::Timer => self.timer.write(addr, val, &mut self.interrupts),
            Device::InterruptFlag => self.interrupts.write_flags(val),
            Device::InterruptEnable => self.interrupts.enable = val,
            Device::Apu => self.apu.write_reg(addr, val),
            Device::Ppu => self.ppu.write_reg(addr, val, &mut self.interrupts),
            Device::OamDma => {
                self.oam_dma_source = val;
                self.dma((val as u16) << 8, OAM_RANGE.low, OAM_DMA_LEN);
            }
            Device::Hdma => self.write_hdma(addr, val),
            Device::WramBank => self.wram_select = val & 0x07,
            Device::Speed => self.key1 = val & 0x01,
        }
    }

    fn wram_bank(&self) -> usize {
        match self.wram_select {
            0 => 1,
            n => n as usize,
        }
    }

    fn wram_index(&self, addr: u16) -> (usize, usize) {
        let offset = (addr - WRAM_RANGE.low) as usize;
        if offset < WRAM_BANK_SIZE {
            (0, offset)
        } else {
            (self.wram_bank(), offset - WRAM_BANK_SIZE)
        }
    }

    fn read_region(&mut self, addr: u16) -> u8 {
        match Region::of(addr) {
            Region::Rom => self.cart.read_rom(Address16(addr)),
            Region::Vram => {
                if self.ppu.vram_blocked() && !self.dma_in_progress {
                    return 0xFF;
                }
                self.ppu.read_vram(addr)
            }
            Region::ExternalRam => self.cart.read_ram(Address16(addr)),
            Region::WorkRam => {
                let (bank, offset) = self.wram_index(addr);
                self.wram[bank][offset]
            }
            Region::EchoRam => {
                let (bank, offset) = self.wram_index(addr - 0x2000);
                self.wram[bank][offset]
            }
            Region::Oam => {
                if self.ppu.oam_blocked() && !self.dma_in_progress {
                    return 0xFF;
                }
                self.ppu.read_oam(addr)
            }
            Region::HighRam => self.hram[(addr - HRAM_RANGE.low) as usize],
            Region::Unmapped => {
                log::debug!("Unmapped read at {}", Address16(addr));
                0xFF
            }
        }
    }

    fn write_region(&mut self, addr: u16, val: u8) {
        match Region::of(addr) {
            Region::Rom => self.cart.write_rom(Address16(addr), val),
            Region::Vram => {
                if self.ppu.vram_blocked() && !self.dma_in_progress {
                    return;
                }
                self.ppu.write_vram(addr, val);
            }
            Region::ExternalRam => self.cart.write_ram(Address16(addr), val),
            Region::WorkRam => {
                let (bank, offset) = self.wram_index(addr);
                self.wram[bank][offset] = val;
            }
            Region::EchoRam => {
                let (bank, offset) = self.wram_index(addr - 0x2000);
                self.wram[bank][offset] = val;
            }
            Region::Oam => {
                if self.ppu.oam_blocked() && !self.dma_in_progress {
                    return;
                }
                self.ppu.write_oam(addr, val);
            }
            Region::HighRam => self.hram[(addr - HRAM_RANGE.low) as usize] = val,
            Region::Unmapped => {
                log::debug!("Unmapped write at {} <- {val:02X}", Address16(addr));
            }
        }
    }

    #[inline]
    fn sanitize_vram_dma_dest(addr: u16) -> u16 {
        0x8000 | (addr & 0x1FF0)
    }

    fn write_hdma(&mut self, addr: u16, val: u8) {
        match addr {
            HDMA1 => self.hdma.src = (self.hdma.src & 0x00FF) | ((val as u16) << 8),
            HDMA2 => self.hdma.src = (self.hdma.src & 0xFF00) | (val as u16 & 0xF0),
            HDMA3 => {
                self.hdma.dst =
                    Self::sanitize_vram_dma_dest((self.hdma.dst & 0x00FF) | ((val as u16) << 8))
            }
            HDMA4 => {
                self.hdma.dst =
                    Self::sanitize_vram_dma_dest((self.hdma.dst & 0xFF00) | val as u16)
            }
            HDMA5 => {
                if self.hdma.active && val & 0x80 == 0 {
                    // Cancel the running H-Blank transfer; the remaining
                    // count stays readable.
                    self.hdma.active = false;
                    log::trace!("HDMA cancelled with {} blocks left", self.hdma.blocks);
                    return;
                }
                let blocks = (val & 0x7F) + 1;
                if val & 0x80 == 0 {
                    self.hdma.mode = HdmaMode::General;
                    self.hdma.blocks = blocks;
                    self.hdma.active = true;
                    while self.hdma.active {
                        self.transfer_hdma_block();
                    }
                } else {
                    self.hdma.mode = HdmaMode::HBlank;
                    self.hdma.blocks = blocks;
                    self.hdma.active = true;
                    // Already inside H-Blank (or no H-Blank will come): the
                    // first block goes now.
                    if !self.ppu.lcd_enabled() || self.ppu.mode() == Mode::HBlank {
                        self.transfer_hdma_block();
                    }
                }
            }
            _ => {}
        }
    }

    /// Execute one 0x10-byte H-Blank DMA burst if a transfer is armed.
    pub fn hdma_hblank(&mut self) {
        if self.hdma.active && self.hdma.mode == HdmaMode::HBlank {
            self.transfer_hdma_block();
        }
    }

    pub fn hdma_active(&self) -> bool {
        self.hdma.active
    }

    fn transfer_hdma_block(&mut self) {
        let src = self.hdma.src;
        let dst = Self::sanitize_vram_dma_dest(self.hdma.dst);
        self.dma(src, dst, HDMA_BLOCK);
        self.hdma.src = src.wrapping_add(HDMA_BLOCK);
        self.hdma.dst = Self::sanitize_vram_dma_dest(dst.wrapping_add(HDMA_BLOCK));
        self.hdma.blocks = self.hdma.blocks.saturating_sub(1);
        if self.hdma.blocks == 0 {
            self.hdma.active = false;
        }
    }
}
