//! Cartridge images and their memory bank controllers.

mod rtc;

pub use rtc::{Rtc, RtcRegisters, unix_now};

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::register::{Address16, AddressRange, PhysicalAddress};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

pub const ROM_RANGE: AddressRange = AddressRange::new(0x0000, 0x7FFF);
pub const ROM_BANK0_RANGE: AddressRange = AddressRange::new(0x0000, 0x3FFF);
pub const ROM_BANKN_RANGE: AddressRange = AddressRange::new(0x4000, 0x7FFF);
pub const XRAM_RANGE: AddressRange = AddressRange::new(0xA000, 0xBFFF);

const HEADER_END: usize = 0x0150;
const TITLE_START: usize = 0x0134;
const TITLE_END: usize = 0x0143;
const CGB_FLAG: usize = 0x0143;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const HEADER_CHECKSUM: usize = 0x014D;

const MBC2_RAM_SIZE: usize = 0x200;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ROM image is {0} bytes, too short to hold a cartridge header")]
    HeaderTruncated(usize),
    #[error("header checksum mismatch: header has {expected:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { expected: u8, computed: u8 },
    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedMbc(u8),
}

/// Parsed cartridge header fields (0x0134-0x014D).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub cgb_flag: u8,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub checksum: u8,
}

impl Header {
    pub fn parse(rom: &[u8]) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::HeaderTruncated(rom.len()));
        }
        let mut title = &rom[TITLE_START..TITLE_END];
        if let Some(end) = title.iter().position(|&b| b == 0) {
            title = &title[..end];
        }
        Ok(Self {
            title: String::from_utf8_lossy(title).trim().to_string(),
            cgb_flag: rom[CGB_FLAG],
            cart_type: rom[CART_TYPE],
            rom_size_code: rom[ROM_SIZE],
            ram_size_code: rom[RAM_SIZE],
            checksum: rom[HEADER_CHECKSUM],
        })
    }

    /// `x = x - rom[i] - 1` over 0x0134..=0x014C.
    pub fn compute_checksum(rom: &[u8]) -> u8 {
        rom.get(TITLE_START..HEADER_CHECKSUM)
            .unwrap_or_default()
            .iter()
            .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1))
    }

    pub fn verify(&self, rom: &[u8]) -> Result<(), CartridgeError> {
        let computed = Self::compute_checksum(rom);
        if computed != self.checksum {
            return Err(CartridgeError::ChecksumMismatch {
                expected: self.checksum,
                computed,
            });
        }
        Ok(())
    }

    pub fn cgb_supported(&self) -> bool {
        self.cgb_flag & 0x80 != 0
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10)
    }

    /// External RAM size in bytes.
    pub fn ram_size(&self) -> usize {
        if matches!(self.cart_type, 0x05 | 0x06) {
            return MBC2_RAM_SIZE;
        }
        match self.ram_size_code {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0x2000,
        }
    }
}

/// Bank registers shared by every controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BankState {
    pub rom_bank: u16,
    pub ram_bank: u8,
    pub xram_enabled: bool,
}

impl Default for BankState {
    fn default() -> Self {
        Self {
            rom_bank: 1,
            ram_bank: 0,
            xram_enabled: false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Mbc {
    None,
    Mbc1 {
        banks: BankState,
        mode: u8,
    },
    Mbc2 {
        banks: BankState,
    },
    Mbc3 {
        banks: BankState,
        rtc: Option<Rtc>,
        latch_pending: bool,
    },
    Mbc5 {
        banks: BankState,
    },
}

/// Where an external RAM access lands.
enum RamTarget {
    Storage(PhysicalAddress),
    Nibble(PhysicalAddress),
    Clock(u8),
    Disabled,
}

impl Mbc {
    fn from_header(header: &Header, now: i64) -> Result<Self, CartridgeError> {
        let banks = BankState::default();
        Ok(match header.cart_type {
            0x00 | 0x08 | 0x09 => Mbc::None,
            0x01..=0x03 => Mbc::Mbc1 { banks, mode: 0 },
            0x05 | 0x06 => Mbc::Mbc2 { banks },
            0x0F..=0x13 => Mbc::Mbc3 {
                banks,
                rtc: header.has_rtc().then(|| Rtc::new(now)),
                latch_pending: false,
            },
            0x19..=0x1E => Mbc::Mbc5 { banks },
            other => return Err(CartridgeError::UnsupportedMbc(other)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mbc::None => "ROM only",
            Mbc::Mbc1 { .. } => "MBC1",
            Mbc::Mbc2 { .. } => "MBC2",
            Mbc::Mbc3 { rtc: Some(_), .. } => "MBC3+RTC",
            Mbc::Mbc3 { .. } => "MBC3",
            Mbc::Mbc5 { .. } => "MBC5",
        }
    }

    pub fn banks(&self) -> BankState {
        match self {
            Mbc::None => BankState {
                rom_bank: 1,
                ram_bank: 0,
                xram_enabled: true,
            },
            Mbc::Mbc1 { banks, .. }
            | Mbc::Mbc2 { banks }
            | Mbc::Mbc3 { banks, .. }
            | Mbc::Mbc5 { banks } => *banks,
        }
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        match self {
            Mbc::Mbc3 { rtc, .. } => rtc.as_ref(),
            _ => None,
        }
    }

    fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match self {
            Mbc::Mbc3 { rtc, .. } => rtc.as_mut(),
            _ => None,
        }
    }

    /// Handle a write into the 0x0000-0x7FFF control region.
    pub fn control(&mut self, addr: Address16, data: u8) {
        let addr = addr.value();
        match self {
            Mbc::None => {}
            Mbc::Mbc1 { banks, mode } => match addr {
                0x0000..=0x1FFF => banks.xram_enabled = data & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    let bank = data & 0x1F;
                    banks.rom_bank = if bank == 0 { 1 } else { bank as u16 };
                }
                0x4000..=0x5FFF => banks.ram_bank = data & 0x03,
                _ => *mode = data & 0x01,
            },
            Mbc::Mbc2 { banks } => {
                // Address bit 8 selects RAM enable (clear) or ROM bank (set).
                if addr <= 0x3FFF {
                    if addr & 0x0100 == 0 {
                        banks.xram_enabled = data & 0x0F == 0x0A;
                    } else {
                        let bank = data & 0x0F;
                        banks.rom_bank = if bank == 0 { 1 } else { bank as u16 };
                    }
                }
            }
            Mbc::Mbc3 {
                banks,
                rtc,
                latch_pending,
            } => match addr {
                0x0000..=0x1FFF => banks.xram_enabled = data & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    let bank = data & 0x7F;
                    banks.rom_bank = if bank == 0 { 1 } else { bank as u16 };
                }
                0x4000..=0x5FFF => banks.ram_bank = data,
                _ => {
                    if data == 0x00 {
                        *latch_pending = true;
                    } else {
                        if data == 0x01 && *latch_pending {
                            if let Some(rtc) = rtc {
                                rtc.latch();
                            }
                        }
                        *latch_pending = false;
                    }
                }
            },
            Mbc::Mbc5 { banks } => match addr {
                0x0000..=0x1FFF => banks.xram_enabled = data & 0x0F == 0x0A,
                0x2000..=0x2FFF => {
                    banks.rom_bank = (banks.rom_bank & 0x100) | data as u16;
                    if banks.rom_bank == 0 {
                        banks.rom_bank = 1;
                    }
                }
                0x3000..=0x3FFF => {
                    banks.rom_bank = (banks.rom_bank & 0xFF) | (((data & 0x01) as u16) << 8);
                    if banks.rom_bank == 0 {
                        banks.rom_bank = 1;
                    }
                }
                0x4000..=0x5FFF => banks.ram_bank = data & 0x0F,
                _ => {}
            },
        }
    }
}

pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    header: Header,
    mbc: Mbc,
    save_path: Option<PathBuf>,
    rtc_path: Option<PathBuf>,
}

impl Cartridge {
    /// Build a cartridge from a ROM image already in memory. No save files
    /// are bound.
    pub fn from_bytes(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&rom)?;
        header.verify(&rom)?;
        let mbc = Mbc::from_header(&header, unix_now())?;
        let ram = vec![0; header.ram_size()];
        log::info!(
            "Loaded ROM: {} ({}, {} ROM banks, {} bytes RAM, CGB: {})",
            header.title,
            mbc.name(),
            (rom.len() / ROM_BANK_SIZE).max(1),
            ram.len(),
            if header.cgb_supported() { "yes" } else { "no" }
        );
        Ok(Self {
            rom,
            ram,
            header,
            mbc,
            save_path: None,
            rtc_path: None,
        })
    }

    /// Load a ROM file and, for battery-backed carts, the `.sav` and `.rtc`
    /// files next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let path = path.as_ref();
        let rom = fs::read(path).map_err(|source| CartridgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cart = Self::from_bytes(rom)?;

        if cart.header.has_battery() {
            let save = path.with_extension("sav");
            match fs::read(&save) {
                Ok(bytes) => {
                    for (d, s) in cart.ram.iter_mut().zip(bytes.iter()) {
                        *d = *s;
                    }
                    log::debug!("Loaded {} bytes of RAM from {}", bytes.len(), save.display());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to read {}: {e}", save.display()),
            }
            cart.save_path = Some(save);
        }

        if cart.header.has_rtc() {
            let rtc_path = path.with_extension("rtc");
            if let Ok(bytes) = fs::read(&rtc_path) {
                match Rtc::from_bytes(&bytes) {
                    Some(mut restored) => {
                        // Catch up on the time the cartridge spent on the shelf.
                        restored.sync_to(unix_now());
                        if let Mbc::Mbc3 { rtc, .. } = &mut cart.mbc {
                            *rtc = Some(restored);
                        }
                    }
                    None => log::warn!("Ignoring malformed RTC file {}", rtc_path.display()),
                }
            }
            cart.rtc_path = Some(rtc_path);
        }

        Ok(cart)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    pub fn cgb_supported(&self) -> bool {
        self.header.cgb_supported()
    }

    pub fn mbc(&self) -> &Mbc {
        &self.mbc
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    fn ram_bank_count(&self) -> usize {
        self.ram.len().div_ceil(RAM_BANK_SIZE)
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    /// Physical ROM offset for a CPU address in 0x0000-0x7FFF.
    pub fn resolve_rom(&self, addr: Address16) -> PhysicalAddress {
        let count = self.rom_bank_count();
        let (bank, offset) = if ROM_BANK0_RANGE.contains(addr.value()) {
            let bank = match &self.mbc {
                Mbc::Mbc1 { banks, mode: 1 } => (banks.ram_bank as usize & 0x03) << 5,
                _ => 0,
            };
            (bank, addr.offset_in(ROM_BANK0_RANGE))
        } else {
            let bank = match &self.mbc {
                Mbc::None => 1,
                Mbc::Mbc1 { banks, .. } => {
                    ((banks.ram_bank as usize & 0x03) << 5) | (banks.rom_bank as usize & 0x1F)
                }
                Mbc::Mbc2 { banks } => banks.rom_bank as usize & 0x0F,
                Mbc::Mbc3 { banks, .. } => banks.rom_bank as usize & 0x7F,
                Mbc::Mbc5 { banks } => banks.rom_bank as usize & 0x1FF,
            };
            (bank, addr.offset_in(ROM_BANKN_RANGE))
        };
        PhysicalAddress::banked(bank % count, ROM_BANK_SIZE, offset)
    }

    pub fn read_rom(&self, addr: Address16) -> u8 {
        let phys = self.resolve_rom(addr);
        self.rom.get(phys.0).copied().unwrap_or(0xFF)
    }

    /// Writes to ROM space program the bank controller.
    pub fn write_rom(&mut self, addr: Address16, data: u8) {
        self.mbc.control(addr, data);
        log::trace!("MBC control {addr} <- {data:02X}: {:?}", self.mbc.banks());
    }

    fn resolve_ram(&self, addr: Address16) -> RamTarget {
        let banks = self.mbc.banks();
        if !banks.xram_enabled {
            return RamTarget::Disabled;
        }
        let offset = addr.offset_in(XRAM_RANGE);
        if let Mbc::Mbc2 { .. } = self.mbc {
            return RamTarget::Nibble(PhysicalAddress(offset & (MBC2_RAM_SIZE - 1)));
        }
        if let Mbc::Mbc3 { rtc: Some(_), .. } = self.mbc {
            if (0x08..=0x0C).contains(&banks.ram_bank) {
                return RamTarget::Clock(banks.ram_bank);
            }
        }
        let count = self.ram_bank_count();
        if count == 0 {
            return RamTarget::Disabled;
        }
        let bank = match &self.mbc {
            Mbc::None => 0,
            Mbc::Mbc1 { banks, mode } => {
                if *mode == 1 {
                    banks.ram_bank as usize
                } else {
                    0
                }
            }
            Mbc::Mbc3 { banks, .. } => {
                if banks.ram_bank > 0x03 {
                    return RamTarget::Disabled;
                }
                banks.ram_bank as usize
            }
            Mbc::Mbc5 { banks } | Mbc::Mbc2 { banks } => banks.ram_bank as usize,
        };
        let phys = PhysicalAddress::banked(bank % count, RAM_BANK_SIZE, offset);
        if phys.0 < self.ram.len() {
            RamTarget::Storage(phys)
        } else {
            // 2 KiB carts mirror within the single partial bank.
            RamTarget::Storage(PhysicalAddress(phys.0 % self.ram.len()))
        }
    }

    pub fn read_ram(&self, addr: Address16) -> u8 {
        match self.resolve_ram(addr) {
            RamTarget::Storage(phys) => self.ram[phys.0],
            RamTarget::Nibble(phys) => 0xF0 | (self.ram[phys.0] & 0x0F),
            RamTarget::Clock(reg) => self.mbc.rtc().map(|r| r.read(reg)).unwrap_or(0xFF),
            RamTarget::Disabled => 0xFF,
        }
    }

    pub fn write_ram(&mut self, addr: Address16, data: u8) {
        match self.resolve_ram(addr) {
            RamTarget::Storage(phys) => self.ram[phys.0] = data,
            RamTarget::Nibble(phys) => self.ram[phys.0] = data & 0x0F,
            RamTarget::Clock(reg) => {
                if let Some(rtc) = self.mbc.rtc_mut() {
                    rtc.write(reg, data);
                }
            }
            RamTarget::Disabled => {}
        }
    }

    /// Advance the cartridge clock, if any, by emulated cycles.
    pub fn step_rtc(&mut self, cycles: u32) {
        if let Some(rtc) = self.mbc.rtc_mut() {
            rtc.step(cycles);
        }
    }

    /// Flush battery RAM and the RTC to their sibling files.
    pub fn save(&mut self) -> io::Result<()> {
        if let Some(path) = &self.save_path {
            if !self.ram.is_empty() {
                fs::write(path, &self.ram)?;
                log::debug!("Saved {} bytes of RAM to {}", self.ram.len(), path.display());
            }
        }
        if let Some(path) = &self.rtc_path {
            if let Some(rtc) = self.mbc.rtc_mut() {
                fs::write(path, rtc.to_bytes(unix_now()))?;
            }
        }
        Ok(())
    }
}

impl Drop for Cartridge {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            log::warn!("Failed to save cartridge RAM for {}: {e}", self.header.title);
        }
    }
}

impl std::fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cartridge")
            .field("title", &self.header.title)
            .field("mbc", &self.mbc)
            .field("rom_len", &self.rom.len())
            .field("ram_len", &self.ram.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_type(cart_type: u8, banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[CART_TYPE] = cart_type;
        rom[RAM_SIZE] = 0x03;
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE + 0x100] = bank as u8;
        }
        rom[HEADER_CHECKSUM] = Header::compute_checksum(&rom);
        rom
    }

    #[test]
    fn mbc1_upper_bits_select_high_rom_banks() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x01, 64)).unwrap();
        cart.write_rom(Address16(0x2000), 0x02);
        cart.write_rom(Address16(0x4000), 0x01);
        assert_eq!(cart.read_rom(Address16(0x4100)), 0x22);
        // Mode 0 keeps bank 0 fixed in the lower window.
        assert_eq!(cart.read_rom(Address16(0x0100)), 0x00);
        cart.write_rom(Address16(0x6000), 0x01);
        assert_eq!(cart.read_rom(Address16(0x0100)), 0x20);
    }

    #[test]
    fn mbc3_rtc_register_select_and_latch() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x10, 4)).unwrap();
        cart.write_rom(Address16(0x0000), 0x0A);
        cart.write_rom(Address16(0x4000), 0x09);
        cart.write_ram(Address16(0xA000), 42);
        assert_eq!(cart.read_ram(Address16(0xA000)), 42);

        cart.step_rtc(crate::CPU_CLOCK_HZ * 60);
        assert_eq!(cart.read_ram(Address16(0xA000)), 42);
        cart.write_rom(Address16(0x6000), 0x00);
        cart.write_rom(Address16(0x6000), 0x01);
        assert_eq!(cart.read_ram(Address16(0xA000)), 43);
    }

    #[test]
    fn latch_requires_zero_then_one() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x10, 4)).unwrap();
        cart.write_rom(Address16(0x0000), 0x0A);
        cart.write_rom(Address16(0x4000), 0x08);
        cart.step_rtc(crate::CPU_CLOCK_HZ * 2);
        cart.write_rom(Address16(0x6000), 0x01);
        assert_eq!(cart.read_ram(Address16(0xA000)), 0);
        cart.write_rom(Address16(0x6000), 0x00);
        cart.write_rom(Address16(0x6000), 0x01);
        assert_eq!(cart.read_ram(Address16(0xA000)), 2);
    }

    #[test]
    fn mbc5_nine_bit_rom_bank() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x19, 512)).unwrap();
        cart.write_rom(Address16(0x2000), 0x05);
        cart.write_rom(Address16(0x3000), 0x01);
        assert_eq!(cart.mbc().banks().rom_bank, 0x105);
        assert_eq!(cart.resolve_rom(Address16(0x4000)).0, 0x105 * ROM_BANK_SIZE);
    }
}
