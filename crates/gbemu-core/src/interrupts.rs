/// Interrupt sources, valued by their bit in IE/IF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Interrupt {
    VBlank = 0x01,
    LcdStat = 0x02,
    Timer = 0x04,
    Serial = 0x08,
    Joypad = 0x10,
}

impl Interrupt {
    /// Highest priority first.
    pub const PRIORITY: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    #[inline]
    pub fn bit(self) -> u8 {
        self as u8
    }

    /// Fixed service routine address (gbdev.io/pandocs/Interrupts.html).
    pub fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x40,
            Interrupt::LcdStat => 0x48,
            Interrupt::Timer => 0x50,
            Interrupt::Serial => 0x58,
            Interrupt::Joypad => 0x60,
        }
    }
}

pub const IF_ADDR: u16 = 0xFF0F;
pub const IE_ADDR: u16 = 0xFFFF;

/// The requested-flags (IF) and enable-mask (IE) bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interrupts {
    pub flags: u8,
    pub enable: u8,
}

impl Interrupts {
    pub fn new() -> Self {
        Self {
            flags: 0x01,
            enable: 0x00,
        }
    }

    #[inline]
    pub fn request(&mut self, interrupt: Interrupt) {
        self.flags |= interrupt.bit();
    }

    #[inline]
    pub fn clear(&mut self, interrupt: Interrupt) {
        self.flags &= !interrupt.bit();
    }

    /// Requested and enabled bits.
    #[inline]
    pub fn pending(&self) -> u8 {
        self.flags & self.enable & 0x1F
    }

    /// The single highest-priority interrupt that is both requested and
    /// enabled.
    pub fn highest_pending(&self) -> Option<Interrupt> {
        let pending = self.pending();
        Interrupt::PRIORITY
            .into_iter()
            .find(|i| pending & i.bit() != 0)
    }

    pub fn read_flags(&self) -> u8 {
        self.flags | 0xE0
    }

    pub fn write_flags(&mut self, value: u8) {
        self.flags = value & 0x1F;
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}
