use crate::interrupts::{Interrupt, Interrupts};

pub const JOYP: u16 = 0xFF00;

const SELECT_DIRECTIONS: u8 = 0x10;
const SELECT_ACTIONS: u8 = 0x20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Key {
    /// Bit in the combined key mask. Directions occupy the low nibble and
    /// actions the high nibble, each in JOYP bit order.
    fn mask(self) -> u8 {
        match self {
            Key::Right => 0x01,
            Key::Left => 0x02,
            Key::Up => 0x04,
            Key::Down => 0x08,
            Key::A => 0x10,
            Key::B => 0x20,
            Key::Select => 0x40,
            Key::Start => 0x80,
        }
    }
}

pub struct Joypad {
    /// Active low: a cleared bit is a held key.
    keys: u8,
    /// JOYP bits 4-5 as last written.
    select: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            keys: 0xFF,
            select: 0x30,
        }
    }

    pub fn press(&mut self, key: Key, interrupts: &mut Interrupts) {
        self.keys &= !key.mask();
        interrupts.request(Interrupt::Joypad);
    }

    pub fn release(&mut self, key: Key) {
        self.keys |= key.mask();
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.keys & key.mask() == 0
    }

    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & SELECT_DIRECTIONS == 0 {
            low &= self.keys & 0x0F;
        }
        if self.select & SELECT_ACTIONS == 0 {
            low &= self.keys >> 4;
        }
        0xC0 | self.select | low
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}
