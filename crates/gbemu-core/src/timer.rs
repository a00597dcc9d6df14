use crate::interrupts::{Interrupt, Interrupts};

pub const DIV: u16 = 0xFF04;
pub const TIMA: u16 = 0xFF05;
pub const TMA: u16 = 0xFF06;
pub const TAC: u16 = 0xFF07;

pub const REGISTERS: [u16; 4] = [DIV, TIMA, TMA, TAC];

const TAC_ENABLE: u8 = 0x04;

pub struct Timer {
    /// 16-bit internal divider. DIV is the upper byte, so it increments every
    /// 256 cycles.
    div: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    last_signal: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
        }
    }

    /// Divider phase the boot ROM leaves behind when it hands over at 0x0100.
    pub fn apply_boot_state(&mut self, cgb: bool) {
        self.div = if cgb { 0x1EA0 } else { 0xABCC };
        self.last_signal = Self::signal_with(self.div, self.tac);
    }

    pub fn div(&self) -> u8 {
        (self.div >> 8) as u8
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            DIV => self.div(),
            TIMA => self.tima,
            TMA => self.tma,
            TAC => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, interrupts: &mut Interrupts) {
        match addr {
            DIV => self.set_div(0, interrupts),
            TIMA => self.tima = val,
            TMA => self.tma = val,
            TAC => {
                self.tac = val & 0x07;
                self.update_signal(interrupts);
            }
            _ => {}
        }
    }

    /// Advance by `cycles` CPU cycles, incrementing TIMA on each falling edge
    /// of the selected divider bit.
    pub fn step(&mut self, cycles: u32, interrupts: &mut Interrupts) {
        for _ in 0..cycles {
            self.set_div(self.div.wrapping_add(1), interrupts);
        }
    }

    fn set_div(&mut self, div: u16, interrupts: &mut Interrupts) {
        self.div = div;
        self.update_signal(interrupts);
    }

    fn update_signal(&mut self, interrupts: &mut Interrupts) {
        let signal = Self::signal_with(self.div, self.tac);
        if self.last_signal && !signal {
            self.increment(interrupts);
        }
        self.last_signal = signal;
    }

    fn increment(&mut self, interrupts: &mut Interrupts) {
        if self.tima == 0xFF {
            self.tima = self.tma;
            interrupts.request(Interrupt::Timer);
        } else {
            self.tima += 1;
        }
    }

    /// Divider bit feeding TIMA: 4096, 262144, 65536, 16384 Hz for TAC 0-3.
    fn timer_bit_with(div: u16, tac: u8) -> u16 {
        match tac & 0x03 {
            0x00 => (div >> 9) & 1,
            0x01 => (div >> 3) & 1,
            0x02 => (div >> 5) & 1,
            _ => (div >> 7) & 1,
        }
    }

    fn signal_with(div: u16, tac: u8) -> bool {
        tac & TAC_ENABLE != 0 && Self::timer_bit_with(div, tac) != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
