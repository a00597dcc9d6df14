//! CB-prefixed rotate, shift and bit instructions.

use super::{Cpu, FLAG_C};
use crate::bus::Bus;

impl Cpu {
    pub(super) fn execute_cb(&mut self, bus: &mut Bus, opcode: u8) {
        let r = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;
        let val = self.read_r(bus, r);

        match opcode >> 6 {
            // BIT n,r
            1 => {
                let c = self.flag(FLAG_C);
                self.set_flags(val & (1 << bit) == 0, false, true, c);
            }
            // RES n,r
            2 => self.write_r(bus, r, val & !(1 << bit)),
            // SET n,r
            3 => self.write_r(bus, r, val | (1 << bit)),
            _ => {
                let carry_in = self.flag(FLAG_C) as u8;
                let (res, carry) = match bit {
                    0 => (val.rotate_left(1), val & 0x80 != 0),
                    1 => (val.rotate_right(1), val & 0x01 != 0),
                    2 => ((val << 1) | carry_in, val & 0x80 != 0),
                    3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
                    4 => (val << 1, val & 0x80 != 0),
                    5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
                    6 => (val.rotate_left(4), false),
                    _ => (val >> 1, val & 0x01 != 0),
                };
                self.write_r(bus, r, res);
                self.set_flags(res == 0, false, false, carry);
            }
        }
    }
}

