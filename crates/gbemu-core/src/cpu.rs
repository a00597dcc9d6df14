mod cb;
pub mod table;

pub use table::{DecodedInstruction, OPCODES, OpcodeInfo, Operand, cb_cycles};

use crate::bus::Bus;
use crate::hardware::Model;
use crate::register::{Address8, Carried, Register8, Register16};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

/// Cost of dispatching an interrupt: two wait states, the PC push and the
/// jump.
pub const INTERRUPT_SERVICE_CYCLES: u32 = 20;
/// Cycles a halted CPU consumes per tick.
pub const HALT_TICK_CYCLES: u32 = 1;
const LOCKED_TICK_CYCLES: u32 = 4;

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;
const DMG_BOOT_AF: u16 = 0x01B0;
const DMG_BOOT_BC: u16 = 0x0013;
const DMG_BOOT_DE: u16 = 0x00D8;
const DMG_BOOT_HL: u16 = 0x014D;
const CGB_BOOT_AF: u16 = 0x1180;
const CGB_BOOT_BC: u16 = 0x0000;
const CGB_BOOT_DE: u16 = 0x0008;
const CGB_BOOT_HL: u16 = 0x007C;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    pub af: Register16,
    pub bc: Register16,
    pub de: Register16,
    pub hl: Register16,
    pub sp: Register16,
    pub pc: Register16,
}

impl Registers {
    pub fn post_boot(model: Model) -> Self {
        let (af, bc, de, hl) = match model {
            Model::Dmg => (DMG_BOOT_AF, DMG_BOOT_BC, DMG_BOOT_DE, DMG_BOOT_HL),
            Model::Cgb => (CGB_BOOT_AF, CGB_BOOT_BC, CGB_BOOT_DE, CGB_BOOT_HL),
        };
        Self {
            af: Register16::new(af),
            bc: Register16::new(bc),
            de: Register16::new(de),
            hl: Register16::new(hl),
            sp: Register16::new(BOOT_SP),
            pc: Register16::new(BOOT_PC),
        }
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.af.high.value()
    }

    #[inline]
    pub fn f(&self) -> u8 {
        self.af.low.value()
    }
}

pub struct Cpu {
    pub regs: Registers,
    pub ime: bool,
    pub halted: bool,
    /// Set by an illegal opcode; the CPU stops fetching until reset.
    locked: bool,
    /// HALT with IME clear and an interrupt already pending: the next opcode
    /// byte is fetched without advancing PC.
    halt_bug: bool,
    /// EI takes effect after the following instruction.
    ime_pending: bool,
    cycles: u64,
}

impl Cpu {
    /// CPU in the register state the boot ROM hands over at 0x0100.
    pub fn new(model: Model) -> Self {
        Self {
            regs: Registers::post_boot(model),
            ime: false,
            halted: false,
            locked: false,
            halt_bug: false,
            ime_pending: false,
            cycles: 0,
        }
    }

    pub fn pc(&self) -> u16 {
        self.regs.pc.value()
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Total cycles consumed since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{} BC:{} DE:{} HL:{} PC:{} SP:{} CY:{}",
            self.regs.af,
            self.regs.bc,
            self.regs.de,
            self.regs.hl,
            self.regs.pc,
            self.regs.sp,
            self.cycles
        )
    }

    /// Execute one instruction (or one halted cycle), then service at most
    /// one pending interrupt. Returns the cycles consumed.
    pub fn tick(&mut self, bus: &mut Bus) -> u32 {
        if self.locked {
            self.cycles += LOCKED_TICK_CYCLES as u64;
            return LOCKED_TICK_CYCLES;
        }

        let mut cycles = if self.halted {
            HALT_TICK_CYCLES
        } else {
            self.step(bus)
        };

        // Any requested and enabled interrupt ends HALT, even with IME clear.
        if self.halted && bus.interrupts.pending() != 0 {
            self.halted = false;
        }
        cycles += self.service_interrupt(bus);

        self.cycles += cycles as u64;
        cycles
    }

    fn service_interrupt(&mut self, bus: &mut Bus) -> u32 {
        if !self.ime {
            return 0;
        }
        let Some(interrupt) = bus.interrupts.highest_pending() else {
            return 0;
        };
        self.ime = false;
        bus.interrupts.clear(interrupt);
        let pc = self.pc();
        self.push(bus, pc);
        self.regs.pc.set(interrupt.vector());
        log::trace!("Servicing {interrupt:?} from {pc:04X}");
        INTERRUPT_SERVICE_CYCLES
    }

    fn fetch8(&mut self, bus: &mut Bus) -> u8 {
        let val = bus.read(self.pc());
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.regs.pc.increment();
        }
        val
    }

    fn fetch16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut Bus, val: u16) {
        let sp = self.regs.sp.decrement();
        bus.write(sp, (val >> 8) as u8);
        let sp = self.regs.sp.decrement();
        bus.write(sp, val as u8);
    }

    fn pop(&mut self, bus: &mut Bus) -> u16 {
        let lo = bus.read(self.regs.sp.value()) as u16;
        self.regs.sp.increment();
        let hi = bus.read(self.regs.sp.value()) as u16;
        self.regs.sp.increment();
        (hi << 8) | lo
    }

    #[inline]
    fn flag(&self, mask: u8) -> bool {
        self.regs.f() & mask != 0
    }

    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        let mut f = 0;
        if z {
            f |= FLAG_Z;
        }
        if n {
            f |= FLAG_N;
        }
        if h {
            f |= FLAG_H;
        }
        if c {
            f |= FLAG_C;
        }
        self.regs.af.low.set(f);
    }

    fn set_a(&mut self, val: u8) {
        self.regs.af.high.set(val);
    }

    /// Register by its 3-bit encoding: B C D E H L (HL) A.
    fn read_r(&mut self, bus: &mut Bus, index: u8) -> u8 {
        match index {
            0 => self.regs.bc.high.value(),
            1 => self.regs.bc.low.value(),
            2 => self.regs.de.high.value(),
            3 => self.regs.de.low.value(),
            4 => self.regs.hl.high.value(),
            5 => self.regs.hl.low.value(),
            6 => bus.read(self.regs.hl.value()),
            _ => self.regs.a(),
        }
    }

    fn write_r(&mut self, bus: &mut Bus, index: u8, val: u8) {
        match index {
            0 => self.regs.bc.high.set(val),
            1 => self.regs.bc.low.set(val),
            2 => self.regs.de.high.set(val),
            3 => self.regs.de.low.set(val),
            4 => self.regs.hl.high.set(val),
            5 => self.regs.hl.low.set(val),
            6 => bus.write(self.regs.hl.value(), val),
            _ => self.set_a(val),
        }
    }

    /// 16-bit register pair by its 2-bit encoding: BC DE HL SP.
    fn rr(&mut self, index: u8) -> &mut Register16 {
        match index {
            0 => &mut self.regs.bc,
            1 => &mut self.regs.de,
            2 => &mut self.regs.hl,
            _ => &mut self.regs.sp,
        }
    }

    /// Condition by its 2-bit encoding: NZ Z NC C.
    fn condition(&self, index: u8) -> bool {
        match index {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            _ => self.flag(FLAG_C),
        }
    }

    /// ADD/ADC/SUB/SBC/AND/XOR/OR/CP by the opcode's bits 3-5.
    fn alu(&mut self, op: u8, val: u8) {
        let a = Register8(self.regs.a());
        let carry = self.flag(FLAG_C);
        match op {
            0 | 1 => {
                let Carried {
                    result,
                    half_carry,
                    carry,
                } = a.add(val, op == 1 && carry);
                self.set_a(result);
                self.set_flags(result == 0, false, half_carry, carry);
            }
            2 | 3 | 7 => {
                let Carried {
                    result,
                    half_carry,
                    carry,
                } = a.sub(val, op == 3 && carry);
                if op != 7 {
                    self.set_a(result);
                }
                self.set_flags(result == 0, true, half_carry, carry);
            }
            4 => {
                let result = a.value() & val;
                self.set_a(result);
                self.set_flags(result == 0, false, true, false);
            }
            5 => {
                let result = a.value() ^ val;
                self.set_a(result);
                self.set_flags(result == 0, false, false, false);
            }
            _ => {
                let result = a.value() | val;
                self.set_a(result);
                self.set_flags(result == 0, false, false, false);
            }
        }
    }

    fn daa(&mut self) {
        let mut a = self.regs.a();
        let n = self.flag(FLAG_N);
        let h = self.flag(FLAG_H);
        let mut c = self.flag(FLAG_C);
        if !n {
            if c || a > 0x99 {
                a = a.wrapping_add(0x60);
                c = true;
            }
            if h || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if c {
                a = a.wrapping_sub(0x60);
            }
            if h {
                a = a.wrapping_sub(0x06);
            }
        }
        self.set_a(a);
        self.set_flags(a == 0, n, false, c);
    }

    fn jump_relative(&mut self, offset: u8) {
        let pc = self.pc().wrapping_add(offset as i8 as i16 as u16);
        self.regs.pc.set(pc);
    }

    fn call(&mut self, bus: &mut Bus, target: u16) {
        let ret = self.pc();
        self.push(bus, ret);
        self.regs.pc.set(target);
    }

    fn ret(&mut self, bus: &mut Bus) {
        let addr = self.pop(bus);
        self.regs.pc.set(addr);
    }

    fn enter_halt(&mut self, bus: &Bus) {
        if !self.ime && bus.interrupts.pending() != 0 {
            // HALT is skipped and the following byte is read twice.
            self.halt_bug = true;
        } else {
            self.halted = true;
        }
    }

    /// Fetch and execute a single instruction.
    fn step(&mut self, bus: &mut Bus) -> u32 {
        if self.ime_pending {
            self.ime_pending = false;
            self.ime = true;
        }

        let addr = self.pc();
        let opcode = self.fetch8(bus);
        let info = &OPCODES[opcode as usize];
        let operand = match info.length {
            2 => Operand::U8(self.fetch8(bus)),
            3 => Operand::U16(self.fetch16(bus)),
            _ => Operand::None,
        };

        #[cfg(feature = "debugger")]
        if let Some(listener) = bus.debugger.as_mut() {
            listener.on_instruction(addr, info, operand);
        }

        if info.is_illegal() {
            log::error!("Illegal opcode {opcode:02X} at {addr:04X}; CPU locked");
            self.locked = true;
            return info.cycles as u32;
        }

        if opcode == 0xCB {
            let cb = operand.byte();
            self.execute_cb(bus, cb);
            return cb_cycles(cb);
        }

        if self.execute(bus, opcode, operand) {
            info.cycles as u32
        } else {
            info.cycles_not_taken as u32
        }
    }

    /// Returns false when a conditional branch was not taken.
    fn execute(&mut self, bus: &mut Bus, opcode: u8, operand: Operand) -> bool {
        let d8 = operand.byte();
        let d16 = operand.word();
        match opcode {
            0x00 => {}
            // LD rr,d16
            0x01 | 0x11 | 0x21 | 0x31 => self.rr(opcode >> 4).set(d16),
            0x02 => bus.write(self.regs.bc.value(), self.regs.a()),
            0x12 => bus.write(self.regs.de.value(), self.regs.a()),
            0x22 => {
                let addr = self.regs.hl.value();
                bus.write(addr, self.regs.a());
                self.regs.hl.increment();
            }
            0x32 => {
                let addr = self.regs.hl.value();
                bus.write(addr, self.regs.a());
                self.regs.hl.decrement();
            }
            0x0A => {
                let val = bus.read(self.regs.bc.value());
                self.set_a(val);
            }
            0x1A => {
                let val = bus.read(self.regs.de.value());
                self.set_a(val);
            }
            0x2A => {
                let val = bus.read(self.regs.hl.value());
                self.set_a(val);
                self.regs.hl.increment();
            }
            0x3A => {
                let val = bus.read(self.regs.hl.value());
                self.set_a(val);
                self.regs.hl.decrement();
            }
            // INC rr / DEC rr
            0x03 | 0x13 | 0x23 | 0x33 => {
                self.rr(opcode >> 4).increment();
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.rr(opcode >> 4).decrement();
            }
            // INC r / DEC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = (opcode >> 3) & 0x07;
                let res = Register8(self.read_r(bus, r)).increment();
                self.write_r(bus, r, res.result);
                let c = self.flag(FLAG_C);
                self.set_flags(res.result == 0, false, res.half_carry, c);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = (opcode >> 3) & 0x07;
                let res = Register8(self.read_r(bus, r)).decrement();
                self.write_r(bus, r, res.result);
                let c = self.flag(FLAG_C);
                self.set_flags(res.result == 0, true, res.half_carry, c);
            }
            // LD r,d8
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                self.write_r(bus, (opcode >> 3) & 0x07, d8);
            }
            0x07 => {
                let a = self.regs.a();
                self.set_a(a.rotate_left(1));
                self.set_flags(false, false, false, a & 0x80 != 0);
            }
            0x0F => {
                let a = self.regs.a();
                self.set_a(a.rotate_right(1));
                self.set_flags(false, false, false, a & 0x01 != 0);
            }
            0x17 => {
                let a = self.regs.a();
                let carry_in = self.flag(FLAG_C) as u8;
                self.set_a((a << 1) | carry_in);
                self.set_flags(false, false, false, a & 0x80 != 0);
            }
            0x1F => {
                let a = self.regs.a();
                let carry_in = self.flag(FLAG_C) as u8;
                self.set_a((a >> 1) | (carry_in << 7));
                self.set_flags(false, false, false, a & 0x01 != 0);
            }
            0x08 => bus.write_word(d16, self.regs.sp.value()),
            // ADD HL,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let rhs = self.rr(opcode >> 4).value();
                let res = self.regs.hl.add(rhs);
                self.regs.hl.set(res.result);
                let z = self.flag(FLAG_Z);
                self.set_flags(z, false, res.half_carry, res.carry);
            }
            0x10 => {
                // No speed switch or low-power mode: STOP behaves as HALT.
                log::debug!("STOP at {:04X} treated as HALT", self.pc().wrapping_sub(2));
                self.enter_halt(bus);
            }
            0x18 => self.jump_relative(d8),
            0x20 | 0x28 | 0x30 | 0x38 => {
                if !self.condition((opcode >> 3) & 0x03) {
                    return false;
                }
                self.jump_relative(d8);
            }
            0x27 => self.daa(),
            0x2F => {
                let a = self.regs.a();
                self.set_a(!a);
                let (z, c) = (self.flag(FLAG_Z), self.flag(FLAG_C));
                self.set_flags(z, true, true, c);
            }
            0x37 => {
                let z = self.flag(FLAG_Z);
                self.set_flags(z, false, false, true);
            }
            0x3F => {
                let (z, c) = (self.flag(FLAG_Z), self.flag(FLAG_C));
                self.set_flags(z, false, false, !c);
            }
            0x76 => self.enter_halt(bus),
            // LD r,r'
            0x40..=0x7F => {
                let val = self.read_r(bus, opcode & 0x07);
                self.write_r(bus, (opcode >> 3) & 0x07, val);
            }
            // ALU A,r
            0x80..=0xBF => {
                let val = self.read_r(bus, opcode & 0x07);
                self.alu((opcode >> 3) & 0x07, val);
            }
            // ALU A,d8
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                self.alu((opcode >> 3) & 0x07, d8);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if !self.condition((opcode >> 3) & 0x03) {
                    return false;
                }
                self.ret(bus);
            }
            0xC9 => self.ret(bus),
            0xD9 => {
                self.ret(bus);
                self.ime = true;
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                if !self.condition((opcode >> 3) & 0x03) {
                    return false;
                }
                self.regs.pc.set(d16);
            }
            0xC3 => self.regs.pc.set(d16),
            0xE9 => {
                let hl = self.regs.hl.value();
                self.regs.pc.set(hl);
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                if !self.condition((opcode >> 3) & 0x03) {
                    return false;
                }
                self.call(bus, d16);
            }
            0xCD => self.call(bus, d16),
            // RST n
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.call(bus, (opcode & 0x38) as u16);
            }
            // POP / PUSH
            0xC1 | 0xD1 | 0xE1 => {
                let val = self.pop(bus);
                self.rr((opcode >> 4) & 0x03).set(val);
            }
            0xF1 => {
                // The low nibble of F is hardwired to zero.
                let val = self.pop(bus) & 0xFFF0;
                self.regs.af.set(val);
            }
            0xC5 | 0xD5 | 0xE5 => {
                let val = self.rr((opcode >> 4) & 0x03).value();
                self.push(bus, val);
            }
            0xF5 => {
                let val = self.regs.af.value();
                self.push(bus, val);
            }
            0xE0 => bus.write(Address8(d8).to_high_page().value(), self.regs.a()),
            0xF0 => {
                let val = bus.read(Address8(d8).to_high_page().value());
                self.set_a(val);
            }
            0xE2 => {
                let addr = Address8(self.regs.bc.low.value()).to_high_page();
                bus.write(addr.value(), self.regs.a());
            }
            0xF2 => {
                let addr = Address8(self.regs.bc.low.value()).to_high_page();
                let val = bus.read(addr.value());
                self.set_a(val);
            }
            0xEA => bus.write(d16, self.regs.a()),
            0xFA => {
                let val = bus.read(d16);
                self.set_a(val);
            }
            0xE8 => {
                let res = self.regs.sp.add_signed(d8 as i8);
                self.regs.sp.set(res.result);
                self.set_flags(false, false, res.half_carry, res.carry);
            }
            0xF8 => {
                let res = self.regs.sp.add_signed(d8 as i8);
                self.regs.hl.set(res.result);
                self.set_flags(false, false, res.half_carry, res.carry);
            }
            0xF9 => {
                let hl = self.regs.hl.value();
                self.regs.sp.set(hl);
            }
            0xF3 => {
                self.ime = false;
                self.ime_pending = false;
            }
            0xFB => self.ime_pending = true,
            // Illegal opcodes and the CB prefix are handled before dispatch.
            _ => {}
        }
        true
    }
}
