//! Static opcode metadata: mnemonic, encoded length and cycle cost.

use std::fmt;

/// Per-opcode facts for the unprefixed instruction set. Cycle counts are
/// T-cycles; `cycles_not_taken` only differs for conditional control flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Operand placeholders: `d8`/`d16` immediates, `a8`/`a16` addresses,
    /// `r8` signed displacement.
    pub mnemonic: &'static str,
    pub length: u8,
    pub cycles: u8,
    pub cycles_not_taken: u8,
}

const fn op(mnemonic: &'static str, length: u8, cycles: u8) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        length,
        cycles,
        cycles_not_taken: cycles,
    }
}

const fn branch(mnemonic: &'static str, length: u8, taken: u8, not_taken: u8) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        length,
        cycles: taken,
        cycles_not_taken: not_taken,
    }
}

const fn illegal() -> OpcodeInfo {
    op("ILLEGAL", 1, 4)
}

impl OpcodeInfo {
    pub fn is_illegal(&self) -> bool {
        self.mnemonic == "ILLEGAL"
    }
}

#[rustfmt::skip]
pub static OPCODES: [OpcodeInfo; 256] = [
    // 0x00
    op("NOP", 1, 4), op("LD BC,d16", 3, 12), op("LD (BC),A", 1, 8), op("INC BC", 1, 8),
    op("INC B", 1, 4), op("DEC B", 1, 4), op("LD B,d8", 2, 8), op("RLCA", 1, 4),
    op("LD (a16),SP", 3, 20), op("ADD HL,BC", 1, 8), op("LD A,(BC)", 1, 8), op("DEC BC", 1, 8),
    op("INC C", 1, 4), op("DEC C", 1, 4), op("LD C,d8", 2, 8), op("RRCA", 1, 4),
    // 0x10
    op("STOP", 2, 4), op("LD DE,d16", 3, 12), op("LD (DE),A", 1, 8), op("INC DE", 1, 8),
    op("INC D", 1, 4), op("DEC D", 1, 4), op("LD D,d8", 2, 8), op("RLA", 1, 4),
    op("JR r8", 2, 12), op("ADD HL,DE", 1, 8), op("LD A,(DE)", 1, 8), op("DEC DE", 1, 8),
    op("INC E", 1, 4), op("DEC E", 1, 4), op("LD E,d8", 2, 8), op("RRA", 1, 4),
    // 0x20
    branch("JR NZ,r8", 2, 12, 8), op("LD HL,d16", 3, 12), op("LD (HL+),A", 1, 8), op("INC HL", 1, 8),
    op("INC H", 1, 4), op("DEC H", 1, 4), op("LD H,d8", 2, 8), op("DAA", 1, 4),
    branch("JR Z,r8", 2, 12, 8), op("ADD HL,HL", 1, 8), op("LD A,(HL+)", 1, 8), op("DEC HL", 1, 8),
    op("INC L", 1, 4), op("DEC L", 1, 4), op("LD L,d8", 2, 8), op("CPL", 1, 4),
    // 0x30
    branch("JR NC,r8", 2, 12, 8), op("LD SP,d16", 3, 12), op("LD (HL-),A", 1, 8), op("INC SP", 1, 8),
    op("INC (HL)", 1, 12), op("DEC (HL)", 1, 12), op("LD (HL),d8", 2, 12), op("SCF", 1, 4),
    branch("JR C,r8", 2, 12, 8), op("ADD HL,SP", 1, 8), op("LD A,(HL-)", 1, 8), op("DEC SP", 1, 8),
    op("INC A", 1, 4), op("DEC A", 1, 4), op("LD A,d8", 2, 8), op("CCF", 1, 4),
    // 0x40
    op("LD B,B", 1, 4), op("LD B,C", 1, 4), op("LD B,D", 1, 4), op("LD B,E", 1, 4),
    op("LD B,H", 1, 4), op("LD B,L", 1, 4), op("LD B,(HL)", 1, 8), op("LD B,A", 1, 4),
    op("LD C,B", 1, 4), op("LD C,C", 1, 4), op("LD C,D", 1, 4), op("LD C,E", 1, 4),
    op("LD C,H", 1, 4), op("LD C,L", 1, 4), op("LD C,(HL)", 1, 8), op("LD C,A", 1, 4),
    // 0x50
    op("LD D,B", 1, 4), op("LD D,C", 1, 4), op("LD D,D", 1, 4), op("LD D,E", 1, 4),
    op("LD D,H", 1, 4), op("LD D,L", 1, 4), op("LD D,(HL)", 1, 8), op("LD D,A", 1, 4),
    op("LD E,B", 1, 4), op("LD E,C", 1, 4), op("LD E,D", 1, 4), op("LD E,E", 1, 4),
    op("LD E,H", 1, 4), op("LD E,L", 1, 4), op("LD E,(HL)", 1, 8), op("LD E,A", 1, 4),
    // 0x60
    op("LD H,B", 1, 4), op("LD H,C", 1, 4), op("LD H,D", 1, 4), op("LD H,E", 1, 4),
    op("LD H,H", 1, 4), op("LD H,L", 1, 4), op("LD H,(HL)", 1, 8), op("LD H,A", 1, 4),
    op("LD L,B", 1, 4), op("LD L,C", 1, 4), op("LD L,D", 1, 4), op("LD L,E", 1, 4),
    op("LD L,H", 1, 4), op("LD L,L", 1, 4), op("LD L,(HL)", 1, 8), op("LD L,A", 1, 4),
    // 0x70
    op("LD (HL),B", 1, 8), op("LD (HL),C", 1, 8), op("LD (HL),D", 1, 8), op("LD (HL),E", 1, 8),
    op("LD (HL),H", 1, 8), op("LD (HL),L", 1, 8), op("HALT", 1, 4), op("LD (HL),A", 1, 8),
    op("LD A,B", 1, 4), op("LD A,C", 1, 4), op("LD A,D", 1, 4), op("LD A,E", 1, 4),
    op("LD A,H", 1, 4), op("LD A,L", 1, 4), op("LD A,(HL)", 1, 8), op("LD A,A", 1, 4),
    // 0x80
    op("ADD A,B", 1, 4), op("ADD A,C", 1, 4), op("ADD A,D", 1, 4), op("ADD A,E", 1, 4),
    op("ADD A,H", 1, 4), op("ADD A,L", 1, 4), op("ADD A,(HL)", 1, 8), op("ADD A,A", 1, 4),
    op("ADC A,B", 1, 4), op("ADC A,C", 1, 4), op("ADC A,D", 1, 4), op("ADC A,E", 1, 4),
    op("ADC A,H", 1, 4), op("ADC A,L", 1, 4), op("ADC A,(HL)", 1, 8), op("ADC A,A", 1, 4),
    // 0x90
    op("SUB B", 1, 4), op("SUB C", 1, 4), op("SUB D", 1, 4), op("SUB E", 1, 4),
    op("SUB H", 1, 4), op("SUB L", 1, 4), op("SUB (HL)", 1, 8), op("SUB A", 1, 4),
    op("SBC A,B", 1, 4), op("SBC A,C", 1, 4), op("SBC A,D", 1, 4), op("SBC A,E", 1, 4),
    op("SBC A,H", 1, 4), op("SBC A,L", 1, 4), op("SBC A,(HL)", 1, 8), op("SBC A,A", 1, 4),
    // 0xA0
    op("AND B", 1, 4), op("AND C", 1, 4), op("AND D", 1, 4), op("AND E", 1, 4),
    op("AND H", 1, 4), op("AND L", 1, 4), op("AND (HL)", 1, 8), op("AND A", 1, 4),
    op("XOR B", 1, 4), op("XOR C", 1, 4), op("XOR D", 1, 4), op("XOR E", 1, 4),
    op("XOR H", 1, 4), op("XOR L", 1, 4), op("XOR (HL)", 1, 8), op("XOR A", 1, 4),
    // 0xB0
    op("OR B", 1, 4), op("OR C", 1, 4), op("OR D", 1, 4), op("OR E", 1, 4),
    op("OR H", 1, 4), op("OR L", 1, 4), op("OR (HL)", 1, 8), op("OR A", 1, 4),
    op("CP B", 1, 4), op("CP C", 1, 4), op("CP D", 1, 4), op("CP E", 1, 4),
    op("CP H", 1, 4), op("CP L", 1, 4), op("CP (HL)", 1, 8), op("CP A", 1, 4),
    // 0xC0
    branch("RET NZ", 1, 20, 8), op("POP BC", 1, 12), branch("JP NZ,a16", 3, 16, 12), op("JP a16", 3, 16),
    branch("CALL NZ,a16", 3, 24, 12), op("PUSH BC", 1, 16), op("ADD A,d8", 2, 8), op("RST 00H", 1, 16),
    branch("RET Z", 1, 20, 8), op("RET", 1, 16), branch("JP Z,a16", 3, 16, 12), op("PREFIX CB", 2, 4),
    branch("CALL Z,a16", 3, 24, 12), op("CALL a16", 3, 24), op("ADC A,d8", 2, 8), op("RST 08H", 1, 16),
    // 0xD0
    branch("RET NC", 1, 20, 8), op("POP DE", 1, 12), branch("JP NC,a16", 3, 16, 12), illegal(),
    branch("CALL NC,a16", 3, 24, 12), op("PUSH DE", 1, 16), op("SUB d8", 2, 8), op("RST 10H", 1, 16),
    branch("RET C", 1, 20, 8), op("RETI", 1, 16), branch("JP C,a16", 3, 16, 12), illegal(),
    branch("CALL C,a16", 3, 24, 12), illegal(), op("SBC A,d8", 2, 8), op("RST 18H", 1, 16),
    // 0xE0
    op("LDH (a8),A", 2, 12), op("POP HL", 1, 12), op("LD (C),A", 1, 8), illegal(),
    illegal(), op("PUSH HL", 1, 16), op("AND d8", 2, 8), op("RST 20H", 1, 16),
    op("ADD SP,r8", 2, 16), op("JP (HL)", 1, 4), op("LD (a16),A", 3, 16), illegal(),
    illegal(), illegal(), op("XOR d8", 2, 8), op("RST 28H", 1, 16),
    // 0xF0
    op("LDH A,(a8)", 2, 12), op("POP AF", 1, 12), op("LD A,(C)", 1, 8), op("DI", 1, 4),
    illegal(), op("PUSH AF", 1, 16), op("OR d8", 2, 8), op("RST 30H", 1, 16),
    op("LD HL,SP+r8", 2, 12), op("LD SP,HL", 1, 8), op("LD A,(a16)", 3, 16), op("EI", 1, 4),
    illegal(), illegal(), op("CP d8", 2, 8), op("RST 38H", 1, 16),
];

const CB_OPS: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SWAP", "SRL"];
const CB_BIT_OPS: [&str; 3] = ["BIT", "RES", "SET"];
pub(crate) const REGISTER_NAMES: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];

/// Total cost of a CB-prefixed instruction, prefix fetch included.
pub fn cb_cycles(opcode: u8) -> u32 {
    let uses_hl = opcode & 0x07 == 6;
    match (uses_hl, opcode) {
        (false, _) => 8,
        (true, 0x40..=0x7F) => 12,
        (true, _) => 16,
    }
}

/// Immediate bytes following an opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    U8(u8),
    U16(u16),
}

impl Operand {
    pub fn byte(self) -> u8 {
        match self {
            Operand::U8(v) => v,
            Operand::U16(v) => v as u8,
            Operand::None => 0,
        }
    }

    pub fn word(self) -> u16 {
        match self {
            Operand::U16(v) => v,
            Operand::U8(v) => v as u16,
            Operand::None => 0,
        }
    }
}

/// An opcode with its operand, as fetched. `Display` renders assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub opcode: u8,
    pub info: &'static OpcodeInfo,
    pub operand: Operand,
}

impl DecodedInstruction {
    pub fn new(opcode: u8, operand: Operand) -> Self {
        Self {
            opcode,
            info: &OPCODES[opcode as usize],
            operand,
        }
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode == 0xCB {
            let cb = self.operand.byte();
            let reg = REGISTER_NAMES[(cb & 0x07) as usize];
            return match cb >> 6 {
                0 => write!(f, "{} {reg}", CB_OPS[(cb >> 3) as usize]),
                n => write!(
                    f,
                    "{} {},{reg}",
                    CB_BIT_OPS[n as usize - 1],
                    (cb >> 3) & 0x07
                ),
            };
        }
        let m = self.info.mnemonic;
        let text = match self.operand {
            Operand::None => m.to_string(),
            // STOP's padding byte is not part of the assembly.
            Operand::U8(_) if self.opcode == 0x10 => m.to_string(),
            Operand::U8(v) if m.contains("r8") => {
                let d = v as i8;
                let sign = if d < 0 { '-' } else { '+' };
                m.replace("r8", &format!("{sign}${:02X}", d.unsigned_abs()))
            }
            Operand::U8(v) if m.contains("a8") => m.replace("a8", &format!("$FF{v:02X}")),
            Operand::U8(v) => m.replace("d8", &format!("${v:02X}")),
            Operand::U16(v) => m
                .replace("d16", &format!("${v:04X}"))
                .replace("a16", &format!("${v:04X}")),
        };
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_match_placeholders() {
        for (i, info) in OPCODES.iter().enumerate() {
            let m = info.mnemonic;
            let expected = if m.contains("16") {
                3
            } else if m.contains("8") && !m.starts_with("RST") || i == 0x10 || i == 0xCB {
                2
            } else {
                1
            };
            assert_eq!(info.length, expected, "opcode {i:02X} {m}");
        }
    }

    #[test]
    fn illegal_opcodes() {
        let illegal: Vec<usize> = OPCODES
            .iter()
            .enumerate()
            .filter(|(_, info)| info.is_illegal())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(
            illegal,
            vec![0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD]
        );
    }

    #[test]
    fn only_conditionals_have_short_path() {
        for info in OPCODES.iter() {
            let mut parts = info.mnemonic.split([' ', ',']);
            let conditional = matches!(parts.next(), Some("JR" | "JP" | "CALL" | "RET"))
                && matches!(parts.next(), Some("NZ" | "Z" | "NC" | "C"));
            let differs = info.cycles != info.cycles_not_taken;
            assert_eq!(conditional, differs, "{}", info.mnemonic);
        }
    }

    #[test]
    fn cb_costs() {
        assert_eq!(cb_cycles(0x00), 8);
        assert_eq!(cb_cycles(0x06), 16);
        assert_eq!(cb_cycles(0x46), 12);
        assert_eq!(cb_cycles(0xC6), 16);
    }

    #[test]
    fn disassembly() {
        assert_eq!(
            DecodedInstruction::new(0xC3, Operand::U16(0x0150)).to_string(),
            "JP $0150"
        );
        assert_eq!(
            DecodedInstruction::new(0x20, Operand::U8(0xFE)).to_string(),
            "JR NZ,-$02"
        );
        assert_eq!(
            DecodedInstruction::new(0xE0, Operand::U8(0x40)).to_string(),
            "LDH ($FF40),A"
        );
        assert_eq!(
            DecodedInstruction::new(0xCB, Operand::U8(0x7C)).to_string(),
            "BIT 7,H"
        );
        assert_eq!(
            DecodedInstruction::new(0xCB, Operand::U8(0x37)).to_string(),
            "SWAP A"
        );
    }
}
