//! The instruction decoder.
//!
//! [`Instr`] is a pure view over a 16-bit machine word: decoding extracts the
//! opcode tag and its operand fields, sign-extending immediates and offsets
//! to 16 bits. Decoding is total: all 16 opcode encodings are defined, with
//! `RTI` (`0x8`) and the reserved encoding (`0xD`) decoding to inert
//! instructions, so [`Instr::decode`] never fails.

use crate::isa::{sext, CondCode, Operand, Reg};

/// A decoded LC-3 instruction.
///
/// Each variant carries the operand fields of its encoding, already
/// extracted and extended. Execution semantics live in the simulator;
/// this type is only the wire format.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Instr {
    /// A branch instruction (opcode `0x0`): condition mask and sign-extended PCoffset9.
    BR(CondCode, i16),
    /// An add instruction (opcode `0x1`): DR, SR1, and SR2 or imm5.
    ADD(Reg, Reg, Operand),
    /// A PC-relative load (opcode `0x2`): DR and sign-extended PCoffset9.
    LD(Reg, i16),
    /// A PC-relative store (opcode `0x3`): SR and sign-extended PCoffset9.
    ST(Reg, i16),
    /// A subroutine call (opcode `0x4`): PCoffset11 (`JSR`) or base register (`JSRR`).
    JSR(Operand),
    /// A bitwise AND (opcode `0x5`): DR, SR1, and SR2 or imm5.
    AND(Reg, Reg, Operand),
    /// A base+offset load (opcode `0x6`): DR, BaseR, and sign-extended offset6.
    LDR(Reg, Reg, i16),
    /// A base+offset store (opcode `0x7`): SR, BaseR, and sign-extended offset6.
    STR(Reg, Reg, i16),
    /// Return from interrupt (opcode `0x8`). Inert in this machine.
    RTI,
    /// A bitwise NOT (opcode `0x9`): DR and SR.
    NOT(Reg, Reg),
    /// An indirect load (opcode `0xA`): DR and sign-extended PCoffset9.
    LDI(Reg, i16),
    /// An indirect store (opcode `0xB`): SR and sign-extended PCoffset9.
    STI(Reg, i16),
    /// A register jump (opcode `0xC`): BaseR. `JMP R7` is the architectural `RET`.
    JMP(Reg),
    /// The reserved encoding (opcode `0xD`). Inert in this machine.
    Reserved,
    /// A load of an effective address (opcode `0xE`): DR and sign-extended PCoffset9.
    LEA(Reg, i16),
    /// A trap service call (opcode `0xF`): trapvect8.
    TRAP(u8),
}

impl Instr {
    /// Decodes a 16-bit machine word into an instruction.
    ///
    /// Every word decodes to something: register fields and the trap vector
    /// are masked to their widths, and the two inert opcodes decode to
    /// [`Instr::RTI`] and [`Instr::Reserved`].
    pub fn decode(word: u16) -> Self {
        match word >> 12 {
            0x0 => Instr::BR(cond_field(word), sext(word, 9)),
            0x1 => Instr::ADD(Reg::from_bits(word >> 9), Reg::from_bits(word >> 6), second_operand(word)),
            0x2 => Instr::LD(Reg::from_bits(word >> 9), sext(word, 9)),
            0x3 => Instr::ST(Reg::from_bits(word >> 9), sext(word, 9)),
            0x4 => {
                // Bit 11 selects PC-relative (JSR) over register (JSRR) mode.
                let target = match word & (1 << 11) != 0 {
                    true  => Operand::Imm(sext(word, 11)),
                    false => Operand::Reg(Reg::from_bits(word >> 6)),
                };
                Instr::JSR(target)
            },
            0x5 => Instr::AND(Reg::from_bits(word >> 9), Reg::from_bits(word >> 6), second_operand(word)),
            0x6 => Instr::LDR(Reg::from_bits(word >> 9), Reg::from_bits(word >> 6), sext(word, 6)),
            0x7 => Instr::STR(Reg::from_bits(word >> 9), Reg::from_bits(word >> 6), sext(word, 6)),
            0x8 => Instr::RTI,
            0x9 => Instr::NOT(Reg::from_bits(word >> 9), Reg::from_bits(word >> 6)),
            0xA => Instr::LDI(Reg::from_bits(word >> 9), sext(word, 9)),
            0xB => Instr::STI(Reg::from_bits(word >> 9), sext(word, 9)),
            0xC => Instr::JMP(Reg::from_bits(word >> 6)),
            0xD => Instr::Reserved,
            0xE => Instr::LEA(Reg::from_bits(word >> 9), sext(word, 9)),
            0xF => Instr::TRAP(word as u8),
            _   => unreachable!("opcode field is 4 bits"),
        }
    }
}

/// Extracts the n/z/p mask of a `BR` word.
fn cond_field(word: u16) -> CondCode {
    ((word >> 9) & 0b111) as u8
}

/// Extracts the second operand of `ADD`/`AND`: imm5 if bit 5 is set, else SR2.
fn second_operand(word: u16) -> Operand {
    match word & (1 << 5) != 0 {
        true  => Operand::Imm(sext(word, 5)),
        false => Operand::Reg(Reg::from_bits(word)),
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instr::BR(cc, off) => {
                write!(f, "BR")?;
                if cc & 0b100 != 0 { write!(f, "n")?; }
                if cc & 0b010 != 0 { write!(f, "z")?; }
                if cc & 0b001 != 0 { write!(f, "p")?; }
                write!(f, " #{off}")
            },
            Instr::ADD(dr, sr1, sr2)  => write!(f, "ADD {dr}, {sr1}, {sr2}"),
            Instr::LD(dr, off)        => write!(f, "LD {dr}, #{off}"),
            Instr::ST(sr, off)        => write!(f, "ST {sr}, #{off}"),
            Instr::JSR(Operand::Imm(off)) => write!(f, "JSR #{off}"),
            Instr::JSR(Operand::Reg(br))  => write!(f, "JSRR {br}"),
            Instr::AND(dr, sr1, sr2)  => write!(f, "AND {dr}, {sr1}, {sr2}"),
            Instr::LDR(dr, br, off)   => write!(f, "LDR {dr}, {br}, #{off}"),
            Instr::STR(sr, br, off)   => write!(f, "STR {sr}, {br}, #{off}"),
            Instr::RTI                => write!(f, "RTI"),
            Instr::NOT(dr, sr)        => write!(f, "NOT {dr}, {sr}"),
            Instr::LDI(dr, off)       => write!(f, "LDI {dr}, #{off}"),
            Instr::STI(sr, off)       => write!(f, "STI {sr}, #{off}"),
            Instr::JMP(Reg::R7)       => write!(f, "RET"),
            Instr::JMP(br)            => write!(f, "JMP {br}"),
            Instr::Reserved           => write!(f, ".RESERVED"),
            Instr::LEA(dr, off)       => write!(f, "LEA {dr}, #{off}"),
            Instr::TRAP(vect)         => write!(f, "TRAP x{vect:02X}"),
        }
    }
}
