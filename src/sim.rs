//! Executing LC-3 machine code.
//!
//! This module is focused on executing loaded object images (i.e., [`Image`]).
//!
//! This module consists of:
//! - [`Simulator`]: the struct that executes machine code.
//! - [`mem`]: the module handling memory and the register file.
//! - [`io`]: the module handling host IO.
//!
//! [`Image`]: crate::loader::Image

pub mod io;
pub mod mem;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::isa::instr::Instr;
use crate::isa::{CondCode, Operand, Reg, CC_N, CC_P, CC_Z};
use crate::loader::Image;

use self::io::{IODevice, SimIO};
use self::mem::{Mem, RegFile};

/// Where execution begins, regardless of an image's origin.
pub const PC_START: u16 = 0x3000;

/// Errors that can occur during execution.
///
/// There is no recovery: any of these unwinds to the top of the run loop
/// and stops the machine.
#[derive(Debug)]
pub enum SimErr {
    /// A `TRAP` was executed with a vector outside the service range
    /// (`0x20..=0x25`). The offending vector is carried for reporting.
    IllegalTrapVect(u8),
    /// A trap routine failed to read or write the host terminal.
    Io(std::io::Error),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::IllegalTrapVect(vect) => write!(f, "illegal trap vector x{vect:02X}"),
            SimErr::Io(e) => write!(f, "host IO error: {e}"),
        }
    }
}
impl std::error::Error for SimErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimErr::IllegalTrapVect(_) => None,
            SimErr::Io(e) => Some(e),
        }
    }
}
impl From<std::io::Error> for SimErr {
    fn from(value: std::io::Error) -> Self {
        SimErr::Io(value)
    }
}

/// Executes machine code.
///
/// A `Simulator` is a plain value holding the whole machine: memory, the
/// register file, PC, the condition register, and the running flag. Two
/// simulators in two tests never share state.
#[derive(Debug)]
pub struct Simulator {
    /// The simulator's memory.
    ///
    /// Note that this is held in the heap, as it is too large for the stack.
    pub mem: Mem,

    /// The simulator's register file.
    pub reg_file: RegFile,

    /// The program counter.
    ///
    /// Between instructions this is the address of the next fetch. Fetch
    /// increments it before dispatch, so PC-relative operands are measured
    /// from the already-incremented value.
    pub pc: u16,

    /// The condition register. Always exactly one of N, Z, P.
    cc: CondCode,

    /// The number of instructions successfully run since this `Simulator` was initialized.
    ///
    /// This can be set to 0 to reset the counter.
    pub instructions_run: u64,

    /// Machine control. If unset, the program stops.
    ///
    /// This is publicly accessible via a reference through [`Simulator::mcr`].
    mcr: Arc<AtomicBool>,
}

impl Simulator {
    /// Creates a machine in its initial state: zeroed memory and registers,
    /// COND = Z, PC = `0x3000`, no IO attached.
    pub fn new() -> Self {
        Self {
            mem: Mem::new(),
            reg_file: RegFile::new(),
            pc: PC_START,
            cc: CC_Z,
            instructions_run: 0,
            mcr: Arc::default(),
        }
    }

    /// Sets the IO handler.
    pub fn open_io<IO: Into<SimIO>>(&mut self, io: IO) {
        self.mem.io = io.into();
    }

    /// Detaches the IO handler.
    pub fn close_io(&mut self) {
        self.open_io(io::EmptyIO)
    }

    /// Resets the machine to its initial state: zeroed memory and registers,
    /// COND = Z, PC = [`PC_START`], instruction counter at 0.
    ///
    /// The IO handler and the MCR reference are preserved (anything holding
    /// a clone of the MCR can still control the machine). Loaded images are
    /// not reloaded.
    pub fn reset(&mut self) {
        let io = std::mem::take(&mut self.mem.io);
        self.mem = Mem::new();
        self.mem.io = io;
        self.reg_file = RegFile::new();
        self.pc = PC_START;
        self.cc = CC_Z;
        self.instructions_run = 0;
    }

    /// Loads an object image into memory at its origin.
    ///
    /// This only touches the image's window; PC stays at [`PC_START`].
    pub fn load_image(&mut self, image: &Image) {
        self.mem.copy_block(image.origin(), image.words());
        debug!(
            "loaded {} words at x{:04X}",
            image.words().len(),
            image.origin()
        );
    }

    /// Reads the condition register. The result is exactly one of
    /// [`CC_N`], [`CC_Z`], [`CC_P`].
    pub fn cc(&self) -> CondCode {
        // Not mutable: every write goes through set_cc, which keeps the
        // one-flag-set invariant.
        self.cc
    }

    /// Gets a reference to the MCR (the running flag).
    ///
    /// Storing `false` from any thread stops the machine after the current
    /// instruction. The `HALT` trap does exactly that.
    pub fn mcr(&self) -> &Arc<AtomicBool> {
        // The mcr field is not exposed because that allows someone to swap it
        // with another AtomicBool, making any clone held elsewhere
        // inconsistent with the machine's own flag.
        &self.mcr
    }

    /// Sets the condition codes using the provided result.
    fn set_cc(&mut self, result: u16) {
        self.cc = match (result as i16).cmp(&0) {
            std::cmp::Ordering::Less    => CC_N,
            std::cmp::Ordering::Equal   => CC_Z,
            std::cmp::Ordering::Greater => CC_P,
        };
    }

    /// Runs until the tripwire condition returns false (or any of the typical breaks occur).
    ///
    /// The typical break conditions are:
    /// - `HALT` is executed
    /// - the MCR is set to false
    /// - an error is raised (illegal trap vector, host IO failure)
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> Result<(), SimErr> {
        use std::sync::atomic::Ordering;

        self.mcr.store(true, Ordering::Relaxed);

        let result = 'outer: {
            while self.mcr.load(Ordering::Relaxed) && tripwire(self) {
                match self.step() {
                    Ok(()) => {}
                    Err(e) => break 'outer Err(e),
                }
            }

            Ok(())
        };

        self.mcr.store(false, Ordering::Release);
        result
    }

    /// Execute the program.
    pub fn run(&mut self) -> Result<(), SimErr> {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), SimErr> {
        let i = self.instructions_run;
        self.run_while(|sim| sim.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Simulate one step, executing one instruction.
    ///
    /// The fetch goes through [`Mem::read`], so it triggers the keyboard
    /// side effect if PC happens to sit on the status register (pathological
    /// but permitted).
    pub fn step(&mut self) -> Result<(), SimErr> {
        let at = self.pc;
        let word = self.mem.read(self.pc);
        self.pc = self.pc.wrapping_add(1);

        let instr = Instr::decode(word);
        trace!("x{at:04X}: {instr}");

        match instr {
            Instr::BR(cc, off) => {
                if cc & self.cc != 0 {
                    self.pc = self.pc.wrapping_add_signed(off);
                }
            },
            Instr::ADD(dr, sr1, sr2) => {
                let val1 = self.reg_file[sr1];
                let val2 = match sr2 {
                    Operand::Imm(imm) => imm as u16,
                    Operand::Reg(r2)  => self.reg_file[r2],
                };

                let result = val1.wrapping_add(val2);
                self.reg_file[dr] = result;
                self.set_cc(result);
            },
            Instr::LD(dr, off) => {
                let ea = self.pc.wrapping_add_signed(off);
                let val = self.mem.read(ea);
                self.reg_file[dr] = val;
                self.set_cc(val);
            },
            Instr::ST(sr, off) => {
                let ea = self.pc.wrapping_add_signed(off);
                self.mem.write(ea, self.reg_file[sr]);
            },
            Instr::JSR(target) => {
                // Linkage is captured first; a JSRR through R7 therefore
                // jumps to the just-written return address.
                self.reg_file[Reg::R7] = self.pc;
                self.pc = match target {
                    Operand::Imm(off) => self.pc.wrapping_add_signed(off),
                    Operand::Reg(br)  => self.reg_file[br],
                };
            },
            Instr::AND(dr, sr1, sr2) => {
                let val1 = self.reg_file[sr1];
                let val2 = match sr2 {
                    Operand::Imm(imm) => imm as u16,
                    Operand::Reg(r2)  => self.reg_file[r2],
                };

                let result = val1 & val2;
                self.reg_file[dr] = result;
                self.set_cc(result);
            },
            Instr::LDR(dr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off);
                let val = self.mem.read(ea);
                self.reg_file[dr] = val;
                self.set_cc(val);
            },
            Instr::STR(sr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off);
                self.mem.write(ea, self.reg_file[sr]);
            },
            // Inert: this machine has no supervisor mode to return from,
            // and the reserved encoding is defined to do nothing.
            Instr::RTI | Instr::Reserved => {},
            Instr::NOT(dr, sr) => {
                let result = !self.reg_file[sr];
                self.reg_file[dr] = result;
                self.set_cc(result);
            },
            Instr::LDI(dr, off) => {
                let ptr = self.pc.wrapping_add_signed(off);
                let ea = self.mem.read(ptr);
                let val = self.mem.read(ea);
                self.reg_file[dr] = val;
                self.set_cc(val);
            },
            Instr::STI(sr, off) => {
                let ptr = self.pc.wrapping_add_signed(off);
                let ea = self.mem.read(ptr);
                self.mem.write(ea, self.reg_file[sr]);
            },
            Instr::JMP(br) => {
                self.pc = self.reg_file[br];
            },
            Instr::LEA(dr, off) => {
                let ea = self.pc.wrapping_add_signed(off);
                self.reg_file[dr] = ea;
                self.set_cc(ea);
            },
            Instr::TRAP(vect) => {
                // Linkage for programs that save/restore R7 around traps.
                // The routines below return via normal control flow, so PC
                // is left pointing at the instruction after the TRAP.
                self.reg_file[Reg::R7] = self.pc;
                self.trap(vect)?;
            },
        }

        self.instructions_run = self.instructions_run.wrapping_add(1);
        Ok(())
    }

    /// Executes a trap service routine.
    ///
    /// Vectors outside `0x20..=0x25` are a fatal error.
    fn trap(&mut self, vect: u8) -> Result<(), SimErr> {
        match vect {
            // GETC: one character, no echo.
            0x20 => {
                let byte = self.mem.io.read_key()?;
                self.reg_file[Reg::R0] = u16::from(byte);
                self.set_cc(self.reg_file[Reg::R0]);
            },
            // OUT
            0x21 => {
                self.mem.io.write_byte(self.reg_file[Reg::R0] as u8)?;
            },
            // PUTS: one character per word, NUL-terminated.
            0x22 => {
                let mut addr = self.reg_file[Reg::R0];
                loop {
                    let word = self.mem.read(addr);
                    if word == 0 {
                        break;
                    }
                    self.mem.io.write_byte(word as u8)?;
                    addr = addr.wrapping_add(1);
                }
            },
            // IN: prompt, read, echo.
            0x23 => {
                for byte in *b"Enter a character: " {
                    self.mem.io.write_byte(byte)?;
                }
                let byte = self.mem.io.read_key()?;
                self.mem.io.write_byte(byte)?;
                self.reg_file[Reg::R0] = u16::from(byte);
                self.set_cc(self.reg_file[Reg::R0]);
            },
            // PUTSP: two characters per word, low byte first. A zero high
            // byte mid-string is not emitted.
            0x24 => {
                let mut addr = self.reg_file[Reg::R0];
                loop {
                    let word = self.mem.read(addr);
                    if word == 0 {
                        break;
                    }
                    self.mem.io.write_byte(word as u8)?;
                    let high = (word >> 8) as u8;
                    if high != 0 {
                        self.mem.io.write_byte(high)?;
                    }
                    addr = addr.wrapping_add(1);
                }
            },
            // HALT
            0x25 => {
                for byte in *b"HALT\n" {
                    self.mem.io.write_byte(byte)?;
                }
                debug!("machine halted after {} instructions", self.instructions_run + 1);
                self.mcr.store(false, std::sync::atomic::Ordering::Relaxed);
            },
            _ => return Err(SimErr::IllegalTrapVect(vect)),
        }
        Ok(())
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::io::BufferedIO;
    use super::*;
    use crate::isa::Reg::{R0, R1, R2, R3, R7};

    /// A machine with R0=5, R1=10, R2=15, PC=0, COND=Z.
    fn seeded() -> Simulator {
        let mut sim = Simulator::new();
        sim.pc = 0;
        sim.reg_file[R0] = 5;
        sim.reg_file[R1] = 10;
        sim.reg_file[R2] = 15;
        sim
    }

    /// Places `word` at `sim.pc` and executes it.
    fn exec(sim: &mut Simulator, word: u16) {
        *sim.mem.get_raw_mut(sim.pc) = word;
        sim.step().unwrap();
    }


    #[test]
    fn test_add_immediate() {
        let mut sim = seeded();
        exec(&mut sim, 0b0001_001_001_1_00111); // ADD R1, R1, #7
        assert_eq!(sim.reg_file[R1], 17);
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_add_register() {
        let mut sim = seeded();
        exec(&mut sim, 0b0001_000_000_0_00_010); // ADD R0, R0, R2
        assert_eq!(sim.reg_file[R0], 20);
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_and_register() {
        let mut sim = seeded();
        exec(&mut sim, 0b0101_001_001_0_00_010); // AND R1, R1, R2
        assert_eq!(sim.reg_file[R1], 10 & 15);
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_and_immediate() {
        let mut sim = seeded();
        exec(&mut sim, 0b0101_000_000_1_01111); // AND R0, R0, #15
        assert_eq!(sim.reg_file[R0], 5);
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_add_zero_is_identity() {
        let mut sim = seeded();
        sim.reg_file[R2] = 0x8000;
        exec(&mut sim, 0b0001_011_010_1_00000); // ADD R3, R2, #0
        assert_eq!(sim.reg_file[R3], 0x8000);
        assert_eq!(sim.cc(), CC_N);
    }

    #[test]
    fn test_and_zero_clears() {
        let mut sim = seeded();
        exec(&mut sim, 0b0101_001_001_1_00000); // AND R1, R1, #0
        assert_eq!(sim.reg_file[R1], 0);
        assert_eq!(sim.cc(), CC_Z);
    }

    #[test]
    fn test_arithmetic_wraps() {
        let mut sim = seeded();
        sim.reg_file[R0] = 0xFFFF;
        exec(&mut sim, 0b0001_000_000_1_00001); // ADD R0, R0, #1
        assert_eq!(sim.reg_file[R0], 0);
        assert_eq!(sim.cc(), CC_Z);

        sim.reg_file[R1] = 0;
        exec(&mut sim, 0b0001_001_001_1_11111); // ADD R1, R1, #-1
        assert_eq!(sim.reg_file[R1], 0xFFFF);
        assert_eq!(sim.cc(), CC_N);
    }

    #[test]
    fn test_br_taken_from_post_increment_pc() {
        let mut sim = seeded();
        exec(&mut sim, 0b0000_111_000001001); // BRnzp #9
        assert_eq!(sim.pc, 10);
    }

    #[test]
    fn test_br_zero_mask_is_noop() {
        for cc_setter in [0b0001_001_001_1_00111u16, 0b0101_001_001_1_00000] {
            let mut sim = seeded();
            exec(&mut sim, cc_setter); // leave COND at P or Z
            let before = sim.pc;
            exec(&mut sim, 0b0000_000_000001001); // BR (mask 0) #9
            assert_eq!(sim.pc, before.wrapping_add(1));
        }
    }

    #[test]
    fn test_br_never_updates_cond() {
        let mut sim = seeded();
        exec(&mut sim, 0b0001_001_001_1_00111); // COND <- P
        exec(&mut sim, 0b0000_100_000000001); // BRn #1, not taken
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_br_offset_zero_is_noop() {
        let mut sim = seeded();
        exec(&mut sim, 0b0000_111_000000000); // BRnzp #0
        assert_eq!(sim.pc, 1);
    }

    #[test]
    fn test_jmp() {
        let mut sim = seeded();
        exec(&mut sim, 0b1100_000_010_000000); // JMP R2
        assert_eq!(sim.pc, 15);
    }

    #[test]
    fn test_ld() {
        let mut sim = seeded();
        *sim.mem.get_raw_mut(15) = 42;
        exec(&mut sim, 0b0010_000_000001110); // LD R0, #14
        assert_eq!(sim.reg_file[R0], 42);
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_ldi() {
        let mut sim = seeded();
        *sim.mem.get_raw_mut(2) = 0x1234;
        *sim.mem.get_raw_mut(0x1234) = 10;
        exec(&mut sim, 0b1010_000_000000001); // LDI R0, #1
        assert_eq!(sim.reg_file[R0], 10);
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_not() {
        let mut sim = seeded();
        exec(&mut sim, 0b1001_000_010_111111); // NOT R0, R2
        assert_eq!(sim.reg_file[R0], 0xFFF0);
        assert_eq!(sim.cc(), CC_N);
    }

    #[test]
    fn test_not_involution() {
        let mut sim = seeded();
        sim.reg_file[R2] = 0x1234;
        exec(&mut sim, 0b1001_000_010_111111); // NOT R0, R2
        exec(&mut sim, 0b1001_000_000_111111); // NOT R0, R0
        assert_eq!(sim.reg_file[R0], 0x1234);
        assert_eq!(sim.cc(), CC_P);
    }

    #[test]
    fn test_st_ld_roundtrip() {
        let mut sim = seeded();
        exec(&mut sim, 0b0011_010_000010000); // ST R2, #16
        assert_eq!(sim.mem.get_raw(17), 15);
        exec(&mut sim, 0b0010_011_000001111); // LD R3, #15
        assert_eq!(sim.reg_file[R3], 15);
    }

    #[test]
    fn test_sti_str() {
        let mut sim = seeded();
        *sim.mem.get_raw_mut(3) = 0x5000;
        exec(&mut sim, 0b1011_001_000000010); // STI R1, #2
        assert_eq!(sim.mem.get_raw(0x5000), 10);

        sim.reg_file[R3] = 0x6000;
        exec(&mut sim, 0b0111_010_011_111111); // STR R2, R3, #-1
        assert_eq!(sim.mem.get_raw(0x5FFF), 15);
    }

    #[test]
    fn test_lea_then_ldr_equals_ld() {
        let mut sim = seeded();
        *sim.mem.get_raw_mut(0x20) = 0x0BEE;

        sim.pc = 0;
        exec(&mut sim, 0b1110_001_000011111); // LEA R1, #31
        assert_eq!(sim.reg_file[R1], 0x20);
        assert_eq!(sim.cc(), CC_P);
        exec(&mut sim, 0b0110_010_001_000000); // LDR R2, R1, #0

        let mut direct = seeded();
        *direct.mem.get_raw_mut(0x20) = 0x0BEE;
        exec(&mut direct, 0b0010_011_000011111); // LD R3, #31

        assert_eq!(sim.reg_file[R2], direct.reg_file[R3]);
        assert_eq!(sim.cc(), direct.cc());
    }

    #[test]
    fn test_jsr_then_ret_resumes_after_call() {
        let mut sim = Simulator::new();
        // x3000: JSR #2 -> x3003; x3003: RET -> x3001
        exec(&mut sim, 0b0100_1_00000000010);
        assert_eq!(sim.pc, 0x3003);
        assert_eq!(sim.reg_file[R7], 0x3001);
        exec(&mut sim, 0b1100_000_111_000000); // JMP R7
        assert_eq!(sim.pc, 0x3001);
    }

    #[test]
    fn test_jsrr() {
        let mut sim = Simulator::new();
        sim.reg_file[R2] = 0x4000;
        exec(&mut sim, 0b0100_0_00_010_000000); // JSRR R2
        assert_eq!(sim.pc, 0x4000);
        assert_eq!(sim.reg_file[R7], 0x3001);
    }

    #[test]
    fn test_jsrr_r7_jumps_to_linkage() {
        // The linkage write lands before the target register is read.
        let mut sim = Simulator::new();
        sim.reg_file[R7] = 0x4000;
        exec(&mut sim, 0b0100_0_00_111_000000); // JSRR R7
        assert_eq!(sim.reg_file[R7], 0x3001);
        assert_eq!(sim.pc, 0x3001);
    }

    #[test]
    fn test_pc_fetch_wraps() {
        let mut sim = Simulator::new();
        sim.pc = 0xFFFF;
        exec(&mut sim, 0b0001_000_000_1_00000); // ADD R0, R0, #0
        assert_eq!(sim.pc, 0);
    }

    #[test]
    fn test_rti_and_reserved_are_inert() {
        for word in [0x8000u16, 0xD000] {
            let mut sim = seeded();
            exec(&mut sim, word);
            assert_eq!(sim.pc, 1);
            assert_eq!(sim.reg_file[R0], 5);
            assert_eq!(sim.cc(), CC_Z);
        }
    }

    #[test]
    fn test_trap_getc() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        io.push_input([b'A']);
        sim.open_io(io.clone());

        exec(&mut sim, 0xF020);
        assert_eq!(sim.reg_file[R0], 0x41);
        assert_eq!(sim.cc(), CC_P);
        assert_eq!(sim.reg_file[R7], 0x3001);
        // No echo.
        assert!(io.output().is_empty());
    }

    #[test]
    fn test_trap_out() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        sim.open_io(io.clone());
        sim.reg_file[R0] = u16::from(b'Z');

        exec(&mut sim, 0xF021);
        assert_eq!(io.output(), b"Z");
    }

    #[test]
    fn test_trap_puts() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        sim.open_io(io.clone());

        let msg = b"Hello, world!";
        for (i, &b) in msg.iter().enumerate() {
            *sim.mem.get_raw_mut(0x4000 + i as u16) = u16::from(b);
        }
        sim.reg_file[R0] = 0x4000;

        exec(&mut sim, 0xF022);
        assert_eq!(io.output(), msg);
    }

    #[test]
    fn test_trap_puts_empty_string() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        sim.open_io(io.clone());
        sim.reg_file[R0] = 0x4000; // M[0x4000] is 0

        exec(&mut sim, 0xF022);
        assert!(io.output().is_empty());
    }

    #[test]
    fn test_trap_in_prompts_and_echoes() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        io.push_input([b'k']);
        sim.open_io(io.clone());

        exec(&mut sim, 0xF023);
        assert_eq!(sim.reg_file[R0], u16::from(b'k'));
        assert_eq!(sim.cc(), CC_P);
        assert_eq!(io.output(), b"Enter a character: k");
    }

    #[test]
    fn test_trap_putsp_packs_two_chars_per_word() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        sim.open_io(io.clone());

        // "ab" packed, then "c" with a zero high byte, then the terminator.
        *sim.mem.get_raw_mut(0x4000) = u16::from_le_bytes([b'a', b'b']);
        *sim.mem.get_raw_mut(0x4001) = u16::from(b'c');
        sim.reg_file[R0] = 0x4000;

        exec(&mut sim, 0xF024);
        assert_eq!(io.output(), b"abc");
    }

    #[test]
    fn test_trap_halt_stops_the_machine() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        sim.open_io(io.clone());
        *sim.mem.get_raw_mut(0x3000) = 0xF025;

        sim.run().unwrap();
        assert_eq!(io.output(), b"HALT\n");
        assert_eq!(sim.instructions_run, 1);
        assert!(!sim.mcr().load(std::sync::atomic::Ordering::Relaxed));
    }

    #[test]
    fn test_trap_illegal_vector_is_fatal() {
        let mut sim = Simulator::new();
        *sim.mem.get_raw_mut(sim.pc) = 0xF026;
        let err = sim.step().unwrap_err();
        assert!(matches!(err, SimErr::IllegalTrapVect(0x26)));
        assert_eq!(err.to_string(), "illegal trap vector x26");
    }

    #[test]
    fn test_getc_without_input_is_fatal() {
        let mut sim = Simulator::new();
        *sim.mem.get_raw_mut(sim.pc) = 0xF020;
        assert!(matches!(sim.step().unwrap_err(), SimErr::Io(_)));
    }

    #[test]
    fn test_reset_preserves_io_and_mcr() {
        let mut sim = Simulator::new();
        let io = BufferedIO::new();
        sim.open_io(io.clone());
        let mcr = Arc::clone(sim.mcr());

        *sim.mem.get_raw_mut(0x3000) = 0xF025; // HALT
        sim.run().unwrap();

        sim.reset();
        assert_eq!(sim.pc, PC_START);
        assert_eq!(sim.cc(), CC_Z);
        assert_eq!(sim.instructions_run, 0);
        assert_eq!(sim.mem.get_raw(0x3000), 0);
        assert!(Arc::ptr_eq(&mcr, sim.mcr()));

        // The buffered device is still attached.
        sim.reg_file[R0] = u16::from(b'!');
        *sim.mem.get_raw_mut(sim.pc) = 0xF021; // OUT
        sim.step().unwrap();
        assert_eq!(io.output(), b"HALT\n!");
    }

    #[test]
    fn test_run_with_limit_bounds_a_spin_loop() {
        let mut sim = Simulator::new();
        *sim.mem.get_raw_mut(0x3000) = 0b0000_111_111111110; // BRnzp #-2 (self)
        sim.run_with_limit(10).unwrap();
        assert_eq!(sim.instructions_run, 10);
    }
}
