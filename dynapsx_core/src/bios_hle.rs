// SPDX-License-Identifier: GPL-3.0
// bios_hle.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::cpu::r3051::R3051;
use crate::memory_map;
use log::debug;

/// Physical entry points of the BIOS A, B and C function tables. The
/// function number travels in r9.
const TABLE_A: u32 = 0xA0;
const TABLE_B: u32 = 0xB0;
const TABLE_C: u32 = 0xC0;

/// High-level replacements for a few BIOS calls, run by the dispatch loop
/// instead of the guest code at the table entry points. Only console output
/// is handled; everything else falls through to the real BIOS.
pub struct BiosHle {
    tty: String,
}

impl BiosHle {

    pub fn new() -> Self {
        BiosHle {
            tty: String::new(),
        }
    }

    /// True for addresses the dispatch loop checks before running code.
    /// Blocks there are never linked to or hashed.
    pub fn is_hooked(pc: u32) -> bool {
        matches!(memory_map::physical(pc), TABLE_A | TABLE_B | TABLE_C)
    }

    /// Runs the call at the CPU's PC if it has a replacement, returning to
    /// the caller through r31. Returns false when the guest code should run.
    pub fn intercept(&mut self, cpu: &mut R3051) -> bool {

        let function = cpu.gpr(9);
        let character = cpu.gpr(4);

        let result = match (memory_map::physical(cpu.pc()), function) {
            (TABLE_A, 0x3C) | (TABLE_B, 0x3B) => character,
            (TABLE_B, 0x3D) => 1,
            _ => return false,
        };

        self.put_char(character as u8);
        cpu.set_gpr(2, result);
        cpu.set_pc(cpu.gpr(31));
        true
    }

    fn put_char(&mut self, byte: u8) {
        if byte == b'\n' {
            let line = self.tty.rsplit('\n').next().unwrap_or_default();
            debug!("bios tty: {}", line);
        }
        self.tty.push(byte as char);
    }

    /// Everything printed through the hooked calls.
    pub fn tty(&self) -> &str {
        &self.tty
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn cpu_calling(pc: u32, function: u32, character: u8) -> R3051 {
        let mut cpu = R3051::new();
        cpu.set_pc(pc);
        cpu.set_gpr(9, function);
        cpu.set_gpr(4, character as u32);
        cpu.set_gpr(31, 0x8001_0040);
        cpu
    }

    #[test]
    fn intercept_should_print_and_return_to_the_caller() {

        // Given A(0x3C) reached through KSEG0, the character should be
        // collected and the CPU should be back at r31 with v0 = the character.
        let mut hle = BiosHle::new();
        let mut cpu = cpu_calling(0x8000_00A0, 0x3C, b'H');

        assert!(hle.intercept(&mut cpu));
        assert_eq!(hle.tty(), "H");
        assert_eq!(cpu.pc(), 0x8001_0040);
        assert_eq!(cpu.gpr(2), b'H' as u32);
    }

    #[test]
    fn b_3d_should_return_one() {

        let mut hle = BiosHle::new();
        let mut cpu = cpu_calling(0x0000_00B0, 0x3D, b'\n');

        assert!(hle.intercept(&mut cpu));
        assert_eq!(cpu.gpr(2), 1);
        assert_eq!(hle.tty(), "\n");
    }

    #[test]
    fn unhandled_functions_should_run_the_guest_code() {

        // Given C(0x00), nothing should change.
        let mut hle = BiosHle::new();
        let mut cpu = cpu_calling(0xA000_00C0, 0x00, b'x');

        assert!(!hle.intercept(&mut cpu));
        assert_eq!(cpu.pc(), 0xA000_00C0);
        assert!(hle.tty().is_empty());
        assert!(BiosHle::is_hooked(0xA000_00C0));
        assert!(!BiosHle::is_hooked(0x8000_00A4));
    }
}
