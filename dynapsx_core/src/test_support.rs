// SPDX-License-Identifier: GPL-3.0
// test_support.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

// Shared helpers for the unit tests: a tiny R3000A assembler and a machine
// with a program already in RAM.

use crate::config::DynarecConfig;
use crate::dynarec::analysis::{self, BlockPlan};
use crate::machine::PsxMachine;

/// Where test programs are placed.
pub const PROGRAM_BASE: u32 = 0x8001_0000;

/// Instruction encoders. Register arguments are guest register numbers and
/// branch offsets are in instructions, relative to the delay slot.
pub mod asm {

    fn r_type(rs: u32, rt: u32, rd: u32, shamt: u32, funct: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | (shamt << 6) | funct
    }

    fn i_type(opcode: u32, rs: u32, rt: u32, imm: i32) -> u32 {
        (opcode << 26) | (rs << 21) | (rt << 16) | (imm as u32 & 0xFFFF)
    }

    pub fn nop() -> u32 { 0 }
    pub fn sll(rd: u32, rt: u32, shamt: u32) -> u32 { r_type(0, rt, rd, shamt, 0x00) }
    pub fn srl(rd: u32, rt: u32, shamt: u32) -> u32 { r_type(0, rt, rd, shamt, 0x02) }
    pub fn sra(rd: u32, rt: u32, shamt: u32) -> u32 { r_type(0, rt, rd, shamt, 0x03) }
    pub fn sllv(rd: u32, rt: u32, rs: u32) -> u32 { r_type(rs, rt, rd, 0, 0x04) }
    pub fn srav(rd: u32, rt: u32, rs: u32) -> u32 { r_type(rs, rt, rd, 0, 0x07) }
    pub fn jr(rs: u32) -> u32 { r_type(rs, 0, 0, 0, 0x08) }
    pub fn jalr(rd: u32, rs: u32) -> u32 { r_type(rs, 0, rd, 0, 0x09) }
    pub fn syscall() -> u32 { 0x0000_000C }
    pub fn brk() -> u32 { 0x0000_000D }
    pub fn mfhi(rd: u32) -> u32 { r_type(0, 0, rd, 0, 0x10) }
    pub fn mflo(rd: u32) -> u32 { r_type(0, 0, rd, 0, 0x12) }
    pub fn mult(rs: u32, rt: u32) -> u32 { r_type(rs, rt, 0, 0, 0x18) }
    pub fn multu(rs: u32, rt: u32) -> u32 { r_type(rs, rt, 0, 0, 0x19) }
    pub fn div(rs: u32, rt: u32) -> u32 { r_type(rs, rt, 0, 0, 0x1A) }
    pub fn divu(rs: u32, rt: u32) -> u32 { r_type(rs, rt, 0, 0, 0x1B) }
    pub fn add(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x20) }
    pub fn addu(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x21) }
    pub fn sub(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x22) }
    pub fn subu(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x23) }
    pub fn and(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x24) }
    pub fn or(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x25) }
    pub fn xor(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x26) }
    pub fn nor(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x27) }
    pub fn slt(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x2A) }
    pub fn sltu(rd: u32, rs: u32, rt: u32) -> u32 { r_type(rs, rt, rd, 0, 0x2B) }

    pub fn bltz(rs: u32, offset: i32) -> u32 { i_type(0x01, rs, 0x00, offset) }
    pub fn bgez(rs: u32, offset: i32) -> u32 { i_type(0x01, rs, 0x01, offset) }
    pub fn bltzal(rs: u32, offset: i32) -> u32 { i_type(0x01, rs, 0x10, offset) }
    pub fn bgezal(rs: u32, offset: i32) -> u32 { i_type(0x01, rs, 0x11, offset) }
    pub fn j(target: u32) -> u32 { (0x02 << 26) | ((target >> 2) & 0x03FF_FFFF) }
    pub fn jal(target: u32) -> u32 { (0x03 << 26) | ((target >> 2) & 0x03FF_FFFF) }
    pub fn beq(rs: u32, rt: u32, offset: i32) -> u32 { i_type(0x04, rs, rt, offset) }
    pub fn bne(rs: u32, rt: u32, offset: i32) -> u32 { i_type(0x05, rs, rt, offset) }
    pub fn blez(rs: u32, offset: i32) -> u32 { i_type(0x06, rs, 0, offset) }
    pub fn bgtz(rs: u32, offset: i32) -> u32 { i_type(0x07, rs, 0, offset) }
    pub fn addi(rt: u32, rs: u32, imm: i32) -> u32 { i_type(0x08, rs, rt, imm) }
    pub fn addiu(rt: u32, rs: u32, imm: i32) -> u32 { i_type(0x09, rs, rt, imm) }
    pub fn slti(rt: u32, rs: u32, imm: i32) -> u32 { i_type(0x0A, rs, rt, imm) }
    pub fn sltiu(rt: u32, rs: u32, imm: i32) -> u32 { i_type(0x0B, rs, rt, imm) }
    pub fn andi(rt: u32, rs: u32, imm: u32) -> u32 { i_type(0x0C, rs, rt, imm as i32) }
    pub fn ori(rt: u32, rs: u32, imm: u32) -> u32 { i_type(0x0D, rs, rt, imm as i32) }
    pub fn xori(rt: u32, rs: u32, imm: u32) -> u32 { i_type(0x0E, rs, rt, imm as i32) }
    pub fn lui(rt: u32, imm: u32) -> u32 { i_type(0x0F, 0, rt, imm as i32) }

    pub fn mfc0(rt: u32, rd: u32) -> u32 { (0x10 << 26) | (rt << 16) | (rd << 11) }
    pub fn mtc0(rt: u32, rd: u32) -> u32 { (0x10 << 26) | (0x04 << 21) | (rt << 16) | (rd << 11) }
    pub fn rfe() -> u32 { 0x4200_0010 }
    pub fn mfc2(rt: u32, rd: u32) -> u32 { (0x12 << 26) | (rt << 16) | (rd << 11) }
    pub fn cfc2(rt: u32, rd: u32) -> u32 { (0x12 << 26) | (0x02 << 21) | (rt << 16) | (rd << 11) }
    pub fn mtc2(rt: u32, rd: u32) -> u32 { (0x12 << 26) | (0x04 << 21) | (rt << 16) | (rd << 11) }
    pub fn ctc2(rt: u32, rd: u32) -> u32 { (0x12 << 26) | (0x06 << 21) | (rt << 16) | (rd << 11) }
    pub fn cop2(command: u32) -> u32 { (0x12 << 26) | (1 << 25) | (command & 0x01FF_FFFF) }
    pub fn cop1() -> u32 { 0x11 << 26 }

    pub fn lb(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x20, base, rt, offset) }
    pub fn lh(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x21, base, rt, offset) }
    pub fn lwl(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x22, base, rt, offset) }
    pub fn lw(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x23, base, rt, offset) }
    pub fn lbu(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x24, base, rt, offset) }
    pub fn lhu(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x25, base, rt, offset) }
    pub fn lwr(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x26, base, rt, offset) }
    pub fn sb(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x28, base, rt, offset) }
    pub fn sh(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x29, base, rt, offset) }
    pub fn swl(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x2A, base, rt, offset) }
    pub fn sw(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x2B, base, rt, offset) }
    pub fn swr(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x2E, base, rt, offset) }
    pub fn lwc2(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x32, base, rt, offset) }
    pub fn swc2(rt: u32, base: u32, offset: i32) -> u32 { i_type(0x3A, base, rt, offset) }
}

/// Scans and analyses a program placed at `PROGRAM_BASE`.
pub fn plan_for(words: &[u32], config: &DynarecConfig) -> BlockPlan {
    let fetch = |address: u32| {
        let index = address.wrapping_sub(PROGRAM_BASE) as usize / 4;
        words.get(index).copied()
    };
    let mut plan = analysis::scan(PROGRAM_BASE, config, fetch).unwrap();
    analysis::analyse(&mut plan, config);
    plan
}

/// A machine with the program in RAM at `PROGRAM_BASE` and the PC on it.
pub fn machine_with_program(config: DynarecConfig, words: &[u32]) -> PsxMachine {
    let mut machine = PsxMachine::new(config);
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    machine.load_executable(PROGRAM_BASE, &bytes, PROGRAM_BASE, 0x801F_FF00).unwrap();
    machine
}

/// Snapshot of every guest register plus HI/LO and PC, for comparisons.
pub fn register_file(machine: &PsxMachine) -> Vec<u32> {
    let cpu = machine.cpu();
    let mut registers: Vec<u32> = (0..32).map(|reg| cpu.gpr(reg)).collect();
    registers.extend([cpu.hi(), cpu.lo(), cpu.pc()]);
    registers
}
