// SPDX-License-Identifier: GPL-3.0
// translate.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::codegen::{BlockEmitter, ColdKind};
use super::decode::{AluKind, ImmKind, Instruction, MulDivKind, ShiftKind};
use super::emitter::InstructionEmitter;
use super::host::{AluImmOp, AluOp, BranchCond, Helper, HostOp, HostReg, ShiftOp, StateField};
use crate::cpu::r3051::mips_exception::MIPSExceptionReason;
use dynapsx_utility::CustomInteger;
use log::warn;

fn shift_op(kind: ShiftKind) -> ShiftOp {
    match kind {
        ShiftKind::Sll => ShiftOp::Sll,
        ShiftKind::Srl => ShiftOp::Srl,
        ShiftKind::Sra => ShiftOp::Sra,
    }
}

fn fold_shift(kind: ShiftKind, value: u32, amount: u32) -> u32 {
    let amount = amount & 31;
    match kind {
        ShiftKind::Sll => value << amount,
        ShiftKind::Srl => value.logical_rshift(amount),
        ShiftKind::Sra => ((value as i32) >> amount) as u32,
    }
}

/// Host form of the ALU operations that cannot trap.
fn alu_op(kind: AluKind) -> Option<AluOp> {
    match kind {
        AluKind::Addu => Some(AluOp::Addu),
        AluKind::Subu => Some(AluOp::Subu),
        AluKind::And => Some(AluOp::And),
        AluKind::Or => Some(AluOp::Or),
        AluKind::Xor => Some(AluOp::Xor),
        AluKind::Nor => Some(AluOp::Nor),
        AluKind::Slt => Some(AluOp::Slt),
        AluKind::Sltu => Some(AluOp::Sltu),
        AluKind::Add | AluKind::Sub => None,
    }
}

/// Evaluates a three-register ALU operation. Returns `None` when ADD or SUB
/// overflows.
fn fold_alu(kind: AluKind, a: u32, b: u32) -> Option<u32> {
    Some(match kind {
        AluKind::Add => (a as i32).checked_add(b as i32)? as u32,
        AluKind::Sub => (a as i32).checked_sub(b as i32)? as u32,
        AluKind::Addu => a.wrapping_add(b),
        AluKind::Subu => a.wrapping_sub(b),
        AluKind::And => a & b,
        AluKind::Or => a | b,
        AluKind::Xor => a ^ b,
        AluKind::Nor => !(a | b),
        AluKind::Slt => ((a as i32) < (b as i32)) as u32,
        AluKind::Sltu => (a < b) as u32,
    })
}

fn imm_op(kind: ImmKind) -> Option<AluImmOp> {
    match kind {
        ImmKind::Addiu => Some(AluImmOp::Addiu),
        ImmKind::Slti => Some(AluImmOp::Slti),
        ImmKind::Sltiu => Some(AluImmOp::Sltiu),
        ImmKind::Andi => Some(AluImmOp::Andi),
        ImmKind::Ori => Some(AluImmOp::Ori),
        ImmKind::Xori => Some(AluImmOp::Xori),
        ImmKind::Addi => None,
    }
}

/// Evaluates an immediate operation. Returns `None` when ADDI overflows.
fn fold_imm(kind: ImmKind, a: u32, imm: u16) -> Option<u32> {
    let simm = (imm as u32).sign_extend(15);
    let zimm = imm as u32;
    Some(match kind {
        ImmKind::Addi => (a as i32).checked_add(simm as i32)? as u32,
        ImmKind::Addiu => a.wrapping_add(simm),
        ImmKind::Slti => ((a as i32) < (simm as i32)) as u32,
        ImmKind::Sltiu => (a < simm) as u32,
        ImmKind::Andi => a & zimm,
        ImmKind::Ori => a | zimm,
        ImmKind::Xori => a ^ zimm,
    })
}

impl<E: InstructionEmitter> BlockEmitter<'_, E> {

    /// Translates one instruction that is neither a control transfer nor a
    /// general purpose register load.
    pub(super) fn emit_instruction(&mut self, instruction: &Instruction) {

        match *instruction {
            Instruction::Shift { kind, rd, rt, shamt } => self.emit_shift(kind, rd, rt, shamt),
            Instruction::ShiftVariable { kind, rd, rt, rs } => self.emit_shift_variable(kind, rd, rt, rs),
            Instruction::Alu { kind, rd, rs, rt } => self.emit_alu(kind, rd, rs, rt),
            Instruction::Imm { kind, rt, rs, imm } => self.emit_imm(kind, rt, rs, imm),
            Instruction::Lui { rt, imm } => {
                if rt != 0 {
                    self.tracker.set_const(rt, (imm as u32) << 16);
                }
            },

            Instruction::MoveFromHi { rd } => self.emit_move_from(StateField::Hi, rd),
            Instruction::MoveFromLo { rd } => self.emit_move_from(StateField::Lo, rd),
            Instruction::MoveToHi { rs } => self.emit_move_to(StateField::Hi, rs),
            Instruction::MoveToLo { rs } => self.emit_move_to(StateField::Lo, rs),
            Instruction::MulDiv { kind, rs, rt } => self.emit_mul_div(kind, rs, rt),

            Instruction::Syscall => self.raise_exception(MIPSExceptionReason::SYS, 0, None),
            Instruction::Break => self.raise_exception(MIPSExceptionReason::BP, 0, None),
            Instruction::CopUnusable { cop } => self.raise_exception(MIPSExceptionReason::CPU, cop, None),

            Instruction::MoveFromCop0 { rt, rd } => {
                self.call_lite(Helper::ReadCop0 { reg: rd as u8 });
                self.commit_write(rt, HostReg::V0);
            },
            Instruction::MoveToCop0 { rt, rd } => {
                let value = self.read_reg(rt, HostReg::A0);
                self.move_reg(HostReg::A0, value);
                self.call_full(Helper::WriteCop0 { reg: rd as u8 });
            },
            Instruction::ReturnFromException => self.call_full(Helper::ReturnFromException),

            Instruction::MoveFromCop2 { rt, rd } => {
                self.call_lite(Helper::GteRead { control: false, reg: rd as u8 });
                self.commit_write(rt, HostReg::V0);
            },
            Instruction::MoveControlFromCop2 { rt, rd } => {
                self.call_lite(Helper::GteRead { control: true, reg: rd as u8 });
                self.commit_write(rt, HostReg::V0);
            },
            Instruction::MoveToCop2 { rt, rd } => self.emit_gte_write(false, rt, rd),
            Instruction::MoveControlToCop2 { rt, rd } => self.emit_gte_write(true, rt, rd),
            Instruction::Cop2Command { command } => self.call_lite(Helper::GteCommand { command }),

            Instruction::Load { kind, rt, base, offset } => {
                if let Some(value) = self.emit_load(kind, rt, base, offset, false) {
                    self.commit_write(rt, value);
                }
            },
            Instruction::Store { kind, rt, base, offset } => self.emit_store(kind, rt, base, offset),
            Instruction::LoadCop2 { rt, base, offset } => self.emit_load_cop2(rt, base, offset),
            Instruction::StoreCop2 { rt, base, offset } => self.emit_store_cop2(rt, base, offset),

            // The block compiler emits these with their delay slots.
            Instruction::Jump { .. } | Instruction::JumpRegister { .. } | Instruction::Branch { .. } => {},

            Instruction::Unknown { word } => {
                warn!("unknown instruction {:#010x} at {:#010x}, ignoring", word, self.site.guest_pc);
            },
        }
    }

    fn emit_shift(&mut self, kind: ShiftKind, rd: usize, rt: usize, shamt: u32) {
        if rd == 0 {
            return;
        }
        if let Some(value) = self.tracker.get(rt) {
            self.tracker.set_const(rd, fold_shift(kind, value, shamt));
            return;
        }
        let source = self.read_reg(rt, HostReg::T0);
        let dest = self.dest_for(rd);
        self.emit(HostOp::Shift { op: shift_op(kind), rd: dest, rt: source, shamt: shamt as u8 });
        self.commit_write(rd, dest);
    }

    fn emit_shift_variable(&mut self, kind: ShiftKind, rd: usize, rt: usize, rs: usize) {
        if rd == 0 {
            return;
        }
        if let (Some(value), Some(amount)) = (self.tracker.get(rt), self.tracker.get(rs)) {
            self.tracker.set_const(rd, fold_shift(kind, value, amount));
            return;
        }
        let source = self.read_reg(rt, HostReg::T0);
        let amount = self.read_reg(rs, HostReg::T1);
        let dest = self.dest_for(rd);
        self.emit(HostOp::ShiftVar { op: shift_op(kind), rd: dest, rt: source, rs: amount });
        self.commit_write(rd, dest);
    }

    fn emit_alu(&mut self, kind: AluKind, rd: usize, rs: usize, rt: usize) {

        if let (Some(a), Some(b)) = (self.tracker.get(rs), self.tracker.get(rt)) {
            match fold_alu(kind, a, b) {
                Some(value) if rd != 0 => self.tracker.set_const(rd, value),
                Some(_) => {},
                None => self.raise_exception(MIPSExceptionReason::OVF, 0, None),
            }
            return;
        }

        let lhs = self.read_reg(rs, HostReg::T0);
        let rhs = self.read_reg(rt, HostReg::T1);

        match alu_op(kind) {
            Some(op) => {
                if rd == 0 {
                    return;
                }
                let dest = self.dest_for(rd);
                self.emit(HostOp::Alu { op, rd: dest, rs: lhs, rt: rhs });
                self.commit_write(rd, dest);
            },
            None => self.emit_trapping_add(kind == AluKind::Sub, rd, lhs, rhs),
        }
    }

    /// ADD, ADDI and SUB: compute into T5, trap on signed overflow, then
    /// write the destination. Overflow shows up as the sign bit of
    /// `(a ^ r) & (b ^ r)` for addition and `(a ^ b) & (a ^ r)` for subtraction.
    fn emit_trapping_add(&mut self, subtract: bool, rd: usize, lhs: HostReg, rhs: HostReg) {

        let op = if subtract { AluOp::Subu } else { AluOp::Addu };
        self.emit(HostOp::Alu { op, rd: HostReg::T5, rs: lhs, rt: rhs });

        if subtract {
            self.emit(HostOp::Alu { op: AluOp::Xor, rd: HostReg::AT, rs: lhs, rt: rhs });
            self.emit(HostOp::Alu { op: AluOp::Xor, rd: HostReg::S0, rs: lhs, rt: HostReg::T5 });
        } else {
            self.emit(HostOp::Alu { op: AluOp::Xor, rd: HostReg::AT, rs: lhs, rt: HostReg::T5 });
            self.emit(HostOp::Alu { op: AluOp::Xor, rd: HostReg::S0, rs: rhs, rt: HostReg::T5 });
        }
        self.emit(HostOp::Alu { op: AluOp::And, rd: HostReg::AT, rs: HostReg::AT, rt: HostReg::S0 });

        let overflow = self.cold_path(
            ColdKind::Exception { reason: MIPSExceptionReason::OVF, coprocessor: 0, bad_address: None },
            None,
        );
        self.out.branch_to(BranchCond::Ltz, HostReg::AT, HostReg::ZERO, overflow);

        self.commit_write(rd, HostReg::T5);
    }

    fn emit_imm(&mut self, kind: ImmKind, rt: usize, rs: usize, imm: u16) {

        if let Some(a) = self.tracker.get(rs) {
            match fold_imm(kind, a, imm) {
                Some(value) if rt != 0 => self.tracker.set_const(rt, value),
                Some(_) => {},
                None => self.raise_exception(MIPSExceptionReason::OVF, 0, None),
            }
            return;
        }

        let source = self.read_reg(rs, HostReg::T0);

        match imm_op(kind) {
            Some(op) => {
                if rt == 0 {
                    return;
                }
                let dest = self.dest_for(rt);
                self.emit(HostOp::AluImm { op, rt: dest, rs: source, imm });
                self.commit_write(rt, dest);
            },
            None => {
                self.out.load_imm32(HostReg::A3, (imm as u32).sign_extend(15));
                self.emit_trapping_add(false, rt, source, HostReg::A3);
            },
        }
    }

    fn emit_move_from(&mut self, field: StateField, rd: usize) {
        if rd == 0 {
            return;
        }
        let dest = self.dest_for(rd);
        self.emit(HostOp::LoadState { rt: dest, field });
        self.commit_write(rd, dest);
    }

    fn emit_move_to(&mut self, field: StateField, rs: usize) {
        let source = self.read_reg(rs, HostReg::T0);
        self.emit(HostOp::StoreState { rt: source, field });
    }

    fn emit_mul_div(&mut self, kind: MulDivKind, rs: usize, rt: usize) {

        match kind {
            MulDivKind::Mult | MulDivKind::Multu => {
                let signed = kind == MulDivKind::Mult;

                if let (Some(a), Some(b)) = (self.tracker.get(rs), self.tracker.get(rt)) {
                    let product = if signed {
                        (a as i32 as i64).wrapping_mul(b as i32 as i64) as u64
                    } else {
                        (a as u64) * (b as u64)
                    };
                    self.out.load_imm32(HostReg::T4, (product >> 32) as u32);
                    self.out.load_imm32(HostReg::T5, product as u32);
                } else {
                    let lhs = self.read_reg(rs, HostReg::T0);
                    let rhs = self.read_reg(rt, HostReg::T1);
                    self.emit(HostOp::MulWide { signed, hi: HostReg::T4, lo: HostReg::T5, lhs, rhs });
                }
                self.emit(HostOp::StoreState { rt: HostReg::T4, field: StateField::Hi });
                self.emit(HostOp::StoreState { rt: HostReg::T5, field: StateField::Lo });
            },
            MulDivKind::Div | MulDivKind::Divu => {
                let numerator = self.read_reg(rs, HostReg::A0);
                self.move_reg(HostReg::A0, numerator);
                let denominator = self.read_reg(rt, HostReg::A1);
                self.move_reg(HostReg::A1, denominator);
                self.call_lite(Helper::Divide { signed: kind == MulDivKind::Div });
            },
        }
    }

    fn emit_gte_write(&mut self, control: bool, rt: usize, rd: usize) {
        let value = self.read_reg(rt, HostReg::A0);
        self.move_reg(HostReg::A0, value);
        self.call_lite(Helper::GteWrite { control, reg: rd as u8 });
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn fold_alu_should_trap_only_on_signed_overflow() {

        assert_eq!(fold_alu(AluKind::Add, 0x7FFF_FFFF, 1), None);
        assert_eq!(fold_alu(AluKind::Addu, 0x7FFF_FFFF, 1), Some(0x8000_0000));
        assert_eq!(fold_alu(AluKind::Sub, 0x8000_0000, 1), None);
        assert_eq!(fold_alu(AluKind::Sub, 5, 7), Some(0xFFFF_FFFE));
        assert_eq!(fold_alu(AluKind::Slt, 0xFFFF_FFFF, 0), Some(1));
        assert_eq!(fold_alu(AluKind::Sltu, 0xFFFF_FFFF, 0), Some(0));
        assert_eq!(fold_alu(AluKind::Nor, 0, 0), Some(0xFFFF_FFFF));
    }

    #[test]
    fn fold_imm_should_extend_by_operation() {

        // Arithmetic and comparisons sign-extend, logical operations don't.
        assert_eq!(fold_imm(ImmKind::Addiu, 1, 0xFFFF), Some(0));
        assert_eq!(fold_imm(ImmKind::Sltiu, 5, 0xFFFF), Some(1));
        assert_eq!(fold_imm(ImmKind::Ori, 0, 0xFFFF), Some(0x0000_FFFF));
        assert_eq!(fold_imm(ImmKind::Addi, 0x7FFF_FFFF, 1), None);
    }

    #[test]
    fn fold_shift_should_mask_the_amount() {

        assert_eq!(fold_shift(ShiftKind::Sll, 1, 33), 2);
        assert_eq!(fold_shift(ShiftKind::Srl, 0x8000_0000, 31), 1);
        assert_eq!(fold_shift(ShiftKind::Sra, 0x8000_0000, 31), 0xFFFF_FFFF);
    }
}
