// SPDX-License-Identifier: GPL-3.0
// compiler.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::analysis::{self, BlockPlan, Role, ScannedInstruction};
use super::block_cache::BlockEntry;
use super::codegen::{BlockEmitter, ColdKind};
use super::context::TranslatorContext;
use super::decode::{reg_bit, BranchKind, Instruction, LoadKind};
use super::emitter::{InstructionEmitter, ThreadedEmitter};
use super::host::{AluImmOp, AluOp, BranchCond, HostOp, HostReg, StateField};
use crate::config::DynarecConfig;
use crate::cpu::CpuBridge;
use crate::error::DynarecError;
use log::{trace, warn};

/// Compiles the block starting at `pc` into the context's code buffer. The
/// block is not indexed here.
pub fn compile_block(
    context: &mut TranslatorContext,
    config: &DynarecConfig,
    bus: &mut dyn CpuBridge,
    pc: u32,
) -> Result<BlockEntry, DynarecError> {

    let mut plan = analysis::scan(pc, config, |address| bus.fetch_instruction(address))?;
    analysis::analyse(&mut plan, config);

    let stamps = if config.smc_detection {
        context.cache.page_stamps(pc, plan.end_pc().wrapping_sub(4))
    } else {
        [None, None]
    };

    context.tracker.reset();
    let TranslatorContext { code, cache, patches, tracker, exit, .. } = context;
    let entry = code.cursor();

    let body = {
        let mut emitter = BlockEmitter::new(
            ThreadedEmitter::new(code),
            tracker,
            cache,
            patches,
            config,
            *exit,
            pc,
            plan.is_idle,
        );
        let body = emitter.emit_prologue();
        emitter.emit_page_guards(&stamps);
        emitter.emit_plan(&plan);
        emitter.finish()?;
        body
    };

    trace!(
        "compiled block {:#010x}: {} instructions, {} cycles, {} host ops{}",
        pc,
        plan.instructions.len(),
        plan.total_cycles,
        code.cursor() - entry,
        if plan.is_idle { " (idle)" } else { "" }
    );

    Ok(BlockEntry {
        pc,
        entry,
        body,
        instruction_count: plan.instructions.len() as u32,
        cycles: plan.total_cycles,
        is_idle: plan.is_idle,
        stamps,
    })
}

/// Whether a conditional branch is taken for known operands.
fn branch_taken(kind: BranchKind, a: u32, b: u32) -> bool {
    let signed = a as i32;
    match kind {
        BranchKind::Beq => a == b,
        BranchKind::Bne => a != b,
        BranchKind::Blez => signed <= 0,
        BranchKind::Bgtz => signed > 0,
        BranchKind::Bltz | BranchKind::Bltzal => signed < 0,
        BranchKind::Bgez | BranchKind::Bgezal => signed >= 0,
    }
}

/// Where a control transfer goes.
enum JumpTarget {
    Static(u32),

    /// A register jump, with its target when the register is a known constant.
    Register(Option<u32>),
}

impl<E: InstructionEmitter> BlockEmitter<'_, E> {

    /// Emits every instruction of the plan, then the fall-through exit.
    fn emit_plan(&mut self, plan: &BlockPlan) {

        let instructions = &plan.instructions;
        let mut index = 0;

        while index < instructions.len() && !self.terminated {
            let scanned = &instructions[index];
            self.begin(scanned);

            match scanned.role {
                Role::Branch { continuation } => {
                    self.emit_control_transfer(scanned, instructions.get(index + 1), continuation);
                    index += 2;
                },
                _ => {
                    self.emit_step(scanned);
                    index += 1;
                },
            }
        }

        if self.terminated {
            return;
        }
        if let Some(reg) = self.pending_load.take() {
            self.commit_load(reg);
        }
        self.flush_consts();
        let cycles = self.cycles;
        self.emit_exit(plan.end_pc(), cycles);
        self.terminated = true;
    }

    /// Emits one non-branch instruction and retires the load issued by the
    /// instruction before it.
    fn emit_step(&mut self, scanned: &ScannedInstruction) {

        let pending = self.pending_load.take();
        let instruction = &scanned.instruction;

        if !scanned.live {
            let writes = instruction.writes();
            for reg in (1..32).filter(|&reg| writes & reg_bit(reg) != 0) {
                self.tracker.set_unknown(reg);
            }
            self.settle_pending(pending, instruction);
            return;
        }

        if let Instruction::Load { kind, rt, base, offset } = *instruction {
            self.emit_guest_load(scanned, pending, kind, rt, base, offset);
            return;
        }

        self.emit_instruction(instruction);
        if !self.terminated {
            self.settle_pending(pending, instruction);
        }
    }

    /// Retires a pending load after `instruction` ran: a write to the same
    /// register cancels it, otherwise the loaded value lands.
    fn settle_pending(&mut self, pending: Option<usize>, instruction: &Instruction) {
        let Some(reg) = pending else {
            return;
        };
        if instruction.writes() & reg_bit(reg) != 0 {
            self.emit(HostOp::StoreState { rt: HostReg::ZERO, field: StateField::LoadDelayReg });
        } else {
            self.commit_load(reg);
        }
    }

    /// Moves the load delay value into its register and empties the slot.
    fn commit_load(&mut self, reg: usize) {
        let dest = self.dest_for(reg);
        self.emit(HostOp::LoadState { rt: dest, field: StateField::LoadDelayValue });
        self.commit_write(reg, dest);
        self.emit(HostOp::StoreState { rt: HostReg::ZERO, field: StateField::LoadDelayReg });
    }

    fn emit_guest_load(
        &mut self,
        scanned: &ScannedInstruction,
        pending: Option<usize>,
        kind: LoadKind,
        rt: usize,
        base: usize,
        offset: u32,
    ) {

        let merge_pending = pending == Some(rt) && matches!(kind, LoadKind::Lwl | LoadKind::Lwr);
        let Some(value) = self.emit_load(kind, rt, base, offset, merge_pending) else {
            return;
        };

        if rt == 0 || !scanned.deferred {
            self.settle_pending(pending, &scanned.instruction);
            if rt != 0 {
                self.commit_write(rt, value);
            }
            return;
        }

        // A second load to the same register discards the first.
        match pending {
            Some(old) if old != rt => self.commit_load(old),
            _ => {},
        }
        self.emit(HostOp::StoreState { rt: value, field: StateField::LoadDelayValue });
        if pending != Some(rt) {
            self.out.load_imm32(HostReg::AT, rt as u32);
            self.emit(HostOp::StoreState { rt: HostReg::AT, field: StateField::LoadDelayReg });
        }
        self.pending_load = Some(rt);
    }

    /// Computes a branch condition into COND. Returns the outcome instead
    /// when it is known at compile time.
    fn emit_branch_condition(&mut self, kind: BranchKind, rs: usize, rt: usize) -> Option<bool> {

        if let (Some(a), Some(b)) = (self.tracker.get(rs), self.tracker.get(rt)) {
            return Some(branch_taken(kind, a, b));
        }
        if rs == rt && matches!(kind, BranchKind::Beq | BranchKind::Bne) {
            return Some(kind == BranchKind::Beq);
        }

        let lhs = self.read_reg(rs, HostReg::T0);
        match kind {
            BranchKind::Beq | BranchKind::Bne => {
                let rhs = self.read_reg(rt, HostReg::T1);
                self.emit(HostOp::Alu { op: AluOp::Xor, rd: HostReg::COND, rs: lhs, rt: rhs });
                if kind == BranchKind::Beq {
                    self.emit(HostOp::AluImm { op: AluImmOp::Sltiu, rt: HostReg::COND, rs: HostReg::COND, imm: 1 });
                } else {
                    self.emit(HostOp::Alu { op: AluOp::Sltu, rd: HostReg::COND, rs: HostReg::ZERO, rt: HostReg::COND });
                }
            },
            BranchKind::Bltz | BranchKind::Bltzal => {
                self.emit(HostOp::Alu { op: AluOp::Slt, rd: HostReg::COND, rs: lhs, rt: HostReg::ZERO });
            },
            BranchKind::Bgez | BranchKind::Bgezal => {
                self.emit(HostOp::Alu { op: AluOp::Slt, rd: HostReg::COND, rs: lhs, rt: HostReg::ZERO });
                self.emit(HostOp::AluImm { op: AluImmOp::Xori, rt: HostReg::COND, rs: HostReg::COND, imm: 1 });
            },
            BranchKind::Bgtz => {
                self.emit(HostOp::Alu { op: AluOp::Slt, rd: HostReg::COND, rs: HostReg::ZERO, rt: lhs });
            },
            BranchKind::Blez => {
                self.emit(HostOp::Alu { op: AluOp::Slt, rd: HostReg::COND, rs: HostReg::ZERO, rt: lhs });
                self.emit(HostOp::AluImm { op: AluImmOp::Xori, rt: HostReg::COND, rs: HostReg::COND, imm: 1 });
            },
        }
        None
    }

    /// Emits a branch or jump together with its delay slot, and the exits
    /// that follow.
    fn emit_control_transfer(
        &mut self,
        scanned: &ScannedInstruction,
        delay: Option<&ScannedInstruction>,
        continuation: bool,
    ) {

        let pending = self.pending_load.take();
        let pc = scanned.pc;
        let instruction = scanned.instruction;
        let return_pc = pc.wrapping_add(8);

        // Operands are read before the delay slot and before any link write.
        let mut taken = Some(true);
        let target = match instruction {
            Instruction::Branch { kind, rs, rt, .. } => {
                taken = self.emit_branch_condition(kind, rs, rt);
                JumpTarget::Static(instruction.static_target(pc).unwrap_or(return_pc))
            },
            Instruction::JumpRegister { rs, .. } => match self.tracker.get(rs) {
                Some(value) => JumpTarget::Register(Some(value)),
                None => {
                    let source = self.read_reg(rs, HostReg::COND);
                    self.move_reg(HostReg::COND, source);
                    JumpTarget::Register(None)
                },
            },
            _ => JumpTarget::Static(instruction.static_target(pc).unwrap_or(return_pc)),
        };

        self.settle_pending(pending, &instruction);

        match instruction {
            Instruction::Branch { kind: BranchKind::Bltzal | BranchKind::Bgezal, .. }
            | Instruction::Jump { link: true, .. } => self.tracker.set_const(31, return_pc),
            Instruction::JumpRegister { link_rd: Some(rd), .. } if rd != 0 => self.tracker.set_const(rd, return_pc),
            _ => {},
        }

        if let Some(delay) = delay {
            self.begin(delay);
            if delay.instruction.is_control_transfer() {
                warn!("branch at {:#010x} in the delay slot of {:#010x}, ignoring", delay.pc, pc);
            } else {
                self.emit_step(delay);
            }
        }
        if self.terminated {
            return;
        }

        self.flush_consts();
        let cycles = self.cycles;

        match target {
            JumpTarget::Static(target) => match (taken, continuation) {
                (Some(true), _) => {
                    self.emit_exit(target, cycles);
                    self.terminated = true;
                },
                (Some(false), true) => {},
                (Some(false), false) => {
                    self.emit_exit(return_pc, cycles);
                    self.terminated = true;
                },
                (None, true) => {
                    let taken_exit = self.cold_path(ColdKind::TakenExit { target }, None);
                    self.out.branch_to(BranchCond::Ne, HostReg::COND, HostReg::ZERO, taken_exit);
                },
                (None, false) => {
                    let taken_exit = self.out.new_label();
                    self.out.branch_to(BranchCond::Ne, HostReg::COND, HostReg::ZERO, taken_exit);
                    self.emit_exit(return_pc, cycles);
                    self.out.bind(taken_exit);
                    self.emit_exit(target, cycles);
                    self.terminated = true;
                },
            },
            JumpTarget::Register(Some(target)) => {
                self.out.load_imm32(HostReg::AT, pc);
                self.emit(HostOp::StoreState { rt: HostReg::AT, field: StateField::CurrentPc });
                self.emit_exit(target, cycles);
                self.terminated = true;
            },
            JumpTarget::Register(None) => {
                self.emit_register_exit(pc, cycles);
                self.terminated = true;
            },
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn branch_taken_should_compare_signed_against_zero() {

        assert!(branch_taken(BranchKind::Bltz, 0x8000_0000, 0));
        assert!(!branch_taken(BranchKind::Bgtz, 0x8000_0000, 0));
        assert!(branch_taken(BranchKind::Blez, 0, 0));
        assert!(branch_taken(BranchKind::Bgezal, 0, 0));
        assert!(branch_taken(BranchKind::Bne, 1, 2));
        assert!(!branch_taken(BranchKind::Beq, 1, 2));
    }
}
