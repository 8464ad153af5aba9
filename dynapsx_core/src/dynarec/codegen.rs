// SPDX-License-Identifier: GPL-3.0
// codegen.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::analysis::{Role, ScannedInstruction};
use super::block_cache::{BlockCache, PageStamp, PatchSiteList};
use super::code_buffer::CodeAddr;
use super::consts::{ConstSnapshot, ConstTracker};
use super::emitter::{InstructionEmitter, Label};
use super::host::{
    pinned_host_reg, AluImmOp, AluOp, BranchCond, CallSite, Helper, HostOp, HostReg, MemWidth,
    StateField, PINNED_REGISTERS,
};
use super::linker::{self, LinkDecision};
use crate::config::DynarecConfig;
use crate::cpu::r3051::mips_exception::MIPSExceptionReason;
use crate::error::DynarecError;
use log::debug;

/// Host instructions in every block prologue, ahead of the body.
pub const PROLOGUE_LEN: u32 = 6;

/// Out-of-line work, emitted after the hot path of the block.
#[derive(Clone, Debug)]
pub(super) enum ColdKind {

    /// A full call raised an exception: charge the cycles and leave.
    Abort,

    /// Bus read for an address outside RAM (virtual address in T0).
    SlowLoad { width: MemWidth, signed: bool },

    /// Bus write for an address outside RAM or while the cache is isolated.
    SlowStore { width: MemWidth },

    LoadMerge { left: bool },
    StoreMerge { left: bool },

    /// A guest exception detected inline, with the register holding the
    /// bad address for address errors.
    Exception { reason: MIPSExceptionReason, coprocessor: u32, bad_address: Option<HostReg> },

    /// The taken side of a branch the block compiled past.
    TakenExit { target: u32 },

    /// A page guard failed: hand the PC back to the dispatcher.
    Stale,
}

struct ColdPath {
    label: Label,
    resume: Option<Label>,
    kind: ColdKind,
    site: CallSite,
    snapshot: ConstSnapshot,
    cycles: u32,
}

/// Per-block code generation state on top of an `InstructionEmitter`. The
/// instruction translators live in `translate`, `memory_access` and `compiler`.
pub(super) struct BlockEmitter<'a, E: InstructionEmitter> {
    pub(super) out: E,
    pub(super) tracker: &'a mut ConstTracker,
    cache: &'a BlockCache,
    patches: &'a mut PatchSiteList,
    pub(super) config: &'a DynarecConfig,
    exit: CodeAddr,
    block_pc: u32,
    is_idle: bool,
    cold: Vec<ColdPath>,

    /// The guest instruction being translated.
    pub(super) site: CallSite,

    /// Cycles of every instruction so far, the current one included.
    pub(super) cycles: u32,

    /// Target of the deferred load issued by the previous instruction.
    pub(super) pending_load: Option<usize>,

    /// Set once the hot path has left the block for good.
    pub(super) terminated: bool,
}

impl<'a, E: InstructionEmitter> BlockEmitter<'a, E> {

    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        out: E,
        tracker: &'a mut ConstTracker,
        cache: &'a BlockCache,
        patches: &'a mut PatchSiteList,
        config: &'a DynarecConfig,
        exit: CodeAddr,
        block_pc: u32,
        is_idle: bool,
    ) -> Self {
        BlockEmitter {
            out,
            tracker,
            cache,
            patches,
            config,
            exit,
            block_pc,
            is_idle,
            cold: Vec::new(),
            site: CallSite { guest_pc: block_pc, delay_slot: false },
            cycles: 0,
            pending_load: None,
            terminated: false,
        }
    }

    #[inline(always)]
    pub(super) fn emit(&mut self, op: HostOp) -> CodeAddr {
        self.out.emit(op)
    }

    /// Starts translating an instruction.
    pub(super) fn begin(&mut self, scanned: &ScannedInstruction) {
        self.site = CallSite {
            guest_pc: scanned.pc,
            delay_slot: scanned.role == Role::DelaySlot,
        };
        self.cycles += scanned.cycles;
    }

    /// Loads the pinned registers and the address mask. Returns the body
    /// address, where direct links enter.
    pub(super) fn emit_prologue(&mut self) -> CodeAddr {
        for (guest, host) in PINNED_REGISTERS {
            self.emit(HostOp::LoadState { rt: host, field: StateField::Gpr(guest as u8) });
        }
        self.emit(HostOp::Lui { rt: HostReg::MASK, imm: 0x1FFF });
        self.emit(HostOp::AluImm { op: AluImmOp::Ori, rt: HostReg::MASK, rs: HostReg::MASK, imm: 0xFFFF });
        self.out.cursor()
    }

    /// Checks that the code pages still hold what was compiled.
    pub(super) fn emit_page_guards(&mut self, stamps: &[Option<PageStamp>; 2]) {
        if stamps.iter().all(Option::is_none) {
            return;
        }
        let stale = self.cold_path(ColdKind::Stale, None);
        for stamp in stamps.iter().flatten() {
            self.out.guard_page(stamp.page, stamp.generation, stale);
        }
    }

    /// Returns a host register holding guest register `reg`, loading it into
    /// `scratch` when it lives in memory or is a constant.
    pub(super) fn read_reg(&mut self, reg: usize, scratch: HostReg) -> HostReg {
        if let Some(value) = self.tracker.get(reg) {
            if value == 0 {
                return HostReg::ZERO;
            }
            self.out.load_imm32(scratch, value);
            return scratch;
        }
        if let Some(host) = pinned_host_reg(reg) {
            return host;
        }
        self.emit(HostOp::LoadState { rt: scratch, field: StateField::Gpr(reg as u8) });
        scratch
    }

    /// Where a result for guest register `reg` should be computed.
    pub(super) fn dest_for(&self, reg: usize) -> HostReg {
        pinned_host_reg(reg).unwrap_or(HostReg::V1)
    }

    /// Makes the value in `host` the new contents of guest register `reg`.
    pub(super) fn commit_write(&mut self, reg: usize, host: HostReg) {
        if reg == 0 {
            return;
        }
        match pinned_host_reg(reg) {
            Some(pinned) => self.move_reg(pinned, host),
            None => {
                self.emit(HostOp::StoreState { rt: host, field: StateField::Gpr(reg as u8) });
            },
        }
        self.tracker.set_unknown(reg);
    }

    pub(super) fn move_reg(&mut self, rd: HostReg, rs: HostReg) {
        if rd != rs {
            self.emit(HostOp::Alu { op: AluOp::Addu, rd, rs, rt: HostReg::ZERO });
        }
    }

    /// Writes one constant to its home.
    fn materialize(&mut self, reg: usize, value: u32) {
        match pinned_host_reg(reg) {
            Some(host) => self.out.load_imm32(host, value),
            None => {
                self.out.load_imm32(HostReg::AT, value);
                self.emit(HostOp::StoreState { rt: HostReg::AT, field: StateField::Gpr(reg as u8) });
            },
        }
    }

    /// Writes every dirty constant to its home.
    pub(super) fn flush_consts(&mut self) {
        for (reg, value) in self.tracker.dirty_registers() {
            self.materialize(reg, value);
            self.tracker.mark_clean(reg);
        }
    }

    fn flush_snapshot(&mut self, snapshot: &ConstSnapshot) {
        for &(reg, value) in &snapshot.dirty {
            self.materialize(reg, value);
        }
    }

    pub(super) fn flush_pinned(&mut self) {
        for (guest, host) in PINNED_REGISTERS {
            self.emit(HostOp::StoreState { rt: host, field: StateField::Gpr(guest as u8) });
        }
    }

    fn reload_pinned(&mut self) {
        for (guest, host) in PINNED_REGISTERS {
            self.emit(HostOp::LoadState { rt: host, field: StateField::Gpr(guest as u8) });
        }
    }

    /// Calls a helper that only touches its arguments and the bus.
    pub(super) fn call_lite(&mut self, helper: Helper) {
        let site = self.site;
        self.emit(HostOp::Call { helper, site });
    }

    /// Calls a helper that sees the whole register file: everything is
    /// written back first and reloaded after, then the block bails out if
    /// the helper raised an exception.
    pub(super) fn call_full(&mut self, helper: Helper) {
        self.flush_consts();
        self.flush_pinned();
        self.call_lite(helper);
        self.reload_pinned();

        self.emit(HostOp::LoadState { rt: HostReg::AT, field: StateField::Aborted });
        let abort = self.cold_path(ColdKind::Abort, None);
        self.out.branch_to(BranchCond::Ne, HostReg::AT, HostReg::ZERO, abort);
    }

    /// Raises an exception the current instruction always takes, and ends
    /// the hot path.
    pub(super) fn raise_exception(&mut self, reason: MIPSExceptionReason, coprocessor: u32, bad_address: Option<u32>) {
        self.flush_consts();
        if let Some(address) = bad_address {
            self.out.load_imm32(HostReg::A0, address);
        }
        self.emit_exception_call(reason, coprocessor, self.site);
        let cycles = self.cycles;
        self.charge_cycles(cycles);
        let exit = self.exit;
        self.out.jump_to(exit);
        self.terminated = true;
    }

    fn emit_exception_call(&mut self, reason: MIPSExceptionReason, coprocessor: u32, site: CallSite) {
        self.flush_pinned();
        self.emit(HostOp::Call { helper: Helper::Exception { reason, coprocessor }, site });
        self.reload_pinned();
    }

    /// Queues cold work and returns the label the hot path branches to.
    pub(super) fn cold_path(&mut self, kind: ColdKind, resume: Option<Label>) -> Label {
        let label = self.out.new_label();
        self.cold.push(ColdPath {
            label,
            resume,
            kind,
            site: self.site,
            snapshot: self.tracker.snapshot(),
            cycles: self.cycles,
        });
        label
    }

    /// Subtracts cycles from the remaining budget.
    fn charge_cycles(&mut self, cycles: u32) {
        if cycles == 0 {
            return;
        }
        if cycles < 0x8000 {
            let imm = (cycles as i32).wrapping_neg() as u16;
            self.emit(HostOp::AluImm { op: AluImmOp::Addiu, rt: HostReg::CYC, rs: HostReg::CYC, imm });
        } else {
            self.out.load_imm32(HostReg::AT, cycles);
            self.emit(HostOp::Alu { op: AluOp::Subu, rd: HostReg::CYC, rs: HostReg::CYC, rt: HostReg::AT });
        }
    }

    /// Leaves the block towards a known guest PC. Constants must already be
    /// flushed.
    pub(super) fn emit_exit(&mut self, target: u32, cycles: u32) {

        self.charge_cycles(cycles);
        self.out.load_imm32(HostReg::AT, target);
        self.emit(HostOp::StoreState { rt: HostReg::AT, field: StateField::Pc });

        let exit = self.exit;
        self.emit(HostOp::Branch { cond: BranchCond::Lez, lhs: HostReg::CYC, rhs: HostReg::ZERO, target: exit });

        match linker::decide(self.config, self.cache, self.block_pc, self.is_idle, target) {
            LinkDecision::Direct(body) => {
                self.out.jump_to(body);
            },
            LinkDecision::Deferred => {
                let site = self.out.jump_to(exit);
                if !self.patches.push(site, target) {
                    debug!("patch list full, exit {:#010x} -> {:#010x} stays unlinked", self.block_pc, target);
                }
            },
            LinkDecision::Never => {
                self.out.jump_to(exit);
            },
        }
    }

    /// Leaves the block through a register jump whose target is in COND.
    pub(super) fn emit_register_exit(&mut self, jump_pc: u32, cycles: u32) {

        self.charge_cycles(cycles);
        self.emit(HostOp::StoreState { rt: HostReg::COND, field: StateField::Pc });
        self.out.load_imm32(HostReg::AT, jump_pc);
        self.emit(HostOp::StoreState { rt: HostReg::AT, field: StateField::CurrentPc });
        self.flush_pinned();

        let exit = self.exit;
        self.emit(HostOp::Branch { cond: BranchCond::Lez, lhs: HostReg::CYC, rhs: HostReg::ZERO, target: exit });
        if self.config.direct_linking {
            self.emit(HostOp::JumpIndirect { key: HostReg::COND, miss: exit });
        } else {
            self.out.jump_to(exit);
        }
    }

    /// Emits the queued cold paths.
    fn emit_cold_paths(&mut self) {

        let exit = self.exit;
        for path in std::mem::take(&mut self.cold) {
            self.out.bind(path.label);
            let site = path.site;

            match path.kind {
                ColdKind::Abort => {
                    self.charge_cycles(path.cycles);
                    self.out.jump_to(exit);
                },
                ColdKind::SlowLoad { width, signed } => {
                    self.move_reg(HostReg::A0, HostReg::T0);
                    self.emit(HostOp::Call { helper: Helper::BusRead { width, signed }, site });
                    self.move_reg(HostReg::T4, HostReg::V0);
                },
                ColdKind::SlowStore { width } => {
                    self.move_reg(HostReg::A0, HostReg::T0);
                    self.move_reg(HostReg::A1, HostReg::T3);
                    self.emit(HostOp::Call { helper: Helper::BusWrite { width }, site });
                },
                ColdKind::LoadMerge { left } => {
                    self.move_reg(HostReg::A0, HostReg::T0);
                    self.move_reg(HostReg::A1, HostReg::T4);
                    self.emit(HostOp::Call { helper: Helper::LoadMerge { left }, site });
                    self.move_reg(HostReg::T4, HostReg::V0);
                },
                ColdKind::StoreMerge { left } => {
                    self.move_reg(HostReg::A0, HostReg::T0);
                    self.move_reg(HostReg::A1, HostReg::T3);
                    self.emit(HostOp::Call { helper: Helper::StoreMerge { left }, site });
                },
                ColdKind::Exception { reason, coprocessor, bad_address } => {
                    self.flush_snapshot(&path.snapshot);
                    if let Some(reg) = bad_address {
                        self.move_reg(HostReg::A0, reg);
                    }
                    self.emit_exception_call(reason, coprocessor, site);
                    self.charge_cycles(path.cycles);
                    self.out.jump_to(exit);
                },
                ColdKind::TakenExit { target } => {
                    self.flush_snapshot(&path.snapshot);
                    self.emit_exit(target, path.cycles);
                },
                ColdKind::Stale => {
                    let block_pc = self.block_pc;
                    self.out.load_imm32(HostReg::AT, block_pc);
                    self.emit(HostOp::StoreState { rt: HostReg::AT, field: StateField::Pc });
                    self.out.jump_to(exit);
                },
            }

            if let Some(resume) = path.resume {
                self.out.jump_to_label(resume);
            }
        }
    }

    /// Emits the cold paths and resolves every label.
    pub(super) fn finish(mut self) -> Result<(), DynarecError> {
        self.emit_cold_paths();
        let block_pc = self.block_pc;
        self.out.finish(block_pc)
    }
}
