// SPDX-License-Identifier: GPL-3.0
// memory_access.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

// Loads and stores. Constant addresses get a fixed access for the region
// they hit. Variable addresses are checked inline for alignment and for RAM,
// with everything else going to the bus from cold code. Values flow through
// fixed registers: T0 virtual address, T1 physical address, T3 store value,
// T4 load result.

use super::codegen::{BlockEmitter, ColdKind};
use super::decode::{LoadKind, StoreKind};
use super::emitter::{InstructionEmitter, Label};
use super::host::{AluImmOp, AluOp, BranchCond, Helper, HostOp, HostReg, IoRegister, MemWidth, StateField};
use crate::cpu::r3051::cp0::{SR, SR_ISOLATE_CACHE};
use crate::cpu::r3051::mips_exception::MIPSExceptionReason;
use crate::memory_map::{self, MemoryRegion, GPUSTAT, I_MASK, I_STAT, RAM_MIRROR_END};

fn load_width(kind: LoadKind) -> (MemWidth, bool) {
    match kind {
        LoadKind::Lb => (MemWidth::Byte, true),
        LoadKind::Lbu => (MemWidth::Byte, false),
        LoadKind::Lh => (MemWidth::Half, true),
        LoadKind::Lhu => (MemWidth::Half, false),
        LoadKind::Lw | LoadKind::Lwl | LoadKind::Lwr => (MemWidth::Word, false),
    }
}

fn store_width(kind: StoreKind) -> MemWidth {
    match kind {
        StoreKind::Sb => MemWidth::Byte,
        StoreKind::Sh => MemWidth::Half,
        StoreKind::Sw | StoreKind::Swl | StoreKind::Swr => MemWidth::Word,
    }
}

/// Hardware registers with an inline word access.
fn io_register(phys: u32) -> Option<IoRegister> {
    match phys {
        I_STAT => Some(IoRegister::InterruptStatus),
        I_MASK => Some(IoRegister::InterruptMask),
        GPUSTAT => Some(IoRegister::GpuStatus),
        _ => None,
    }
}

impl<E: InstructionEmitter> BlockEmitter<'_, E> {

    /// Emits a general purpose register load and returns the register holding
    /// the loaded value, or `None` when the access always faults. LWL/LWR
    /// merge with the pending load's value when `merge_pending` is set.
    pub(super) fn emit_load(
        &mut self,
        kind: LoadKind,
        rt: usize,
        base: usize,
        offset: u32,
        merge_pending: bool,
    ) -> Option<HostReg> {

        match kind {
            LoadKind::Lwl | LoadKind::Lwr => {
                if merge_pending {
                    self.emit(HostOp::LoadState { rt: HostReg::T4, field: StateField::LoadDelayValue });
                } else {
                    let current = self.read_reg(rt, HostReg::T4);
                    self.move_reg(HostReg::T4, current);
                }
                self.emit_load_merge(kind == LoadKind::Lwl, base, offset);
            },
            _ => {
                let (width, signed) = load_width(kind);
                self.emit_load_access(width, signed, base, offset);
            },
        }

        (!self.terminated).then_some(HostReg::T4)
    }

    /// Emits a store of guest register `rt`.
    pub(super) fn emit_store(&mut self, kind: StoreKind, rt: usize, base: usize, offset: u32) {
        let value = self.read_reg(rt, HostReg::T3);
        self.move_reg(HostReg::T3, value);

        match kind {
            StoreKind::Swl | StoreKind::Swr => self.emit_store_merge(kind == StoreKind::Swl, base, offset),
            _ => self.emit_store_access(store_width(kind), base, offset),
        }
    }

    /// LWC2: a word load handed to the GTE.
    pub(super) fn emit_load_cop2(&mut self, rt: usize, base: usize, offset: u32) {
        self.emit_load_access(MemWidth::Word, false, base, offset);
        if self.terminated {
            return;
        }
        self.move_reg(HostReg::A0, HostReg::T4);
        self.call_lite(Helper::GteWrite { control: false, reg: rt as u8 });
    }

    /// SWC2: a GTE data register stored as a word.
    pub(super) fn emit_store_cop2(&mut self, rt: usize, base: usize, offset: u32) {
        self.call_lite(Helper::GteRead { control: false, reg: rt as u8 });
        self.move_reg(HostReg::T3, HostReg::V0);
        self.emit_store_access(MemWidth::Word, base, offset);
    }

    /// Returns the effective address when it is known at compile time,
    /// otherwise computes it into T0.
    fn effective_address(&mut self, base: usize, offset: u32) -> Option<u32> {
        if let Some(value) = self.tracker.get(base) {
            return Some(value.wrapping_add(offset));
        }
        let base = self.read_reg(base, HostReg::A2);
        self.emit(HostOp::AluImm { op: AluImmOp::Addiu, rt: HostReg::T0, rs: base, imm: offset as u16 });
        None
    }

    /// Branches to an address error when T0 is not aligned to `width`.
    fn check_alignment(&mut self, width: MemWidth, reason: MIPSExceptionReason) {
        if width == MemWidth::Byte {
            return;
        }
        self.emit(HostOp::AluImm {
            op: AluImmOp::Andi,
            rt: HostReg::T2,
            rs: HostReg::T0,
            imm: (width.bytes() - 1) as u16,
        });
        let fault = self.cold_path(
            ColdKind::Exception { reason, coprocessor: 0, bad_address: Some(HostReg::T0) },
            None,
        );
        self.out.branch_to(BranchCond::Ne, HostReg::T2, HostReg::ZERO, fault);
    }

    /// Folds T0 to a physical address in T1 and branches to `label` unless
    /// it lies in RAM or one of its mirrors.
    fn branch_outside_ram(&mut self, label: Label) {
        self.emit(HostOp::Alu { op: AluOp::And, rd: HostReg::T1, rs: HostReg::T0, rt: HostReg::MASK });
        self.emit(HostOp::Lui { rt: HostReg::AT, imm: (RAM_MIRROR_END >> 16) as u16 });
        self.emit(HostOp::Alu { op: AluOp::Sltu, rd: HostReg::T2, rs: HostReg::T1, rt: HostReg::AT });
        self.out.branch_to(BranchCond::Eq, HostReg::T2, HostReg::ZERO, label);
    }

    /// Branches to `label` while SR isolates the cache.
    fn branch_if_isolated(&mut self, label: Label) {
        self.emit(HostOp::LoadState { rt: HostReg::T2, field: StateField::Cop0(SR as u8) });
        self.emit(HostOp::Lui { rt: HostReg::AT, imm: (SR_ISOLATE_CACHE >> 16) as u16 });
        self.emit(HostOp::Alu { op: AluOp::And, rd: HostReg::T2, rs: HostReg::T2, rt: HostReg::AT });
        self.out.branch_to(BranchCond::Ne, HostReg::T2, HostReg::ZERO, label);
    }

    /// Loads into T4.
    fn emit_load_access(&mut self, width: MemWidth, signed: bool, base: usize, offset: u32) {
        match self.effective_address(base, offset) {
            Some(address) => self.emit_constant_load(width, signed, address),
            None => {
                self.check_alignment(width, MIPSExceptionReason::ADEL);
                let resume = self.out.new_label();
                let slow = self.cold_path(ColdKind::SlowLoad { width, signed }, Some(resume));
                self.branch_outside_ram(slow);
                self.emit(HostOp::RamLoad { rt: HostReg::T4, addr: HostReg::T1, width, signed });
                self.out.bind(resume);
            },
        }
    }

    fn emit_constant_load(&mut self, width: MemWidth, signed: bool, address: u32) {

        if address & (width.bytes() - 1) != 0 {
            self.raise_exception(MIPSExceptionReason::ADEL, 0, Some(address));
            return;
        }

        let phys = memory_map::physical(address);
        match memory_map::classify(address) {
            MemoryRegion::Ram(_) => {
                self.out.load_imm32(HostReg::T1, phys);
                self.emit(HostOp::RamLoad { rt: HostReg::T4, addr: HostReg::T1, width, signed });
            },
            MemoryRegion::Scratchpad(_) => {
                self.out.load_imm32(HostReg::T1, phys);
                self.emit(HostOp::ScratchLoad { rt: HostReg::T4, addr: HostReg::T1, width, signed });
            },
            region => {
                let inline = match region {
                    MemoryRegion::Io(phys) if width == MemWidth::Word => io_register(phys),
                    _ => None,
                };
                if let Some(reg) = inline {
                    self.emit(HostOp::IoLoad { rt: HostReg::T4, reg });
                } else {
                    self.out.load_imm32(HostReg::A0, address);
                    self.call_lite(Helper::BusRead { width, signed });
                    self.move_reg(HostReg::T4, HostReg::V0);
                }
            },
        }
    }

    /// LWL/LWR with the register's current value already in T4.
    fn emit_load_merge(&mut self, left: bool, base: usize, offset: u32) {

        let address = self.effective_address(base, offset);

        if !self.out.supports_unaligned_merge() {
            if let Some(address) = address {
                self.out.load_imm32(HostReg::T0, address);
            }
            self.move_reg(HostReg::A0, HostReg::T0);
            self.move_reg(HostReg::A1, HostReg::T4);
            self.call_lite(Helper::LoadMerge { left });
            self.move_reg(HostReg::T4, HostReg::V0);
            return;
        }

        match address {
            Some(address) if matches!(memory_map::classify(address), MemoryRegion::Ram(_)) => {
                self.out.load_imm32(HostReg::T1, memory_map::physical(address));
                self.emit(HostOp::RamLoadMerge { rt: HostReg::T4, addr: HostReg::T1, left });
            },
            Some(address) => {
                self.out.load_imm32(HostReg::A0, address);
                self.move_reg(HostReg::A1, HostReg::T4);
                self.call_lite(Helper::LoadMerge { left });
                self.move_reg(HostReg::T4, HostReg::V0);
            },
            None => {
                let resume = self.out.new_label();
                let slow = self.cold_path(ColdKind::LoadMerge { left }, Some(resume));
                self.branch_outside_ram(slow);
                self.emit(HostOp::RamLoadMerge { rt: HostReg::T4, addr: HostReg::T1, left });
                self.out.bind(resume);
            },
        }
    }

    /// Stores T3.
    fn emit_store_access(&mut self, width: MemWidth, base: usize, offset: u32) {
        match self.effective_address(base, offset) {
            Some(address) => self.emit_constant_store(width, address),
            None => {
                self.check_alignment(width, MIPSExceptionReason::ADES);
                let resume = self.out.new_label();
                let slow = self.cold_path(ColdKind::SlowStore { width }, Some(resume));
                self.branch_if_isolated(slow);
                self.branch_outside_ram(slow);
                self.emit(HostOp::RamStore { rt: HostReg::T3, addr: HostReg::T1, width });
                self.out.bind(resume);
            },
        }
    }

    fn emit_constant_store(&mut self, width: MemWidth, address: u32) {

        if address & (width.bytes() - 1) != 0 {
            self.raise_exception(MIPSExceptionReason::ADES, 0, Some(address));
            return;
        }

        let fast = match memory_map::classify(address) {
            MemoryRegion::Ram(_) => Some(HostOp::RamStore { rt: HostReg::T3, addr: HostReg::T1, width }),
            MemoryRegion::Scratchpad(_) => Some(HostOp::ScratchStore { rt: HostReg::T3, addr: HostReg::T1, width }),
            MemoryRegion::Io(phys) if width == MemWidth::Word => {
                io_register(phys).map(|reg| HostOp::IoStore { rt: HostReg::T3, reg })
            },
            _ => None,
        };

        let Some(op) = fast else {
            self.out.load_imm32(HostReg::A0, address);
            self.move_reg(HostReg::A1, HostReg::T3);
            self.call_lite(Helper::BusWrite { width });
            return;
        };

        // KSEG1 writes go through even with the cache isolated.
        let resume = self.out.new_label();
        if !memory_map::is_kseg1(address) {
            self.out.load_imm32(HostReg::T0, address);
            let slow = self.cold_path(ColdKind::SlowStore { width }, Some(resume));
            self.branch_if_isolated(slow);
        }
        if matches!(op, HostOp::RamStore { .. } | HostOp::ScratchStore { .. }) {
            self.out.load_imm32(HostReg::T1, memory_map::physical(address));
        }
        self.emit(op);
        self.out.bind(resume);
    }

    /// SWL/SWR with the register value already in T3.
    fn emit_store_merge(&mut self, left: bool, base: usize, offset: u32) {

        let address = self.effective_address(base, offset);
        if let Some(address) = address {
            self.out.load_imm32(HostReg::T0, address);
        }

        let inline_ram = match address {
            Some(address) => matches!(memory_map::classify(address), MemoryRegion::Ram(_)),
            None => true,
        };

        if !self.out.supports_unaligned_merge() || !inline_ram {
            self.move_reg(HostReg::A0, HostReg::T0);
            self.move_reg(HostReg::A1, HostReg::T3);
            self.call_lite(Helper::StoreMerge { left });
            return;
        }

        let resume = self.out.new_label();
        let slow = self.cold_path(ColdKind::StoreMerge { left }, Some(resume));
        if !address.is_some_and(memory_map::is_kseg1) {
            self.branch_if_isolated(slow);
        }
        self.branch_outside_ram(slow);
        self.emit(HostOp::RamStoreMerge { rt: HostReg::T3, addr: HostReg::T1, left });
        self.out.bind(resume);
    }
}
