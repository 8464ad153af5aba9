// SPDX-License-Identifier: GPL-3.0
// executor.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::block_cache::{BlockCache, JumpHashTable};
use super::code_buffer::{CodeAddr, CodeBuffer};
use super::host::{
    AluImmOp, AluOp, BranchCond, CallSite, Helper, HostOp, HostReg, IoRegister, MemWidth, ShiftOp,
    StateField, HOST_REGISTER_COUNT,
};
use crate::cpu::r3051::cp0::{CAUSE, SR, SR_ISOLATE_CACHE};
use crate::cpu::r3051::mips_exception::MIPSException;
use crate::cpu::r3051::R3051;
use crate::cpu::{self, CpuBridge};
use crate::error::DynarecError;
use crate::memory_map::{self, MemoryRegion, RAM_MASK, SCRATCHPAD_SIZE};
use dynapsx_utility::CustomInteger;
use log::trace;

/// How a run of translated code ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockExit {

    /// The code left through an exit: budget exhausted, a register jump
    /// that missed the hash table, or an unlinked successor.
    Normal { cycles_left: i32 },

    /// A guest exception was taken; the PC already points at its vector.
    Fault { cycles_left: i32, cause: u32 },
}

impl BlockExit {
    pub fn cycles_left(&self) -> i32 {
        match *self {
            BlockExit::Normal { cycles_left } | BlockExit::Fault { cycles_left, .. } => cycles_left,
        }
    }
}

/// Runs code from the code buffer against the guest CPU state and the bus.
/// Control only comes back when the code returns through the exit
/// trampoline.
pub struct HostExecutor<'a> {
    code: &'a CodeBuffer,
    cache: &'a mut BlockCache,
    jump_table: &'a mut JumpHashTable,
    cpu: &'a mut R3051,
    bus: &'a mut dyn CpuBridge,
    regs: [u32; HOST_REGISTER_COUNT],
}

fn load_from(memory: &[u8], offset: u32, width: MemWidth, signed: bool) -> u32 {
    match width {
        MemWidth::Byte => {
            let value = memory[offset as usize & (memory.len() - 1)] as u32;
            if signed { value.sign_extend(7) } else { value }
        },
        MemWidth::Half => {
            let value = cpu::read_le_half(memory, offset) as u32;
            if signed { value.sign_extend(15) } else { value }
        },
        MemWidth::Word => cpu::read_le_word(memory, offset),
    }
}

fn store_to(memory: &mut [u8], offset: u32, width: MemWidth, value: u32) {
    match width {
        MemWidth::Byte => {
            let index = offset as usize & (memory.len() - 1);
            memory[index] = value as u8;
        },
        MemWidth::Half => cpu::write_le_half(memory, offset, value as u16),
        MemWidth::Word => cpu::write_le_word(memory, offset, value),
    }
}

fn alu(op: AluOp, a: u32, b: u32) -> u32 {
    match op {
        AluOp::Addu => a.wrapping_add(b),
        AluOp::Subu => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Nor => !(a | b),
        AluOp::Slt => ((a as i32) < (b as i32)) as u32,
        AluOp::Sltu => (a < b) as u32,
    }
}

fn alu_imm(op: AluImmOp, a: u32, imm: u16) -> u32 {
    let simm = (imm as u32).sign_extend(15);
    match op {
        AluImmOp::Addiu => a.wrapping_add(simm),
        AluImmOp::Slti => ((a as i32) < (simm as i32)) as u32,
        AluImmOp::Sltiu => (a < simm) as u32,
        AluImmOp::Andi => a & imm as u32,
        AluImmOp::Ori => a | imm as u32,
        AluImmOp::Xori => a ^ imm as u32,
    }
}

fn shift(op: ShiftOp, value: u32, amount: u32) -> u32 {
    let amount = amount & 31;
    match op {
        ShiftOp::Sll => value << amount,
        ShiftOp::Srl => value.logical_rshift(amount),
        ShiftOp::Sra => ((value as i32) >> amount) as u32,
    }
}

fn branch_taken(cond: BranchCond, lhs: u32, rhs: u32) -> bool {
    match cond {
        BranchCond::Eq => lhs == rhs,
        BranchCond::Ne => lhs != rhs,
        BranchCond::Ltz => (lhs as i32) < 0,
        BranchCond::Gez => (lhs as i32) >= 0,
        BranchCond::Gtz => (lhs as i32) > 0,
        BranchCond::Lez => (lhs as i32) <= 0,
    }
}

impl<'a> HostExecutor<'a> {

    pub fn new(
        code: &'a CodeBuffer,
        cache: &'a mut BlockCache,
        jump_table: &'a mut JumpHashTable,
        cpu: &'a mut R3051,
        bus: &'a mut dyn CpuBridge,
    ) -> Self {
        HostExecutor {
            code,
            cache,
            jump_table,
            cpu,
            bus,
            regs: [0; HOST_REGISTER_COUNT],
        }
    }

    #[inline(always)]
    fn get(&self, reg: HostReg) -> u32 {
        self.regs[reg.index()]
    }

    #[inline(always)]
    fn set(&mut self, reg: HostReg, value: u32) {
        let index = reg.index();
        if index != 0 {
            self.regs[index] = value;
        }
    }

    /// Runs from `entry` with `budget` cycles until the code returns.
    pub fn execute(&mut self, entry: CodeAddr, budget: i32) -> Result<BlockExit, DynarecError> {

        self.regs = [0; HOST_REGISTER_COUNT];
        self.set(HostReg::CYC, budget as u32);
        let mut pc = entry;

        loop {
            let op = *self.code.get(pc).ok_or(DynarecError::InvalidCodeAddress { addr: pc })?;
            pc += 1;

            match op {
                HostOp::Lui { rt, imm } => self.set(rt, (imm as u32) << 16),
                HostOp::AluImm { op, rt, rs, imm } => {
                    let value = alu_imm(op, self.get(rs), imm);
                    self.set(rt, value);
                },
                HostOp::Alu { op, rd, rs, rt } => {
                    let value = alu(op, self.get(rs), self.get(rt));
                    self.set(rd, value);
                },
                HostOp::Shift { op, rd, rt, shamt } => {
                    let value = shift(op, self.get(rt), shamt as u32);
                    self.set(rd, value);
                },
                HostOp::ShiftVar { op, rd, rt, rs } => {
                    let value = shift(op, self.get(rt), self.get(rs));
                    self.set(rd, value);
                },
                HostOp::MulWide { signed, hi, lo, lhs, rhs } => {
                    let (a, b) = (self.get(lhs), self.get(rhs));
                    let product = if signed {
                        (a as i32 as i64).wrapping_mul(b as i32 as i64) as u64
                    } else {
                        (a as u64) * (b as u64)
                    };
                    self.set(hi, (product >> 32) as u32);
                    self.set(lo, product as u32);
                },
                HostOp::LoadState { rt, field } => {
                    let value = self.read_field(field);
                    self.set(rt, value);
                },
                HostOp::StoreState { rt, field } => self.write_field(field, self.get(rt)),

                HostOp::RamLoad { rt, addr, width, signed } => {
                    let value = load_from(self.bus.ram(), self.get(addr) & RAM_MASK, width, signed);
                    self.set(rt, value);
                },
                HostOp::RamStore { rt, addr, width } => {
                    let offset = self.get(addr) & RAM_MASK;
                    let value = self.get(rt);
                    store_to(self.bus.ram_mut(), offset, width, value);
                    self.cache.note_ram_write(offset);
                },
                HostOp::ScratchLoad { rt, addr, width, signed } => {
                    let offset = self.get(addr) & (SCRATCHPAD_SIZE as u32 - 1);
                    let value = load_from(self.bus.scratchpad(), offset, width, signed);
                    self.set(rt, value);
                },
                HostOp::ScratchStore { rt, addr, width } => {
                    let offset = self.get(addr) & (SCRATCHPAD_SIZE as u32 - 1);
                    let value = self.get(rt);
                    store_to(self.bus.scratchpad_mut(), offset, width, value);
                },
                HostOp::RamLoadMerge { rt, addr, left } => {
                    let address = self.get(addr);
                    let word = cpu::read_le_word(self.bus.ram(), address & RAM_MASK);
                    let value = if left {
                        cpu::merge_load_left(self.get(rt), word, address & 3)
                    } else {
                        cpu::merge_load_right(self.get(rt), word, address & 3)
                    };
                    self.set(rt, value);
                },
                HostOp::RamStoreMerge { rt, addr, left } => {
                    let address = self.get(addr);
                    let offset = address & RAM_MASK;
                    let memory = cpu::read_le_word(self.bus.ram(), offset);
                    let value = if left {
                        cpu::merge_store_left(memory, self.get(rt), address & 3)
                    } else {
                        cpu::merge_store_right(memory, self.get(rt), address & 3)
                    };
                    cpu::write_le_word(self.bus.ram_mut(), offset, value);
                    self.cache.note_ram_write(offset);
                },
                HostOp::IoLoad { rt, reg } => {
                    let value = match reg {
                        IoRegister::InterruptStatus => self.bus.interrupt_status(),
                        IoRegister::InterruptMask => self.bus.interrupt_mask(),
                        IoRegister::GpuStatus => self.bus.gpu_status(),
                    };
                    self.set(rt, value);
                },
                HostOp::IoStore { rt, reg } => {
                    let value = self.get(rt);
                    match reg {
                        IoRegister::InterruptStatus => self.bus.acknowledge_interrupts(value),
                        IoRegister::InterruptMask => self.bus.set_interrupt_mask(value),
                        IoRegister::GpuStatus => {},
                    }
                },

                HostOp::Branch { cond, lhs, rhs, target } => {
                    if branch_taken(cond, self.get(lhs), self.get(rhs)) {
                        pc = target;
                    }
                },
                HostOp::Jump { target } => pc = target,
                HostOp::JumpIndirect { key, miss } => {
                    pc = self.jump_table.lookup(self.get(key)).unwrap_or(miss);
                },
                HostOp::GuardPage { page, generation, stale } => {
                    if self.cache.page_generation(page) != generation {
                        pc = stale;
                    }
                },
                HostOp::Call { helper, site } => self.call(helper, site),
                HostOp::Return => return Ok(self.finish()),
            }
        }
    }

    fn finish(&mut self) -> BlockExit {
        let cycles_left = self.get(HostReg::CYC) as i32;
        if self.cpu.block_aborted() {
            self.cpu.clear_block_aborted();
            let cause = (self.cpu.cop0().raw(CAUSE) >> 2) & 0x1F;
            BlockExit::Fault { cycles_left, cause }
        } else {
            BlockExit::Normal { cycles_left }
        }
    }

    fn read_field(&self, field: StateField) -> u32 {
        match field {
            StateField::Gpr(reg) => self.cpu.gpr(reg as usize),
            StateField::Hi => self.cpu.hi(),
            StateField::Lo => self.cpu.lo(),
            StateField::Pc => self.cpu.pc(),
            StateField::CurrentPc => self.cpu.current_pc(),
            StateField::Cop0(reg) => self.cpu.cop0().raw(reg as usize),
            StateField::LoadDelayReg => self.cpu.load_delay_reg(),
            StateField::LoadDelayValue => self.cpu.load_delay_value(),
            StateField::Aborted => self.cpu.block_aborted() as u32,
        }
    }

    fn write_field(&mut self, field: StateField, value: u32) {
        match field {
            StateField::Gpr(reg) => self.cpu.set_gpr(reg as usize, value),
            StateField::Hi => self.cpu.set_hi(value),
            StateField::Lo => self.cpu.set_lo(value),
            StateField::Pc => self.cpu.set_pc(value),
            StateField::CurrentPc => self.cpu.set_current_pc(value),
            StateField::Cop0(reg) => self.cpu.cop0_mut().write_reg(reg as usize, value, true),
            StateField::LoadDelayReg => self.cpu.set_load_delay_reg(value),
            StateField::LoadDelayValue => self.cpu.set_load_delay_value(value),
            StateField::Aborted => {
                if value == 0 {
                    self.cpu.clear_block_aborted();
                }
            },
        }
    }

    fn cache_isolated(&self) -> bool {
        self.cpu.cop0().raw(SR) & SR_ISOLATE_CACHE != 0
    }

    /// A bus write from translated code. With the cache isolated only KSEG1
    /// writes reach the bus.
    fn bus_write(&mut self, address: u32, value: u32, width: MemWidth) {
        if self.cache_isolated() && !memory_map::is_kseg1(address) {
            return;
        }
        if let MemoryRegion::Ram(offset) = memory_map::classify(address) {
            self.cache.note_ram_write(offset);
        }
        match width {
            MemWidth::Byte => self.bus.write_byte(address, value as u8),
            MemWidth::Half => self.bus.write_half(address, value as u16),
            MemWidth::Word => self.bus.write_word(address, value),
        }
    }

    fn call(&mut self, helper: Helper, site: CallSite) {

        let a0 = self.get(HostReg::A0);
        let a1 = self.get(HostReg::A1);
        trace!("helper {:?} for {:#010x} (a0 {:#010x}, a1 {:#010x})", helper, site.guest_pc, a0, a1);

        match helper {
            Helper::BusRead { width, signed } => {
                let value = match width {
                    MemWidth::Byte => {
                        let value = self.bus.read_byte(a0) as u32;
                        if signed { value.sign_extend(7) } else { value }
                    },
                    MemWidth::Half => {
                        let value = self.bus.read_half(a0) as u32;
                        if signed { value.sign_extend(15) } else { value }
                    },
                    MemWidth::Word => self.bus.read_word(a0),
                };
                self.set(HostReg::V0, value);
            },
            Helper::BusWrite { width } => self.bus_write(a0, a1, width),
            Helper::LoadMerge { left } => {
                let word = self.bus.read_word(a0 & !3);
                let value = if left {
                    cpu::merge_load_left(a1, word, a0 & 3)
                } else {
                    cpu::merge_load_right(a1, word, a0 & 3)
                };
                self.set(HostReg::V0, value);
            },
            Helper::StoreMerge { left } => {
                let memory = self.bus.read_word(a0 & !3);
                let value = if left {
                    cpu::merge_store_left(memory, a1, a0 & 3)
                } else {
                    cpu::merge_store_right(memory, a1, a0 & 3)
                };
                self.bus_write(a0 & !3, value, MemWidth::Word);
            },
            Helper::Divide { signed } => {
                if signed {
                    self.cpu.divide(a0, a1);
                } else {
                    self.cpu.divide_unsigned(a0, a1);
                }
            },
            Helper::Exception { reason, coprocessor } => {
                let exception = MIPSException::new(reason, site.guest_pc)
                    .with_bad_address(a0)
                    .with_co_processor(coprocessor)
                    .in_branch_delay_slot(site.delay_slot);
                self.cpu.enter_exception(&exception);
            },
            Helper::ReadCop0 { reg } => {
                let value = self.cpu.cop0().read_reg(reg as usize);
                self.set(HostReg::V0, value);
            },
            Helper::WriteCop0 { reg } => self.cpu.cop0_mut().write_reg(reg as usize, a0, false),
            Helper::ReturnFromException => self.cpu.cop0_mut().rfe(),
            Helper::GteRead { control, reg } => {
                let gte = self.cpu.gte_mut();
                let value = if control { gte.read_control(reg as usize) } else { gte.read_data(reg as usize) };
                self.set(HostReg::V0, value);
            },
            Helper::GteWrite { control, reg } => {
                let gte = self.cpu.gte_mut();
                if control {
                    gte.write_control(reg as usize, a0);
                } else {
                    gte.write_data(reg as usize, a0);
                }
            },
            Helper::GteCommand { command } => self.cpu.gte_mut().execute(command),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::motherboard::psx_motherboard::PsxMotherboard;

    fn run(ops: &[HostOp], cpu: &mut R3051, bus: &mut PsxMotherboard) -> BlockExit {
        let mut code = CodeBuffer::new(64);
        for &op in ops {
            code.push(op);
        }
        let mut cache = BlockCache::new();
        let mut jump_table = JumpHashTable::new();
        let mut executor = HostExecutor::new(&code, &mut cache, &mut jump_table, cpu, bus);
        executor.execute(0, 100).unwrap()
    }

    #[test]
    fn execute_should_write_guest_state_and_report_the_budget() {

        // Given a sequence that builds a constant and stores it to r8,
        // r8 should hold it and the untouched budget should come back.
        let mut cpu = R3051::new();
        let mut bus = PsxMotherboard::new();
        let exit = run(&[
            HostOp::Lui { rt: HostReg::T0, imm: 0x1234 },
            HostOp::AluImm { op: AluImmOp::Ori, rt: HostReg::T0, rs: HostReg::T0, imm: 0x5678 },
            HostOp::StoreState { rt: HostReg::T0, field: StateField::Gpr(8) },
            HostOp::Return,
        ], &mut cpu, &mut bus);

        assert_eq!(cpu.gpr(8), 0x1234_5678);
        assert_eq!(exit, BlockExit::Normal { cycles_left: 100 });
    }

    #[test]
    fn execute_should_report_a_fault_after_an_exception_helper() {

        // Given a syscall helper call, the exit should be a fault with code 8.
        let mut cpu = R3051::new();
        let mut bus = PsxMotherboard::new();
        let site = CallSite { guest_pc: 0x8001_0000, delay_slot: false };
        let exit = run(&[
            HostOp::Call {
                helper: Helper::Exception { reason: crate::cpu::r3051::mips_exception::MIPSExceptionReason::SYS, coprocessor: 0 },
                site,
            },
            HostOp::Return,
        ], &mut cpu, &mut bus);

        assert_eq!(exit, BlockExit::Fault { cycles_left: 100, cause: 8 });
        assert!(!cpu.block_aborted());
    }

    #[test]
    fn writes_to_the_zero_register_should_be_ignored() {

        let mut cpu = R3051::new();
        let mut bus = PsxMotherboard::new();
        run(&[
            HostOp::AluImm { op: AluImmOp::Addiu, rt: HostReg::ZERO, rs: HostReg::ZERO, imm: 5 },
            HostOp::StoreState { rt: HostReg::ZERO, field: StateField::Gpr(9) },
            HostOp::Return,
        ], &mut cpu, &mut bus);

        assert_eq!(cpu.gpr(9), 0);
    }

    #[test]
    fn alu_immediates_should_extend_by_operation() {
        assert_eq!(alu_imm(AluImmOp::Addiu, 0, 0xFFFF), 0xFFFF_FFFF);
        assert_eq!(alu_imm(AluImmOp::Andi, 0xFFFF_FFFF, 0xFFFF), 0x0000_FFFF);
        assert_eq!(alu_imm(AluImmOp::Slti, 0xFFFF_FFFE, 0xFFFF), 1);
    }
}
