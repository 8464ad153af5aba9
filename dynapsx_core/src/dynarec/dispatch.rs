// SPDX-License-Identifier: GPL-3.0
// dispatch.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::block_cache::{BlockEntry, Probe};
use super::compiler;
use super::context::TranslatorContext;
use super::executor::{BlockExit, HostExecutor};
use super::linker;
use super::stats::DynarecStats;
use crate::bios_hle::BiosHle;
use crate::config::DynarecConfig;
use crate::cpu::r3051::mips_exception::{MIPSException, MIPSExceptionReason};
use crate::cpu::r3051::R3051;
use crate::cpu::CpuBridge;
use crate::error::DynarecError;
use crate::scheduler::Scheduler;
use log::error;

/// Longest stretch run without looking at the interrupt controller.
const MAX_WINDOW: u64 = 1024;

/// Cycles charged for a step that ran no guest instructions.
const MIN_CHARGE: u64 = 8;

/// What one dispatch step did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {

    /// A BIOS call was serviced on the host.
    Hle,

    /// The PC was misaligned and an address error was taken.
    AddressError,

    Executed(BlockExit),
}

/// The outer loop: finds or compiles the block at the guest PC, runs it, and
/// hands control to the scheduler and the interrupt controller between
/// blocks. Owns the cycle counter and the translator.
pub struct Dispatcher {
    config: DynarecConfig,
    context: TranslatorContext,
    hle: BiosHle,
    stats: DynarecStats,
    cycles: u64,
}

impl Dispatcher {

    pub fn new(config: DynarecConfig) -> Self {
        Dispatcher {
            context: TranslatorContext::new(config.code_buffer_capacity),
            config,
            hle: BiosHle::new(),
            stats: DynarecStats::default(),
            cycles: 0,
        }
    }

    /// Cycles executed since power-on.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn stats(&self) -> &DynarecStats {
        &self.stats
    }

    pub fn config(&self) -> &DynarecConfig {
        &self.config
    }

    pub fn context(&self) -> &TranslatorContext {
        &self.context
    }

    /// Console output collected by the BIOS hooks.
    pub fn tty(&self) -> &str {
        self.hle.tty()
    }

    /// Marks every page overlapping `address..address + len` as overwritten,
    /// for writes that bypass translated code.
    pub fn invalidate_range(&mut self, address: u32, len: usize) {
        let page_size = super::block_cache::PAGE_SIZE;
        let first = address & !(page_size - 1);
        let last = address.wrapping_add(len.saturating_sub(1) as u32);
        let mut page = first;
        loop {
            self.context.cache.invalidate_page(page);
            if page >= last & !(page_size - 1) {
                break;
            }
            page = page.wrapping_add(page_size);
        }
    }

    /// Runs until the cycle counter reaches `target`. Scheduler events fire
    /// and interrupts are checked between blocks, at least every
    /// `MAX_WINDOW` cycles.
    pub fn run_until<B: CpuBridge>(
        &mut self,
        cpu: &mut R3051,
        bus: &mut B,
        scheduler: &mut Scheduler<B>,
        target: u64,
    ) -> Result<(), DynarecError> {

        while self.cycles < target {
            let deadline = scheduler
                .next_deadline()
                .unwrap_or(u64::MAX)
                .min(self.cycles + MAX_WINDOW)
                .min(target);

            while self.cycles < deadline {
                if let Err(error) = self.step(cpu, bus, deadline) {
                    error!("halting at cycle {}: {}", self.cycles, error);
                    return Err(error);
                }
            }

            scheduler.dispatch_events(bus, self.cycles);
            Self::check_interrupts(cpu, &*bus);
        }

        Ok(())
    }

    /// Mirrors the interrupt controller into Cause and takes the interrupt
    /// when the CPU accepts it.
    fn check_interrupts(cpu: &mut R3051, bus: &dyn CpuBridge) {
        let pending = bus.check_interrupts() != 0;
        cpu.cop0_mut().set_interrupt_pending(pending);
        if pending && cpu.cop0().interrupts_enabled() {
            let exception = MIPSException::new(MIPSExceptionReason::INT, cpu.pc());
            cpu.enter_exception(&exception);
            cpu.clear_block_aborted();
        }
    }

    /// Runs one block (or services one BIOS call) with the budget left until
    /// `deadline`.
    pub fn step(&mut self, cpu: &mut R3051, bus: &mut dyn CpuBridge, deadline: u64) -> Result<StepOutcome, DynarecError> {

        let pc = cpu.pc();

        if BiosHle::is_hooked(pc) && self.hle.intercept(cpu) {
            self.stats.hle_calls += 1;
            self.cycles += MIN_CHARGE;
            return Ok(StepOutcome::Hle);
        }

        // A register jump left a misaligned PC behind. EPC is the jump.
        if pc & 3 != 0 {
            let exception = MIPSException::new(MIPSExceptionReason::ADEL, cpu.current_pc()).with_bad_address(pc);
            cpu.enter_exception(&exception);
            cpu.clear_block_aborted();
            self.cycles += MIN_CHARGE;
            return Ok(StepOutcome::AddressError);
        }

        let block = self.block_for(bus, pc)?;
        if self.config.direct_linking && self.context.cache.is_indexable(pc) && !BiosHle::is_hooked(pc) {
            self.context.jump_table.insert(pc, block.entry);
        }

        let budget = deadline.saturating_sub(self.cycles).clamp(1, i32::MAX as u64) as i32;
        let TranslatorContext { code, cache, jump_table, .. } = &mut self.context;
        let exit = HostExecutor::new(code, cache, jump_table, cpu, bus).execute(block.entry, budget)?;
        self.stats.blocks_executed += 1;

        let left = exit.cycles_left();
        let consumed = budget as i64 - left as i64;
        self.cycles += if consumed > 0 { consumed as u64 } else { MIN_CHARGE };

        // An idle loop that came back to itself would only burn the rest of
        // the budget one iteration at a time.
        let back_at_start = cpu.pc() == pc && matches!(exit, BlockExit::Normal { .. });
        if self.config.idle_skip && block.is_idle && back_at_start && left > 0 && block.cycles > 0 {
            let cost = block.cycles as u64;
            self.cycles += (left as u64).div_ceil(cost) * cost;
            self.stats.idle_skips += 1;
        }

        Ok(StepOutcome::Executed(exit))
    }

    /// Returns the block for `pc`, compiling (and linking) it when missing
    /// or stale.
    fn block_for(&mut self, bus: &mut dyn CpuBridge, pc: u32) -> Result<BlockEntry, DynarecError> {

        match self.context.cache.probe(pc) {
            Probe::Hit(block) => {
                self.stats.cache_hits += 1;
                return Ok(block);
            },
            Probe::Stale => {
                self.stats.cache_misses += 1;
                self.stats.recompiles += 1;
            },
            Probe::Miss => self.stats.cache_misses += 1,
        }

        if self.context.code.remaining() < self.config.flush_margin {
            self.context.reset();
            self.stats.flushes += 1;
        }

        let block = compiler::compile_block(&mut self.context, &self.config, bus, pc)?;
        self.stats.blocks_compiled += 1;
        self.stats.host_ops_emitted += (self.context.code.cursor() - block.entry) as u64;

        if self.context.cache.insert(pc, block).is_some() {
            self.stats.links_patched += linker::resolve_patches(
                &mut self.context.code,
                &mut self.context.patches,
                pc,
                block.body,
            );
        }

        Ok(block)
    }
}
