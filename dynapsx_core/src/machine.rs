// SPDX-License-Identifier: GPL-3.0
// machine.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::config::{DynarecConfig, Region};
use crate::cpu::r3051::R3051;
use crate::dynarec::dispatch::{Dispatcher, StepOutcome};
use crate::dynarec::stats::DynarecStats;
use crate::error::DynarecError;
use crate::motherboard::psx_motherboard::PsxMotherboard;
use crate::scheduler::{EventId, Scheduler, CYCLES_PER_FRAME_NTSC, CYCLES_PER_FRAME_PAL};
use log::info;

fn frame_cycles(region: Region) -> u64 {
    match region {
        Region::Ntsc => CYCLES_PER_FRAME_NTSC,
        Region::Pal => CYCLES_PER_FRAME_PAL,
    }
}

/// Starts a vertical blank and books the next one a frame later.
fn vblank_event(motherboard: &mut PsxMotherboard, scheduler: &mut Scheduler<PsxMotherboard>, deadline: u64) {
    motherboard.start_vblank();
    let next = deadline + frame_cycles(motherboard.region());
    scheduler.schedule_event(EventId::VBlank, next, vblank_event);
}

/// The whole console as far as the CPU is concerned: the R3051, the
/// motherboard it talks to, the event scheduler and the recompiler driving
/// them. Everything is owned here and nothing is shared between threads.
pub struct PsxMachine {
    cpu: R3051,
    motherboard: PsxMotherboard,
    scheduler: Scheduler<PsxMotherboard>,
    dispatcher: Dispatcher,
}

impl PsxMachine {

    /// Creates a machine in its reset state, with the first vertical blank
    /// a frame away.
    pub fn new(config: DynarecConfig) -> Self {

        let mut motherboard = PsxMotherboard::new();
        motherboard.set_region(config.region);

        let mut scheduler = Scheduler::new();
        scheduler.schedule_event(EventId::VBlank, frame_cycles(config.region), vblank_event);

        PsxMachine {
            cpu: R3051::new(),
            motherboard,
            scheduler,
            dispatcher: Dispatcher::new(config),
        }
    }

    /// Installs a BIOS image. The CPU starts from it on reset.
    pub fn load_bios(&mut self, bios: &[u8]) -> Result<(), DynarecError> {
        self.motherboard.load_bios(bios)?;
        info!("BIOS loaded, starting at {:#010x}", self.cpu.pc());
        Ok(())
    }

    /// Copies an executable image into RAM and points the CPU at it with
    /// the given stack (sp and fp). Code already compiled from the
    /// overwritten pages goes stale.
    pub fn load_executable(&mut self, address: u32, image: &[u8], entry_pc: u32, stack_pointer: u32) -> Result<(), DynarecError> {
        self.motherboard.load_ram(address, image)?;
        self.dispatcher.invalidate_range(address, image.len());
        self.cpu.set_pc(entry_pc);
        self.cpu.set_gpr(29, stack_pointer);
        self.cpu.set_gpr(30, stack_pointer);
        info!("loaded {} byte image at {:#010x}, entry {:#010x}", image.len(), address, entry_pc);
        Ok(())
    }

    /// Runs until the cycle counter reaches `target`.
    pub fn run_until(&mut self, target: u64) -> Result<(), DynarecError> {
        self.dispatcher.run_until(&mut self.cpu, &mut self.motherboard, &mut self.scheduler, target)
    }

    /// Runs for `cycles` more cycles.
    pub fn run_for(&mut self, cycles: u64) -> Result<(), DynarecError> {
        let target = self.dispatcher.cycles().saturating_add(cycles);
        self.run_until(target)
    }

    /// Runs a single block with the budget left until the next event, without
    /// dispatching events or checking interrupts.
    pub fn step_block(&mut self) -> Result<StepOutcome, DynarecError> {
        let cycles = self.dispatcher.cycles();
        let deadline = self.scheduler.next_deadline().unwrap_or(u64::MAX).max(cycles + 1);
        self.dispatcher.step(&mut self.cpu, &mut self.motherboard, deadline)
    }

    pub fn cycles(&self) -> u64 {
        self.dispatcher.cycles()
    }

    pub fn cpu(&self) -> &R3051 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut R3051 {
        &mut self.cpu
    }

    pub fn motherboard(&self) -> &PsxMotherboard {
        &self.motherboard
    }

    pub fn motherboard_mut(&mut self) -> &mut PsxMotherboard {
        &mut self.motherboard
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> &DynarecStats {
        self.dispatcher.stats()
    }

    /// Console output: the BIOS putchar hooks followed by the expansion
    /// port debug TTY.
    pub fn tty_output(&self) -> String {
        format!("{}{}", self.dispatcher.tty(), self.motherboard.expansion_tty())
    }
}
