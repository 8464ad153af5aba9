// SPDX-License-Identifier: GPL-3.0
// analysis.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::decode::{self, Instruction, RegSet, ALL_REGISTERS};
use crate::config::DynarecConfig;
use crate::error::DynarecError;
use log::trace;

/// Where an instruction sits in the block's control flow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Normal,

    /// A branch or jump. A continuation is a conditional branch the block
    /// compiles past, with its taken path exiting from cold code.
    Branch { continuation: bool },

    DelaySlot,
}

/// Why the scan stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    Branch,
    Exception,
    LengthCap,
}

/// One instruction of a block plan.
#[derive(Copy, Clone, Debug)]
pub struct ScannedInstruction {
    pub pc: u32,
    pub word: u32,
    pub instruction: Instruction,
    pub role: Role,

    /// False when dead-code elimination omits the instruction.
    pub live: bool,

    /// Cycles charged for this instruction, interlock stalls included.
    pub cycles: u32,

    /// For loads: the value must wait in the load delay slot because the
    /// next instruction reads the target (or loads it again).
    pub deferred: bool,
}

/// The result of scanning and analysing one block.
#[derive(Clone, Debug)]
pub struct BlockPlan {
    pub pc: u32,
    pub instructions: Vec<ScannedInstruction>,
    pub end: EndReason,
    pub total_cycles: u32,
    pub is_idle: bool,
}

impl BlockPlan {

    /// Address just past the last instruction of the block.
    pub fn end_pc(&self) -> u32 {
        self.pc.wrapping_add(4 * self.instructions.len() as u32)
    }
}

/// Scans forward from `pc` until a control transfer plus its delay slot, a
/// syscall/break, or the length cap. Conditional branches are compiled past
/// while continuations remain.
pub fn scan<F>(pc: u32, config: &DynarecConfig, mut fetch: F) -> Result<BlockPlan, DynarecError>
where
    F: FnMut(u32) -> Option<u32>,
{
    let limit = config.block_instruction_limit();
    let mut continuations_left = config.superblock_continuations;
    let mut instructions: Vec<ScannedInstruction> = Vec::new();
    let mut current = pc;

    let end = loop {
        if instructions.len() >= limit {
            break EndReason::LengthCap;
        }

        let word = match fetch(current) {
            Some(word) => word,
            None if instructions.is_empty() => return Err(DynarecError::UnmappedPc { pc }),

            // Stop before unmapped memory; the next dispatch reports it.
            None => break EndReason::LengthCap,
        };
        let instruction = decode::decode(word);

        if instruction.is_control_transfer() {
            let delay_pc = current.wrapping_add(4);
            let delay_word = fetch(delay_pc).ok_or(DynarecError::UnmappedPc { pc: delay_pc })?;

            let continuation = instruction.is_conditional_branch()
                && instruction.static_target(current) != Some(pc)
                && continuations_left > 0
                && instructions.len() + 2 < limit;

            instructions.push(scanned(current, word, instruction, Role::Branch { continuation }));
            instructions.push(scanned(delay_pc, delay_word, decode::decode(delay_word), Role::DelaySlot));

            if !continuation {
                break EndReason::Branch;
            }
            continuations_left -= 1;
            current = current.wrapping_add(8);
            continue;
        }

        instructions.push(scanned(current, word, instruction, Role::Normal));
        if instruction.is_exception() {
            break EndReason::Exception;
        }
        current = current.wrapping_add(4);
    };

    Ok(BlockPlan {
        pc,
        instructions,
        end,
        total_cycles: 0,
        is_idle: false,
    })
}

fn scanned(pc: u32, word: u32, instruction: Instruction, role: Role) -> ScannedInstruction {
    ScannedInstruction { pc, word, instruction, role, live: true, cycles: 0, deferred: false }
}

/// Runs every analysis pass over a freshly scanned plan.
pub fn analyse(plan: &mut BlockPlan, config: &DynarecConfig) {
    if config.dead_code_elimination {
        eliminate_dead_code(plan);
    }
    decide_load_deferral(plan);
    assign_cycles(plan);
    plan.is_idle = is_idle_loop(plan);

    trace!(
        "planned block {:#010x}: {} instructions, {} cycles, end {:?}, idle {}",
        plan.pc, plan.instructions.len(), plan.total_cycles, plan.end, plan.is_idle
    );
}

/// Backward liveness pass. Everything is live at the end of the block, at
/// delay slots and at instructions that can fault. Loads never kill their
/// destination, since the old value stays visible for one more instruction.
pub fn eliminate_dead_code(plan: &mut BlockPlan) {

    let mut live: RegSet = ALL_REGISTERS;
    for scanned in plan.instructions.iter_mut().rev() {

        let instruction = &scanned.instruction;
        let writes = instruction.writes();

        if scanned.role != Role::DelaySlot && instruction.is_pure() && writes & live == 0 {
            scanned.live = false;
            continue;
        }
        scanned.live = true;

        let kills = if instruction.is_load() { 0 } else { writes };
        live = (live & !kills) | instruction.reads();

        if scanned.role == Role::DelaySlot || instruction.can_fault() {
            live = ALL_REGISTERS;
        }
    }
}

/// Marks the loads whose value has to wait in the delay slot: those followed,
/// inside the block, by an instruction that reads the target or loads it again.
/// Loads in a delay slot or at the very end write straight through.
pub fn decide_load_deferral(plan: &mut BlockPlan) {

    let count = plan.instructions.len();
    for index in 0..count {
        let current = plan.instructions[index];
        let Some(target) = current.instruction.load_target() else {
            continue;
        };
        if current.role == Role::DelaySlot || index + 1 >= count {
            continue;
        }

        let next = &plan.instructions[index + 1].instruction;
        let bit = decode::reg_bit(target);
        plan.instructions[index].deferred = next.reads() & bit != 0 || next.load_target() == Some(target);
    }
}

/// Base cost of an instruction in CPU cycles.
pub fn base_cycles(instruction: &Instruction) -> u32 {
    use decode::MulDivKind;
    match instruction {
        Instruction::MulDiv { kind: MulDivKind::Mult | MulDivKind::Multu, .. } => 6,
        Instruction::MulDiv { kind: MulDivKind::Div | MulDivKind::Divu, .. } => 36,
        Instruction::Load { .. } | Instruction::LoadCop2 { .. } => 2,
        _ => 1,
    }
}

/// Cycles a GTE command keeps the coprocessor busy, by function field.
pub fn gte_command_latency(command: u32) -> u32 {
    match command & 0x3F {
        0x01 => 15, // RTPS
        0x06 => 8,  // NCLIP
        0x0C => 6,  // OP
        0x10 => 8,  // DPCS
        0x11 => 8,  // INTPL
        0x12 => 8,  // MVMVA
        0x13 => 19, // NCDS
        0x14 => 13, // CDP
        0x16 => 44, // NCDT
        0x1B => 17, // NCCS
        0x1C => 11, // CC
        0x1E => 14, // NCS
        0x20 => 30, // NCT
        0x28 => 5,  // SQR
        0x29 => 8,  // DCPL
        0x2A => 17, // DPCT
        0x2D => 5,  // AVSZ3
        0x2E => 6,  // AVSZ4
        0x30 => 23, // RTPT
        0x3D => 5,  // GPF
        0x3E => 5,  // GPL
        0x3F => 39, // NCCT
        _ => 8,
    }
}

/// Assigns per-instruction cycle costs. GTE commands run asynchronously: the
/// cost of each later instruction elapses the command's latency, and a reader
/// or a second command that arrives early stalls for the rest of it plus one.
pub fn assign_cycles(plan: &mut BlockPlan) {

    let mut gte_busy: u32 = 0;
    let mut total: u32 = 0;

    for scanned in plan.instructions.iter_mut() {
        let instruction = &scanned.instruction;
        let mut cost = base_cycles(instruction);

        let command = match instruction {
            Instruction::Cop2Command { command } => Some(*command),
            _ => None,
        };

        if (instruction.reads_gte() || command.is_some()) && gte_busy > 0 {
            cost += gte_busy + 1;
            gte_busy = 0;
        }

        match command {
            Some(command) => gte_busy = gte_command_latency(command),
            None => gte_busy = gte_busy.saturating_sub(cost),
        }

        scanned.cycles = cost;
        total += cost;
    }

    plan.total_cycles = total;
}

/// An idle loop branches back to its own start and cannot change anything a
/// later iteration would observe: no stores, exceptions, coprocessor traffic,
/// HI/LO traffic or continuations, and every register it writes is rewritten
/// before it is read. Running it again only burns cycles.
pub fn is_idle_loop(plan: &BlockPlan) -> bool {

    if plan.end != EndReason::Branch {
        return false;
    }

    let count = plan.instructions.len();
    let Some(terminator) = count.checked_sub(2).map(|index| &plan.instructions[index]) else {
        return false;
    };
    if terminator.instruction.static_target(terminator.pc) != Some(plan.pc) {
        return false;
    }

    let side_effects = plan.instructions.iter().any(|scanned| {
        let instruction = &scanned.instruction;
        matches!(scanned.role, Role::Branch { continuation: true })
            || instruction.is_store()
            || instruction.is_exception()
            || instruction.is_coprocessor_access()
            || matches!(instruction, Instruction::CopUnusable { .. })
            || instruction.uses_hi_lo()
    });
    if side_effects {
        return false;
    }

    // Registers the loop writes must be defined in the same iteration before
    // any read. A load's result becomes visible two instructions later.
    let written: RegSet = plan.instructions.iter().fold(0, |set, scanned| set | scanned.instruction.writes());
    let mut visible: RegSet = 0;
    let mut in_flight: RegSet = 0;

    for scanned in &plan.instructions {
        let instruction = &scanned.instruction;
        if instruction.reads() & written & !visible != 0 {
            return false;
        }

        visible |= in_flight;
        in_flight = 0;
        if instruction.is_load() {
            in_flight = instruction.writes();
        } else {
            visible |= instruction.writes();
        }
    }

    true
}

#[cfg(test)]
mod tests;
