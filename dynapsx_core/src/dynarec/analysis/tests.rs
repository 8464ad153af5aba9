// SPDX-License-Identifier: GPL-3.0
// tests.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::config::DynarecConfig;
use crate::error::DynarecError;
use crate::test_support::asm::*;
use crate::test_support::{plan_for, PROGRAM_BASE};
use super::{scan, EndReason, Role};

// Tests for block scanning and the analysis passes.

#[test]
fn scan_should_include_the_delay_slot() {

    let config = DynarecConfig::new();
    let plan = plan_for(&[addiu(1, 1, 1), jr(31), addiu(2, 0, 5), addiu(3, 0, 7)], &config);

    assert_eq!(plan.instructions.len(), 3);
    assert_eq!(plan.instructions[2].role, Role::DelaySlot);
    assert_eq!(plan.end, EndReason::Branch);
    assert_eq!(plan.end_pc(), PROGRAM_BASE + 12);
}

#[test]
fn scan_should_stop_at_the_length_cap() {

    let mut config = DynarecConfig::new();
    config.max_block_instructions = 1;
    let plan = plan_for(&[addiu(1, 1, 1), addiu(1, 1, 1)], &config);

    assert_eq!(plan.instructions.len(), 1);
    assert_eq!(plan.end, EndReason::LengthCap);
}

#[test]
fn scan_should_stop_after_syscall() {

    let config = DynarecConfig::new();
    let plan = plan_for(&[addiu(1, 1, 1), syscall(), addiu(1, 1, 1)], &config);

    assert_eq!(plan.instructions.len(), 2);
    assert_eq!(plan.end, EndReason::Exception);
}

#[test]
fn scan_should_continue_past_forward_branches() {

    let config = DynarecConfig::new();
    let program = [
        beq(1, 2, 4), nop(),
        addiu(3, 0, 1),
        bne(1, 2, 4), nop(),
        addiu(3, 0, 2),
        beq(1, 0, 4), nop(),
        addiu(3, 0, 3),
    ];
    let plan = plan_for(&program, &config);

    // Given two continuations, the third conditional branch ends the block.
    assert_eq!(plan.instructions[0].role, Role::Branch { continuation: true });
    assert_eq!(plan.instructions[3].role, Role::Branch { continuation: true });
    assert_eq!(plan.instructions[6].role, Role::Branch { continuation: false });
    assert_eq!(plan.instructions.len(), 8);
}

#[test]
fn scan_should_report_unmapped_start() {

    let config = DynarecConfig::new();
    let result = scan(0x1F00_0000, &config, |_| None);

    assert!(matches!(result, Err(DynarecError::UnmappedPc { pc: 0x1F00_0000 })));
}

#[test]
fn dead_pure_instructions_should_be_omitted() {

    let config = DynarecConfig::new();

    // r1 is overwritten before anyone reads it.
    let plan = plan_for(&[addiu(1, 0, 5), addiu(1, 0, 6), addu(2, 1, 1), jr(31), nop()], &config);

    assert!(!plan.instructions[0].live);
    assert!(plan.instructions[1].live);
    assert!(plan.instructions[2].live);
}

#[test]
fn faulting_instructions_should_keep_everything_live() {

    let config = DynarecConfig::new();

    // The store can fault, so r1 must hold its value when it runs.
    let plan = plan_for(&[addiu(1, 0, 5), sw(0, 4, 0), addiu(1, 0, 6), jr(31), nop()], &config);

    assert!(plan.instructions[0].live);
}

#[test]
fn dead_code_elimination_can_be_disabled() {

    let mut config = DynarecConfig::new();
    config.dead_code_elimination = false;
    let plan = plan_for(&[addiu(1, 0, 5), addiu(1, 0, 6), jr(31), nop()], &config);

    assert!(plan.instructions.iter().all(|scanned| scanned.live));
}

#[test]
fn loads_should_defer_only_when_the_next_instruction_reads_the_target() {

    let config = DynarecConfig::new();
    let plan = plan_for(
        &[lw(2, 3, 0), addu(4, 2, 2), lw(5, 3, 0), addu(6, 0, 0), lw(7, 3, 0), lw(7, 3, 4), jr(31), lw(8, 3, 0)],
        &config,
    );

    assert!(plan.instructions[0].deferred);
    assert!(!plan.instructions[2].deferred);
    assert!(plan.instructions[4].deferred);
    assert!(!plan.instructions[7].deferred);
}

#[test]
fn cycle_costs_should_follow_the_instruction_table() {

    let config = DynarecConfig::new();
    let plan = plan_for(&[mult(1, 2), div(1, 2), lw(3, 4, 0), sw(3, 4, 0), jr(31), nop()], &config);

    let costs: Vec<u32> = plan.instructions.iter().map(|scanned| scanned.cycles).collect();
    assert_eq!(costs, vec![6, 36, 2, 1, 1, 1]);
    assert_eq!(plan.total_cycles, 47);
}

#[test]
fn gte_readers_should_stall_for_the_remaining_latency() {

    let config = DynarecConfig::new();

    // RTPS takes 15 cycles, two single-cycle instructions elapse 2 of them,
    // so the MFC2 waits for the remaining 13 plus one.
    let plan = plan_for(&[cop2(0x01), nop(), nop(), mfc2(1, 14), jr(31), nop()], &config);

    assert_eq!(plan.instructions[0].cycles, 1);
    assert_eq!(plan.instructions[3].cycles, 1 + 13 + 1);
}

#[test]
fn gte_latency_should_elapse_with_independent_work() {

    let config = DynarecConfig::new();

    // SQR takes 5 cycles, which a 6-cycle multiply hides entirely.
    let plan = plan_for(&[cop2(0x28), mult(1, 2), mfc2(1, 25), jr(31), nop()], &config);

    assert_eq!(plan.instructions[2].cycles, 1);
}

#[test]
fn polling_loops_should_be_idle() {

    let config = DynarecConfig::new();

    // loop: lw r2, 0(r4); nop; beq r2, r0, loop; nop
    let plan = plan_for(&[lw(2, 4, 0), nop(), beq(2, 0, -3), nop()], &config);

    assert!(plan.is_idle);
}

#[test]
fn loops_carrying_state_should_not_be_idle() {

    let config = DynarecConfig::new();

    // The counter is read before it is written.
    let counting = plan_for(&[addiu(1, 1, 1), bne(1, 2, -2), nop()], &config);
    assert!(!counting.is_idle);

    // The branch reads the load target before it lands.
    let early_read = plan_for(&[lw(2, 4, 0), beq(2, 0, -2), nop()], &config);
    assert!(!early_read.is_idle);

    // Stores have side effects.
    let storing = plan_for(&[sw(0, 4, 0), beq(0, 0, -2), nop()], &config);
    assert!(!storing.is_idle);
}
