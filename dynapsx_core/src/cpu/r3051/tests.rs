// SPDX-License-Identifier: GPL-3.0
// tests.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::cpu::r3051::cp0::{BADVADDR, CAUSE, EPC};
use crate::cpu::r3051::mips_exception::{MIPSException, MIPSExceptionReason};

use super::R3051;

// Tests for the R3051 CPU state.

#[test]
fn register_zero_should_ignore_writes() {

    let mut r3051 = R3051::new();
    r3051.set_gpr(0, 1234);

    assert_eq!(r3051.gpr(0), 0);
}

#[test]
fn reset_should_start_at_bios_entry() {

    let r3051 = R3051::new();

    assert_eq!(r3051.pc(), 0xBFC00000);
}

#[test]
fn exception_should_commit_pending_load() {

    let mut r3051 = R3051::new();

    // Given a load to r8 still in flight,
    r3051.set_gpr(8, 1);
    r3051.set_load_delay_reg(8);
    r3051.set_load_delay_value(99);

    // taking an exception should complete it first.
    r3051.enter_exception(&MIPSException::new(MIPSExceptionReason::OVF, 0x8001_0010));

    assert_eq!(r3051.gpr(8), 99);
    assert_eq!(r3051.load_delay_reg(), 0);
    assert!(r3051.block_aborted());
}

#[test]
fn exception_in_delay_slot_should_report_branch_address() {

    let mut r3051 = R3051::new();

    let exception = MIPSException::new(MIPSExceptionReason::SYS, 0x8001_0004)
        .in_branch_delay_slot(true);
    r3051.enter_exception(&exception);

    assert_eq!(r3051.cop0().raw(EPC), 0x8001_0000);
    assert_eq!(r3051.cop0().raw(CAUSE) >> 31, 1);
    assert_eq!((r3051.cop0().raw(CAUSE) >> 2) & 0x1F, 8);
    assert_eq!(r3051.pc(), 0xBFC00180);
}

#[test]
fn address_error_should_record_bad_address() {

    let mut r3051 = R3051::new();

    let exception = MIPSException::new(MIPSExceptionReason::ADEL, 0x8001_0000)
        .with_bad_address(0x8002_0001);
    r3051.enter_exception(&exception);

    assert_eq!(r3051.cop0().raw(BADVADDR), 0x8002_0001);
    assert_eq!((r3051.cop0().raw(CAUSE) >> 2) & 0x1F, 4);
}

#[test]
fn divide_by_zero_should_follow_hardware_results() {

    let mut r3051 = R3051::new();

    // Given a positive numerator, LO should be -1.
    r3051.divide(7, 0);
    assert_eq!(r3051.hi(), 7);
    assert_eq!(r3051.lo(), 0xFFFF_FFFF);

    // Given a negative numerator, LO should be 1.
    r3051.divide(-7_i32 as u32, 0);
    assert_eq!(r3051.hi(), -7_i32 as u32);
    assert_eq!(r3051.lo(), 1);

    // Unsigned division by zero always yields all ones.
    r3051.divide_unsigned(7, 0);
    assert_eq!(r3051.hi(), 7);
    assert_eq!(r3051.lo(), 0xFFFF_FFFF);
}

#[test]
fn divide_overflow_should_not_trap() {

    let mut r3051 = R3051::new();
    r3051.divide(0x8000_0000, 0xFFFF_FFFF);

    assert_eq!(r3051.hi(), 0);
    assert_eq!(r3051.lo(), 0x8000_0000);
}

#[test]
fn signed_divide_should_truncate_towards_zero() {

    let mut r3051 = R3051::new();
    r3051.divide(-7_i32 as u32, 2);

    assert_eq!(r3051.lo(), -3_i32 as u32);
    assert_eq!(r3051.hi(), -1_i32 as u32);
}
