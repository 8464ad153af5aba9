// SPDX-License-Identifier: GPL-3.0
// mips_exception.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

/// This structure describes an exception about to be taken by the R3051 CPU.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MIPSException {
    pub exception_reason: MIPSExceptionReason,
    pub program_counter_origin: u32,
    pub bad_address: u32,
    pub co_processor_num: u32,
    pub is_in_branch_delay_slot: bool
}

/// This enum represents all possible reasons for an exception.
/// Integer codes are listed explicitly for clarity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MIPSExceptionReason {
    INT = 0,
    ADEL = 4,
    ADES = 5,
    IBE = 6,
    DBE = 7,
    SYS = 8,
    BP = 9,
    RI = 10,
    CPU = 11,
    OVF = 12,
}

impl MIPSException {

    /// Creates a new MIPSException object for the given reason, raised by
    /// the instruction at `program_counter_origin`.
    pub fn new(exception_reason: MIPSExceptionReason, program_counter_origin: u32) -> Self {
        MIPSException {
            exception_reason,
            program_counter_origin,
            bad_address: 0,
            co_processor_num: 0,
            is_in_branch_delay_slot: false,
        }
    }

    /// Records the faulting data address (AdEL/AdES only).
    pub fn with_bad_address(mut self, bad_address: u32) -> Self {
        self.bad_address = bad_address;
        self
    }

    /// Records the coprocessor number (CpU only).
    pub fn with_co_processor(mut self, co_processor_num: u32) -> Self {
        self.co_processor_num = co_processor_num;
        self
    }

    /// Marks the faulting instruction as sitting in a branch delay slot.
    pub fn in_branch_delay_slot(mut self, is_in_branch_delay_slot: bool) -> Self {
        self.is_in_branch_delay_slot = is_in_branch_delay_slot;
        self
    }
}
