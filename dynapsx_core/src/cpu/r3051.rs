// SPDX-License-Identifier: GPL-3.0
// r3051.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use log::debug;
use mips_exception::{MIPSException, MIPSExceptionReason};
use cp0::{CP0, BADVADDR};
use cp2::{CP2, Gte};

/// This module contains an implementation of the MIPS exceptions
/// modelled from inside the R3051 processor.
pub mod mips_exception;

/// This module contains an implementation of the CP0 co-processor, also
/// referred to as the System Control Co-processor.
pub mod cp0;

/// This module contains the register file of the CP2 co-processor, also
/// referred to as the Geometry Transformation Engine.
pub mod cp2;

/// The number of general CPU registers.
const REGISTER_COUNT: usize = 32;

/// This structure represents the architectural state of the R3051 processor.
/// Instructions are not interpreted here: translated code and the host helper
/// routines read and write this state directly.
pub struct R3051 {

    // Register definitions.
    general_registers: [u32; REGISTER_COUNT],
    program_counter: u32,
    hi_reg: u32,
    lo_reg: u32,

    // Co-processors.
    sccp: CP0,
    gte: Box<dyn Gte>,

    // The load in flight: target register (0 when none) and its value.
    load_delay_reg: u32,
    load_delay_value: u32,

    // Set by exception entry so translated code can bail out of the block.
    block_aborted: bool,

    // Address of the last register jump, reported as EPC when its target is misaligned.
    current_pc: u32,
}

/// Implementation functions for the R3051 component itself.
impl R3051 {

    /// Creates a new R3051 object with the correct initial state.
    pub fn new() -> Self {
        R3051::with_gte(Box::new(CP2::new()))
    }

    /// Creates a new R3051 object using the given GTE implementation.
    pub fn with_gte(gte: Box<dyn Gte>) -> Self {

        let mut r3051 = R3051 {

            // Setup registers (remember, r0 should always be 0).
            general_registers: [0; REGISTER_COUNT],
            program_counter: 0,
            hi_reg: 0,
            lo_reg: 0,

            // Setup co-processors.
            sccp: CP0::new(),
            gte,

            // No load in flight.
            load_delay_reg: 0,
            load_delay_value: 0,

            block_aborted: false,
            current_pc: 0,
        };

        r3051.reset();

        r3051
    }

    /// Set the R3051 object to its correct initial state.
    pub fn reset(&mut self) {
        self.general_registers = [0; REGISTER_COUNT];
        self.hi_reg = 0;
        self.lo_reg = 0;
        self.load_delay_reg = 0;
        self.load_delay_value = 0;
        self.block_aborted = false;
        self.sccp.reset();
        self.program_counter = self.sccp.get_reset_exception_vector();
        self.current_pc = self.program_counter;
    }

    /// Reads a general purpose register.
    #[inline(always)]
    pub fn gpr(&self, reg: usize) -> u32 {
        self.general_registers[reg & 31]
    }

    /// Writes a general purpose register. Writes to r0 are discarded.
    #[inline(always)]
    pub fn set_gpr(&mut self, reg: usize, value: u32) {
        let reg = reg & 31;
        if reg != 0 {
            self.general_registers[reg] = value;
        }
    }

    pub fn pc(&self) -> u32 {
        self.program_counter
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.program_counter = pc;
    }

    pub fn hi(&self) -> u32 {
        self.hi_reg
    }

    pub fn set_hi(&mut self, value: u32) {
        self.hi_reg = value;
    }

    pub fn lo(&self) -> u32 {
        self.lo_reg
    }

    pub fn set_lo(&mut self, value: u32) {
        self.lo_reg = value;
    }

    pub fn current_pc(&self) -> u32 {
        self.current_pc
    }

    pub fn set_current_pc(&mut self, pc: u32) {
        self.current_pc = pc;
    }

    /// Access to the system control co-processor.
    pub fn cop0(&self) -> &CP0 {
        &self.sccp
    }

    /// Mutable access to the system control co-processor.
    pub fn cop0_mut(&mut self) -> &mut CP0 {
        &mut self.sccp
    }

    /// Mutable access to the geometry transformation engine.
    pub fn gte_mut(&mut self) -> &mut dyn Gte {
        self.gte.as_mut()
    }

    /// Target register of the load in flight, or 0 when there is none.
    pub fn load_delay_reg(&self) -> u32 {
        self.load_delay_reg
    }

    pub fn load_delay_value(&self) -> u32 {
        self.load_delay_value
    }

    pub fn set_load_delay_reg(&mut self, reg: u32) {
        self.load_delay_reg = reg & 31;
    }

    pub fn set_load_delay_value(&mut self, value: u32) {
        self.load_delay_value = value;
    }

    /// Writes the load in flight (if any) into its target register.
    pub fn commit_load_delay(&mut self) {
        if self.load_delay_reg != 0 {
            let reg = self.load_delay_reg as usize;
            self.set_gpr(reg, self.load_delay_value);
            self.load_delay_reg = 0;
        }
    }

    /// True once an exception has been taken inside the running block.
    pub fn block_aborted(&self) -> bool {
        self.block_aborted
    }

    pub fn clear_block_aborted(&mut self) {
        self.block_aborted = false;
    }

    /// Takes an exception: completes the load in flight, records cause, EPC
    /// and the bad address in CP0, and redirects the PC to the exception vector.
    pub fn enter_exception(&mut self, exception: &MIPSException) {

        self.commit_load_delay();

        let reason = exception.exception_reason;
        if matches!(reason, MIPSExceptionReason::ADEL | MIPSExceptionReason::ADES) {
            self.sccp.write_reg(BADVADDR, exception.bad_address, true);
        }

        // A fault in a delay slot reports the branch as EPC.
        let epc = if exception.is_in_branch_delay_slot {
            exception.program_counter_origin.wrapping_sub(4)
        } else {
            exception.program_counter_origin
        };

        let vector = self.sccp.record_exception(
            reason as u32,
            epc,
            exception.is_in_branch_delay_slot,
            exception.co_processor_num
        );

        debug!("exception {:?} at {:#010x}, vectoring to {:#010x}", reason, epc, vector);

        self.program_counter = vector;
        self.block_aborted = true;
    }

    /// Performs DIV, including the architectural results for division by
    /// zero and for the one overflowing quotient.
    pub fn divide(&mut self, numerator: u32, denominator: u32) {

        let n = numerator as i32;
        let d = denominator as i32;

        if d == 0 {
            self.hi_reg = numerator;
            self.lo_reg = if n >= 0 { 0xFFFF_FFFF } else { 1 };
        } else if n == i32::MIN && d == -1 {
            self.hi_reg = 0;
            self.lo_reg = 0x8000_0000;
        } else {
            self.hi_reg = (n % d) as u32;
            self.lo_reg = (n / d) as u32;
        }
    }

    /// Performs DIVU, including the architectural result for division by zero.
    pub fn divide_unsigned(&mut self, numerator: u32, denominator: u32) {
        if denominator == 0 {
            self.hi_reg = numerator;
            self.lo_reg = 0xFFFF_FFFF;
        } else {
            self.hi_reg = numerator % denominator;
            self.lo_reg = numerator / denominator;
        }
    }
}

#[cfg(test)]
mod tests;
