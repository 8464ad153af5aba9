// SPDX-License-Identifier: GPL-3.0
// cp0.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use dynapsx_utility::CustomInteger;

/// Index of the bad virtual address register.
pub const BADVADDR: usize = 8;

/// Index of the status register.
pub const SR: usize = 12;

/// Index of the cause register.
pub const CAUSE: usize = 13;

/// Index of the exception PC register.
pub const EPC: usize = 14;

/// Index of the processor ID register.
pub const PRID: usize = 15;

/// Status register bit that isolates the data cache from the bus.
pub const SR_ISOLATE_CACHE: u32 = 0x0001_0000;

/// Status register bit that selects the ROM exception vectors.
pub const SR_BEV: u32 = 0x0040_0000;

/// Cause register bit for pending hardware interrupt line 0 (IP2).
pub const CAUSE_IP2: u32 = 0x0000_0400;

/// Cause register branch delay bit.
const CAUSE_BD: u32 = 0x8000_0000;

/// The CP0 structure models the System Control Co-Processor (CP0), which
/// is responsible for mememory management and exceptions.
pub struct CP0 {

    // Register definitions.
    cop_registers: [u32; 32],
}

impl CP0 {

    /// Creates a new CP0 object with the correct initial state.
    pub fn new() -> Self {

        let mut cp0 = CP0 {

            // Zero out all registers.
            cop_registers: [0; 32],
        };

        // Reset the CP0 object.
        cp0.reset();

        // Now return it.
        cp0
    }

    /// This function resets the state of the co-processor as per the reset exception.
    pub fn reset(&mut self) {

        self.cop_registers = [0; 32];

        // Set random register to 63.
        self.cop_registers[1] = 63 << 8;

        // Boot with BEV set and CP0 usable, matching what the BIOS expects
        // before it installs its own handlers.
        self.cop_registers[SR] = 0x1040_0000;
        self.cop_registers[PRID] = 0x0000_0002;
    }

    /// This function returns a register value without any read masking.
    pub fn raw(&self, reg: usize) -> u32 {
        self.cop_registers[reg & 31]
    }

    /// This function executes the RFE CP0 instruction.
    pub fn rfe(&mut self) {

        // Shift KUo/IEo/KUp/IEp bits into place of KUp/IEp/KUc/IEc bits and write back.
        let temp_reg = self.cop_registers[SR];
        let new_bits = temp_reg.logical_rshift(2) & 0xF;

        self.write_reg(SR, (temp_reg & 0xFFFFFFF0) | new_bits, true);
    }

    /// This function records an exception: it pushes the KU/IE mode stack,
    /// rewrites the cause code (keeping the pending interrupt bits), and sets
    /// EPC. It returns the vector the CPU must jump to.
    pub fn record_exception(&mut self, code: u32, epc: u32, in_delay_slot: bool, co_processor: u32) -> u32 {

        // Push the mode stack: current becomes previous, previous becomes old.
        let sr = self.cop_registers[SR];
        self.cop_registers[SR] = (sr & !0x3F) | ((sr << 2) & 0x3F);

        let mut cause = (self.cop_registers[CAUSE] & 0xFF00) | ((code & 0x1F) << 2);
        if in_delay_slot {
            cause |= CAUSE_BD;
        }
        cause |= (co_processor & 3) << 28;
        self.cop_registers[CAUSE] = cause;

        self.cop_registers[EPC] = epc;
        self.get_general_exception_vector()
    }

    /// This function sets or clears the hardware interrupt pending bit in Cause.
    pub fn set_interrupt_pending(&mut self, pending: bool) {
        if pending {
            self.cop_registers[CAUSE] |= CAUSE_IP2;
        } else {
            self.cop_registers[CAUSE] &= !CAUSE_IP2;
        }
    }

    /// This function returns true when SR.IEc and the IP2 mask bit are both set.
    pub fn interrupts_enabled(&self) -> bool {
        let sr = self.cop_registers[SR];
        sr & 1 != 0 && sr & CAUSE_IP2 != 0
    }

    /// This function returns the reset exception vector's virtual address.
    pub fn get_reset_exception_vector(&self) -> u32 {
        0xBFC00000
    }

    /// This function returns the general exception vector's virtual address.
    pub fn get_general_exception_vector(&self) -> u32 {

        // Isolate BEV bit and return accordingly.
        let bev = self.cop_registers[SR] & SR_BEV != 0;

        if bev {
            0xBFC00180
        } else {
            0x80000080
        }
    }

    /// This function reads from a given register.
    pub fn read_reg(&self, reg: usize) -> u32 {

        // Determine which register we are reading.
        let array_index = reg & 31;
        match array_index {

            // Status register.
            SR => {
                // Mask out 0-read bits.
                self.cop_registers[array_index] & 0xF27FFF3F
            },

            // Cause register.
            CAUSE => {
                // Mask out 0-read bits.
                self.cop_registers[array_index] & 0xB000FF7C
            },

            // PrId register.
            PRID => {
                // PSX specific value.
                0x00000002
            },

            // A match on all of the following registers should just directly
            // return the value we want:
            //
            // 1:  Random register.
            // 8:  Bad virtual address register.
            // 14: Exception PC register.
            1 | BADVADDR | EPC => self.cop_registers[array_index],

            // Return 0 for all other registers.
            _ => 0,
        }
    }

    /// This function writes to a given register. It allows override of write protection
    /// on certain bits.
    pub fn write_reg(&mut self, reg: usize, value: u32, write_override: bool) {

        // Determine which register we are writing.
        let array_index = reg & 31;
        match write_override {

            // Override was specified, just write register directly.
            true => {
                self.cop_registers[array_index] = value;
            },

            false => {
                match array_index {

                    // Status register.
                    SR => {
                        // Mask out writable bits in existing register value.
                        let temp_val = self.cop_registers[array_index] & 0x0DB400C0;

                        // Mask out read-only bits in supplied value, merge with previously
                        // masked contents, and store back.
                        self.cop_registers[array_index] = (value & 0xF24BFF3F) | temp_val;
                    },

                    // Cause register.
                    CAUSE => {
                        // Mask out writable bits in existing register value.
                        let temp_val = self.cop_registers[array_index] & 0xFFFFFCFF;

                        // Mask out read-only bits in supplied value, merge with previously
                        // masked contents, and store back.
                        self.cop_registers[array_index] = (value & 0x00000300) | temp_val;
                    },

                    // For all other registers, just write the value back as-is.
                    _ => {
                        self.cop_registers[array_index] = value;
                    },
                }
            }
        }
    }
}
