// SPDX-License-Identifier: GPL-3.0
// cp2.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use dynapsx_utility::CustomInteger;
use log::trace;

/// This trait is the boundary between the CPU and the Geometry Transformation
/// Engine. The recompiler invokes it for every coprocessor 2 instruction.
pub trait Gte {

    /// Executes a GTE command word (the low 25 bits of a COP2 instruction).
    fn execute(&mut self, command: u32);

    /// Reads a data register (MFC2/SWC2).
    fn read_data(&mut self, reg: usize) -> u32;

    /// Writes a data register (MTC2/LWC2).
    fn write_data(&mut self, reg: usize, value: u32);

    /// Reads a control register (CFC2).
    fn read_control(&mut self, reg: usize) -> u32;

    /// Writes a control register (CTC2).
    fn write_control(&mut self, reg: usize, value: u32);
}

/// The CP2 structure models the register file of the Geometry Transformation
/// Engine, which is a co-processor in the PlayStation responsible for matrix
/// calculations amongst other things. The arithmetic core lives elsewhere:
/// commands are logged and leave the registers untouched.
pub struct CP2 {

    // Control registers.
    control_registers: [u32; 32],

    // Data registers.
    data_registers: [u32; 32],
}

impl CP2 {

    /// Creates a new CP2 object with the correct initial state.
    pub fn new() -> Self {
        CP2 {

            // Zero-out both register arrays.
            control_registers: [0; 32],
            data_registers: [0; 32],
        }
    }

    /// Reads a control register, sign-extending the 16-bit ones that the
    /// hardware reads back as signed.
    pub fn read_control_reg(&self, reg: usize) -> u32 {
        let reg = reg & 31;
        match reg {
            26..=30 => self.control_registers[reg].sign_extend(15),
            _ => self.control_registers[reg],
        }
    }

    /// Writes a control register as-is.
    pub fn write_control_reg(&mut self, reg: usize, value: u32) {
        self.control_registers[reg & 31] = value;
    }

    /// Reads a data register, applying the read-side quirks of the
    /// vector, IR, ORGB and LZCR registers.
    pub fn read_data_reg(&self, reg: usize) -> u32 {
        let reg = reg & 31;
        match reg {

            // VZ0, VZ1, VZ2 and IR0..IR3 are signed 16-bit.
            1 | 3 | 5 | 8 | 9 | 10 | 11 => self.data_registers[reg].sign_extend(15),

            // SXYP mirrors SXY2.
            15 => self.data_registers[14],

            // RES1 and IRGB read back as zero here.
            23 | 28 => 0,

            // ORGB packs saturated IR1..IR3 into 5:5:5.
            29 => {
                let component = |value: u32| -> u32 {
                    let value = (value.sign_extend(15) as i32) >> 7;
                    value.clamp(0, 0x1F) as u32
                };
                component(self.data_registers[9])
                    | (component(self.data_registers[10]) << 5)
                    | (component(self.data_registers[11]) << 10)
            },

            // LZCR counts leading bits equal to the sign of LZCS.
            31 => {
                let lzcs = self.data_registers[30];
                if lzcs & 0x8000_0000 != 0 {
                    lzcs.leading_ones()
                } else {
                    lzcs.leading_zeros()
                }
            },

            _ => self.data_registers[reg],
        }
    }

    /// Writes a data register, applying the write-side side effects of the
    /// screen FIFO, IRGB and LZCS registers.
    pub fn write_data_reg(&mut self, reg: usize, value: u32) {
        let reg = reg & 31;
        match reg {

            // Writing SXYP pushes the screen XY FIFO.
            15 => {
                self.data_registers[12] = self.data_registers[13];
                self.data_registers[13] = self.data_registers[14];
                self.data_registers[14] = value;
            },

            // IRGB expands 5:5:5 into IR1..IR3.
            28 => {
                self.data_registers[9] = (value & 0x1F) << 7;
                self.data_registers[10] = ((value >> 5) & 0x1F) << 7;
                self.data_registers[11] = ((value >> 10) & 0x1F) << 7;
                self.data_registers[28] = value & 0x7FFF;
            },

            // ORGB and LZCR are read-only.
            29 | 31 => {},

            _ => self.data_registers[reg] = value,
        }
    }
}

impl Gte for CP2 {

    fn execute(&mut self, command: u32) {
        trace!("GTE command {:#04x} ({:#09x}) not emulated", command & 0x3F, command);

        // Every command starts by clearing FLAG.
        self.control_registers[31] = 0;
    }

    fn read_data(&mut self, reg: usize) -> u32 {
        self.read_data_reg(reg)
    }

    fn write_data(&mut self, reg: usize, value: u32) {
        self.write_data_reg(reg, value);
    }

    fn read_control(&mut self, reg: usize) -> u32 {
        self.read_control_reg(reg)
    }

    fn write_control(&mut self, reg: usize, value: u32) {
        self.write_control_reg(reg, value);
    }
}

#[cfg(test)]
mod tests;
