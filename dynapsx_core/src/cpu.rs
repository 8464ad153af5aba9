// SPDX-License-Identifier: GPL-3.0
// cpu.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::memory_map::{self, MemoryRegion};
use dynapsx_utility::CustomInteger;

/// This module contains the default R3051 implmentation. There
/// may be others in future.
pub mod r3051;

/// This trait provides an implementation-opaque way of the CPU
/// calling methods from elsewhere in the system via a 'bridge'. It covers
/// the memory bus, the interrupt controller and the handful of registers
/// the recompiler reads directly.
pub trait CpuBridge {

    /// The CPU must call this to read a byte from the system bus.
    fn read_byte(&mut self, address: u32) -> u8;

    /// The CPU must call this to read a halfword from the system bus.
    fn read_half(&mut self, address: u32) -> u16;

    /// The CPU must call this to read a word from the system bus.
    fn read_word(&mut self, address: u32) -> u32;

    /// The CPU must call this to write a byte to the system bus.
    fn write_byte(&mut self, address: u32, value: u8);

    /// The CPU must call this to write a halfword to the system bus.
    fn write_half(&mut self, address: u32, value: u16);

    /// The CPU must call this to write a word to the system bus.
    fn write_word(&mut self, address: u32, value: u32);

    /// Direct view of main RAM, used by inline fast paths.
    fn ram(&self) -> &[u8];

    /// Mutable view of main RAM, used by inline fast paths.
    fn ram_mut(&mut self) -> &mut [u8];

    /// Direct view of the scratchpad.
    fn scratchpad(&self) -> &[u8];

    /// Mutable view of the scratchpad.
    fn scratchpad_mut(&mut self) -> &mut [u8];

    /// Direct view of the BIOS ROM.
    fn bios(&self) -> &[u8];

    /// Current value of I_STAT.
    fn interrupt_status(&self) -> u32;

    /// Acknowledges interrupts the way a guest write to I_STAT does: bits
    /// written as zero are cleared.
    fn acknowledge_interrupts(&mut self, value: u32);

    /// Current value of I_MASK.
    fn interrupt_mask(&self) -> u32;

    /// Replaces I_MASK.
    fn set_interrupt_mask(&mut self, value: u32);

    /// Current value of GPUSTAT.
    fn gpu_status(&self) -> u32;

    /// Raises the given interrupt line in I_STAT.
    fn signal_interrupt(&mut self, irq: u32);

    /// Returns the pending, unmasked interrupt lines.
    fn check_interrupts(&self) -> u32 {
        self.interrupt_status() & self.interrupt_mask()
    }

    /// Fetches an instruction word for the recompiler. Returns `None` when the
    /// address is not executable.
    fn fetch_instruction(&mut self, address: u32) -> Option<u32> {
        match memory_map::classify(address) {
            MemoryRegion::Ram(offset) => Some(read_le_word(self.ram(), offset)),
            MemoryRegion::Bios(offset) => Some(read_le_word(self.bios(), offset)),
            MemoryRegion::Io(_) if memory_map::is_executable_io_aperture(address) => {
                Some(self.read_word(address & 0xFFFF_FFFC))
            },
            _ => None,
        }
    }
}

/// Reads a little-endian word from a byte slice, wrapping the offset
/// to the slice length (which is always a power of two here).
#[inline(always)]
pub fn read_le_word(memory: &[u8], offset: u32) -> u32 {
    let base = (offset as usize & (memory.len() - 1)) & !3;
    u32::from_le_bytes([memory[base], memory[base + 1], memory[base + 2], memory[base + 3]])
}

/// Reads a little-endian halfword from a byte slice.
#[inline(always)]
pub fn read_le_half(memory: &[u8], offset: u32) -> u16 {
    let base = (offset as usize & (memory.len() - 1)) & !1;
    u16::from_le_bytes([memory[base], memory[base + 1]])
}

/// Writes a little-endian word into a byte slice.
#[inline(always)]
pub fn write_le_word(memory: &mut [u8], offset: u32, value: u32) {
    let base = (offset as usize & (memory.len() - 1)) & !3;
    memory[base..base + 4].copy_from_slice(&value.to_le_bytes());
}

/// Writes a little-endian halfword into a byte slice.
#[inline(always)]
pub fn write_le_half(memory: &mut [u8], offset: u32, value: u16) {
    let base = (offset as usize & (memory.len() - 1)) & !1;
    memory[base..base + 2].copy_from_slice(&value.to_le_bytes());
}

/// Merges a memory word into a register the way LWL does, given the low two
/// bits of the unaligned address.
#[inline(always)]
pub fn merge_load_left(register: u32, word: u32, shift: u32) -> u32 {
    match shift & 3 {
        0 => (register & 0x00FF_FFFF) | (word << 24),
        1 => (register & 0x0000_FFFF) | (word << 16),
        2 => (register & 0x0000_00FF) | (word << 8),
        _ => word,
    }
}

/// Merges a memory word into a register the way LWR does.
#[inline(always)]
pub fn merge_load_right(register: u32, word: u32, shift: u32) -> u32 {
    match shift & 3 {
        0 => word,
        1 => (register & 0xFF00_0000) | word.logical_rshift(8),
        2 => (register & 0xFFFF_0000) | word.logical_rshift(16),
        _ => (register & 0xFFFF_FF00) | word.logical_rshift(24),
    }
}

/// Produces the memory word SWL leaves behind.
#[inline(always)]
pub fn merge_store_left(memory: u32, register: u32, shift: u32) -> u32 {
    match shift & 3 {
        0 => (memory & 0xFFFF_FF00) | register.logical_rshift(24),
        1 => (memory & 0xFFFF_0000) | register.logical_rshift(16),
        2 => (memory & 0xFF00_0000) | register.logical_rshift(8),
        _ => register,
    }
}

/// Produces the memory word SWR leaves behind.
#[inline(always)]
pub fn merge_store_right(memory: u32, register: u32, shift: u32) -> u32 {
    match shift & 3 {
        0 => register,
        1 => (memory & 0x0000_00FF) | (register << 8),
        2 => (memory & 0x0000_FFFF) | (register << 16),
        _ => (memory & 0x00FF_FFFF) | (register << 24),
    }
}
