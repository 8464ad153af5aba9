// SPDX-License-Identifier: GPL-3.0
// psx_motherboard.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::config::Region;
use crate::cpu::{self, CpuBridge};
use crate::error::DynarecError;
use crate::memory_map::{
    self, MemoryRegion, BIOS_SIZE, GPUSTAT, I_MASK, I_STAT, IO_BASE, IO_END,
    RAM_SIZE, SCRATCHPAD_SIZE,
};
use super::IRQ_LINES;
use log::{debug, warn};

/// Value GPUSTAT reads back with: ready to receive commands, DMA blocks
/// and VRAM transfers.
const GPU_STATUS_IDLE: u32 = 0x1C00_0000;

/// Expansion region 2 byte register that BIOS debug builds print through.
const EXPANSION2_TTY: u32 = 0x1F80_2002;

/// Bits of I_STAT/I_MASK backed by real interrupt lines.
const IRQ_MASK: u32 = (1 << IRQ_LINES) - 1;

/// This struct models the central 'motherboard' of the PlayStaton, storing things
/// like the RAM, BIOS and the interrupt controller. Peripheral registers that are
/// not emulated are latched so that the guest reads back what it wrote.
pub struct PsxMotherboard {

    // 2MiB of RAM (heap allocated).
    ram: Vec<u8>,

    // 1 KiB of scratchpad area (heap allocated). Strictly speaking
    // this is inside the CPU in the real hardware, but makes more
    // sense to put it here.
    scratchpad: Vec<u8>,

    // 512 KiB of BIOS (heap allocated). This stores the BIOS once
    // it is copied into memory.
    bios: Vec<u8>,

    // Latched contents of the I/O window.
    io_latch: Vec<u8>,

    // Register declarations.
    cache_control_reg: u32,
    interrupt_status_reg: u32,
    interrupt_mask_reg: u32,
    gpu_status_reg: u32,

    // Video timing.
    region: Region,
    vblank_count: u64,

    // Characters written to the expansion 2 debug port.
    expansion_tty: String,
}

/// Implementation functions for the motherboard itself.
impl PsxMotherboard {

    /// Creates a new motherboard object with the correct initial state and
    /// zero-filled memory.
    pub fn new() -> Self {
        PsxMotherboard {

            // Setup memory areas.
            ram: vec![0; RAM_SIZE],
            scratchpad: vec![0; SCRATCHPAD_SIZE],
            bios: vec![0; BIOS_SIZE],
            io_latch: vec![0; (IO_END - IO_BASE) as usize],

            // Setup registers.
            cache_control_reg: 0,
            interrupt_status_reg: 0,
            interrupt_mask_reg: 0,
            gpu_status_reg: GPU_STATUS_IDLE,

            region: Region::Ntsc,
            vblank_count: 0,
            expansion_tty: String::new(),
        }
    }

    /// Copies the bytes from the passed in slice to our BIOS memory area. The
    /// image must be exactly the size of the BIOS ROM.
    pub fn load_bios(&mut self, bios_data: &[u8]) -> Result<(), DynarecError> {
        if bios_data.len() != BIOS_SIZE {
            return Err(DynarecError::InvalidBiosSize { actual: bios_data.len() });
        }
        self.bios.copy_from_slice(bios_data);
        debug!("loaded {} byte BIOS image", bios_data.len());
        Ok(())
    }

    /// Copies an image into RAM at the given guest address (any RAM segment).
    pub fn load_ram(&mut self, address: u32, data: &[u8]) -> Result<(), DynarecError> {
        let out_of_range = DynarecError::ImageOutOfRange { address, len: data.len() };
        let MemoryRegion::Ram(offset) = memory_map::classify(address) else {
            return Err(out_of_range);
        };
        let start = offset as usize;
        let end = start.checked_add(data.len()).ok_or(out_of_range)?;
        if end > RAM_SIZE {
            return Err(DynarecError::ImageOutOfRange { address, len: data.len() });
        }
        self.ram[start..end].copy_from_slice(data);
        Ok(())
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn set_region(&mut self, region: Region) {
        self.region = region;
    }

    /// Number of vertical blanks signalled so far.
    pub fn vblank_count(&self) -> u64 {
        self.vblank_count
    }

    /// Records the start of a vertical blank and raises its interrupt line.
    pub fn start_vblank(&mut self) {
        self.vblank_count += 1;
        self.signal_interrupt(super::IRQ_VBLANK);
    }

    /// Text written to the expansion 2 debug port.
    pub fn expansion_tty(&self) -> &str {
        &self.expansion_tty
    }

    /// Reads a word-aligned I/O register.
    fn read_io_word(&self, phys: u32) -> u32 {
        match phys {
            I_STAT => self.interrupt_status_reg,
            I_MASK => self.interrupt_mask_reg,
            GPUSTAT => self.gpu_status_reg,
            _ => cpu::read_le_word(&self.io_latch, phys - IO_BASE),
        }
    }

    /// Writes an I/O register. The value is already positioned for a word
    /// write; narrower accesses only touch their bytes of the latch.
    fn write_io(&mut self, phys: u32, value: u32, width: u32) {
        match phys & !3 {
            I_STAT => self.acknowledge_interrupts(value),
            I_MASK => self.set_interrupt_mask(value),

            // GP1 commands are not emulated.
            GPUSTAT => {},

            _ if phys == EXPANSION2_TTY => {
                let character = char::from(value as u8);
                self.expansion_tty.push(character);
                if character == '\n' {
                    debug!("expansion tty: {}", self.expansion_tty.trim_end());
                }
            },

            _ => {
                let offset = phys - IO_BASE;
                match width {
                    1 => self.io_latch[offset as usize] = value as u8,
                    2 => cpu::write_le_half(&mut self.io_latch, offset, value as u16),
                    _ => cpu::write_le_word(&mut self.io_latch, offset, value),
                }
            },
        }
    }
}

/// Implementation functions for the CPU to call into the motherboard.
impl CpuBridge for PsxMotherboard {

    fn read_byte(&mut self, address: u32) -> u8 {
        match memory_map::classify(address) {
            MemoryRegion::Ram(offset) => self.ram[offset as usize],
            MemoryRegion::Scratchpad(offset) => self.scratchpad[offset as usize],
            MemoryRegion::Bios(offset) => self.bios[offset as usize],
            MemoryRegion::Io(phys) => (self.read_io_word(phys & !3) >> ((phys & 3) * 8)) as u8,
            MemoryRegion::CacheControl => self.cache_control_reg as u8,
            MemoryRegion::Unmapped => {
                warn!("unmapped byte read at {:#010x}", address);
                0
            },
        }
    }

    fn read_half(&mut self, address: u32) -> u16 {
        match memory_map::classify(address) {
            MemoryRegion::Ram(offset) => cpu::read_le_half(&self.ram, offset),
            MemoryRegion::Scratchpad(offset) => cpu::read_le_half(&self.scratchpad, offset),
            MemoryRegion::Bios(offset) => cpu::read_le_half(&self.bios, offset),
            MemoryRegion::Io(phys) => (self.read_io_word(phys & !3) >> ((phys & 2) * 8)) as u16,
            MemoryRegion::CacheControl => self.cache_control_reg as u16,
            MemoryRegion::Unmapped => {
                warn!("unmapped halfword read at {:#010x}", address);
                0
            },
        }
    }

    fn read_word(&mut self, address: u32) -> u32 {
        match memory_map::classify(address) {
            MemoryRegion::Ram(offset) => cpu::read_le_word(&self.ram, offset),
            MemoryRegion::Scratchpad(offset) => cpu::read_le_word(&self.scratchpad, offset),
            MemoryRegion::Bios(offset) => cpu::read_le_word(&self.bios, offset),
            MemoryRegion::Io(phys) => self.read_io_word(phys & !3),
            MemoryRegion::CacheControl => self.cache_control_reg,
            MemoryRegion::Unmapped => {
                warn!("unmapped word read at {:#010x}", address);
                0
            },
        }
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        match memory_map::classify(address) {
            MemoryRegion::Ram(offset) => self.ram[offset as usize] = value,
            MemoryRegion::Scratchpad(offset) => self.scratchpad[offset as usize] = value,
            MemoryRegion::Io(phys) => self.write_io(phys, value as u32, 1),
            MemoryRegion::CacheControl => self.cache_control_reg = value as u32,
            MemoryRegion::Bios(_) => {},
            MemoryRegion::Unmapped => warn!("unmapped byte write at {:#010x}", address),
        }
    }

    fn write_half(&mut self, address: u32, value: u16) {
        match memory_map::classify(address) {
            MemoryRegion::Ram(offset) => cpu::write_le_half(&mut self.ram, offset, value),
            MemoryRegion::Scratchpad(offset) => cpu::write_le_half(&mut self.scratchpad, offset, value),
            MemoryRegion::Io(phys) => self.write_io(phys, value as u32, 2),
            MemoryRegion::CacheControl => self.cache_control_reg = value as u32,
            MemoryRegion::Bios(_) => {},
            MemoryRegion::Unmapped => warn!("unmapped halfword write at {:#010x}", address),
        }
    }

    fn write_word(&mut self, address: u32, value: u32) {
        match memory_map::classify(address) {
            MemoryRegion::Ram(offset) => cpu::write_le_word(&mut self.ram, offset, value),
            MemoryRegion::Scratchpad(offset) => cpu::write_le_word(&mut self.scratchpad, offset, value),
            MemoryRegion::Io(phys) => self.write_io(phys, value, 4),
            MemoryRegion::CacheControl => self.cache_control_reg = value,
            MemoryRegion::Bios(_) => {},
            MemoryRegion::Unmapped => warn!("unmapped word write at {:#010x}", address),
        }
    }

    fn ram(&self) -> &[u8] {
        &self.ram
    }

    fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    fn scratchpad(&self) -> &[u8] {
        &self.scratchpad
    }

    fn scratchpad_mut(&mut self) -> &mut [u8] {
        &mut self.scratchpad
    }

    fn bios(&self) -> &[u8] {
        &self.bios
    }

    fn interrupt_status(&self) -> u32 {
        self.interrupt_status_reg
    }

    fn acknowledge_interrupts(&mut self, value: u32) {
        self.interrupt_status_reg &= value;
    }

    fn interrupt_mask(&self) -> u32 {
        self.interrupt_mask_reg
    }

    fn set_interrupt_mask(&mut self, value: u32) {
        self.interrupt_mask_reg = value & IRQ_MASK;
    }

    fn gpu_status(&self) -> u32 {
        self.gpu_status_reg
    }

    fn signal_interrupt(&mut self, irq: u32) {
        if irq < IRQ_LINES {
            self.interrupt_status_reg |= 1 << irq;
        }
    }
}
