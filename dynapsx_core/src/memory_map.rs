// SPDX-License-Identifier: GPL-3.0
// memory_map.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

// Physical layout of the PlayStation address space, shared by the motherboard
// and the recompiler's memory-access code generation.

/// Size of the RAM area in bytes.
pub const RAM_SIZE: usize = 2097152;

/// Mask used to fold RAM mirrors onto the 2MiB array.
pub const RAM_MASK: u32 = (RAM_SIZE as u32) - 1;

/// RAM is mirrored four times below this physical address.
pub const RAM_MIRROR_END: u32 = 0x0080_0000;

/// Size of the scratchpad area in bytes.
pub const SCRATCHPAD_SIZE: usize = 1024;

/// Physical base of the scratchpad.
pub const SCRATCHPAD_BASE: u32 = 0x1F80_0000;

/// Physical base of the I/O register window.
pub const IO_BASE: u32 = 0x1F80_1000;

/// Physical end (exclusive) of the I/O register window.
pub const IO_END: u32 = 0x1F80_3000;

/// Size of the BIOS area in bytes.
pub const BIOS_SIZE: usize = 524288;

/// Physical base of the BIOS ROM.
pub const BIOS_BASE: u32 = 0x1FC0_0000;

/// Physical address of the cache control register (0xFFFE0130 virtual).
pub const CACHE_CONTROL: u32 = 0x1FFE_0130;

/// Mask stripping the segment bits from a virtual address.
pub const PHYSICAL_MASK: u32 = 0x1FFF_FFFF;

/// Interrupt status register.
pub const I_STAT: u32 = 0x1F80_1070;

/// Interrupt mask register.
pub const I_MASK: u32 = 0x1F80_1074;

/// GPU status register (read side of GP1).
pub const GPUSTAT: u32 = 0x1F80_1814;

/// A classified guest address. Offsets are relative to the start of
/// the backing array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryRegion {
    Ram(u32),
    Scratchpad(u32),
    Io(u32),
    Bios(u32),
    CacheControl,
    Unmapped,
}

/// Strips the segment bits from a virtual address.
#[inline(always)]
pub fn physical(address: u32) -> u32 {
    address & PHYSICAL_MASK
}

/// Returns true if the address lies in KSEG1 (uncached, unaffected by cache isolation).
#[inline(always)]
pub fn is_kseg1(address: u32) -> bool {
    address & 0xE000_0000 == 0xA000_0000
}

/// Classifies a virtual address into the region that backs it.
pub fn classify(address: u32) -> MemoryRegion {

    let phys = physical(address);
    match phys {
        p if p < RAM_MIRROR_END => MemoryRegion::Ram(p & RAM_MASK),
        p if (SCRATCHPAD_BASE..SCRATCHPAD_BASE + SCRATCHPAD_SIZE as u32).contains(&p) => {
            MemoryRegion::Scratchpad(p - SCRATCHPAD_BASE)
        },
        p if (IO_BASE..IO_END).contains(&p) => MemoryRegion::Io(p),
        p if (BIOS_BASE..BIOS_BASE + BIOS_SIZE as u32).contains(&p) => MemoryRegion::Bios(p - BIOS_BASE),
        CACHE_CONTROL => MemoryRegion::CacheControl,
        _ => MemoryRegion::Unmapped,
    }
}

/// Returns true for the I/O windows the BIOS is known to execute code from
/// (DMA registers and the SPU area). Blocks here are compiled but never cached.
pub fn is_executable_io_aperture(address: u32) -> bool {
    let phys = physical(address);
    (0x1F80_1080..0x1F80_1100).contains(&phys) || (0x1F80_1C00..0x1F80_2000).contains(&phys)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn classify_should_fold_ram_mirrors_and_segments() {

        // Given the same RAM word seen through KUSEG, KSEG0, KSEG1 and a mirror,
        // all four should land on the same offset.
        for address in [0x0001_0000, 0x8001_0000, 0xA001_0000, 0x0021_0000] {
            assert_eq!(classify(address), MemoryRegion::Ram(0x1_0000));
        }
    }

    #[test]
    fn classify_should_recognise_fixed_regions() {

        assert_eq!(classify(0x1F80_0010), MemoryRegion::Scratchpad(0x10));
        assert_eq!(classify(0xBF80_1070), MemoryRegion::Io(I_STAT));
        assert_eq!(classify(0xBFC0_0180), MemoryRegion::Bios(0x180));
        assert_eq!(classify(0xFFFE_0130), MemoryRegion::CacheControl);
        assert_eq!(classify(0x1F00_0000), MemoryRegion::Unmapped);
    }

    #[test]
    fn io_aperture_should_cover_dma_and_spu_windows_only() {

        assert!(is_executable_io_aperture(0x1F80_1080));
        assert!(is_executable_io_aperture(0xBF80_1C00));
        assert!(!is_executable_io_aperture(0x1F80_1070));
        assert!(!is_executable_io_aperture(0x1F80_2000));
    }
}
