// SPDX-License-Identifier: GPL-3.0
// motherboard.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

/// This module contains the default motherboard implementation. There
/// may be others in future.
pub mod psx_motherboard;

/// Interrupt controller line raised at the start of vertical blank.
pub const IRQ_VBLANK: u32 = 0;

/// Interrupt controller line used by the GPU.
pub const IRQ_GPU: u32 = 1;

/// Interrupt controller line used by the CD-ROM drive.
pub const IRQ_CDROM: u32 = 2;

/// Interrupt controller line used by the DMA controller.
pub const IRQ_DMA: u32 = 3;

/// Number of lines the interrupt controller implements.
pub const IRQ_LINES: u32 = 11;
