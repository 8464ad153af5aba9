// SPDX-License-Identifier: GPL-3.0
// lib.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

// Crate-wide lines to disable specific lints:

// Machine state is built explicitly through new() constructors, so there
// will be no derived Default implementations unless needed.
#![allow(clippy::new_without_default)]

// We use upper-case acronyms for some types, to match the hardware naming.
#![allow(clippy::upper_case_acronyms)]

/// This module contains the recompiler and machine configuration.
pub mod config;

/// This module contains the host-side error types.
pub mod error;

/// This module describes the PlayStation physical address map.
pub mod memory_map;

/// This module contains PlayStation CPU-related functionality.
pub mod cpu;

/// This module contains PlayStation motherboard related functionality.
pub mod motherboard;

/// This module contains the cycle-deadline event scheduler.
pub mod scheduler;

/// This module contains the dynamic recompiler.
pub mod dynarec;

/// This module contains high-level replacements for BIOS calls.
pub mod bios_hle;

/// This module ties the CPU, motherboard, scheduler and recompiler together.
pub mod machine;

#[cfg(test)]
pub(crate) mod test_support;
