// SPDX-License-Identifier: GPL-3.0
// error.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::memory_map::BIOS_SIZE;

/// Host-side failures of the emulator core. Guest faults are never reported
/// here: they are delivered to the guest through its own exception vector.
#[derive(Debug, thiserror::Error)]
pub enum DynarecError {

    /// The guest PC maps to no RAM, BIOS or executable I/O window, so there
    /// is nothing to fetch and no guest-visible recovery.
    #[error("guest PC {pc:#010x} does not map to executable memory")]
    UnmappedPc { pc: u32 },

    /// A code label was referenced but never bound while emitting a block.
    #[error("unbound code label {label} in block at {pc:#010x}")]
    UnboundLabel { pc: u32, label: u32 },

    /// Translated code jumped outside the code buffer.
    #[error("host code address {addr} is outside the code buffer")]
    InvalidCodeAddress { addr: u32 },

    #[error("BIOS image must be exactly {expected} bytes, got {actual}", expected = BIOS_SIZE)]
    InvalidBiosSize { actual: usize },

    #[error("image of {len} bytes at {address:#010x} does not fit in RAM")]
    ImageOutOfRange { address: u32, len: usize },
}

/// Errors raised while reading an INI-style configuration file.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {

    #[error("line {line}: expected `key = value`")]
    MalformedLine { line: usize },

    #[error("line {line}: unknown key `{key}`")]
    UnknownKey { line: usize, key: String },

    #[error("line {line}: invalid value `{value}` for `{key}`")]
    InvalidValue { line: usize, key: String, value: String },
}
