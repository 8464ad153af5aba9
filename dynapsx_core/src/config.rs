// SPDX-License-Identifier: GPL-3.0
// config.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use crate::error::ConfigError;
use log::debug;

/// Largest block the compiler will build, in guest instructions. Keeps every
/// block within two RAM pages.
pub const MAX_BLOCK_INSTRUCTIONS_LIMIT: usize = 1024;

/// The video standard of the emulated console, which sets the frame rate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Region {
    Ntsc,
    Pal,
}

/// Tunables for the recompiler and the machine around it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynarecConfig {

    /// Length cap of a block in guest instructions.
    pub max_block_instructions: usize,

    /// Omit pure computations whose result is overwritten before use.
    pub dead_code_elimination: bool,

    /// Patch block exits to jump straight into their successors.
    pub direct_linking: bool,

    /// Guard RAM blocks with page generations so overwritten code recompiles.
    pub smc_detection: bool,

    /// Fast-forward detected idle loops to the scheduler deadline.
    pub idle_skip: bool,

    /// How many conditional branches a block may compile past.
    pub superblock_continuations: usize,

    /// Soft size of the code buffer, in host operations.
    pub code_buffer_capacity: usize,

    /// A compile that starts with less room than this flushes the buffer first.
    pub flush_margin: usize,

    pub region: Region,
}

impl DynarecConfig {

    /// Creates a configuration with the default settings.
    pub fn new() -> Self {
        DynarecConfig {
            max_block_instructions: 64,
            dead_code_elimination: true,
            direct_linking: true,
            smc_detection: true,
            idle_skip: true,
            superblock_continuations: 2,
            code_buffer_capacity: 1 << 20,
            flush_margin: 32 * 1024,
            region: Region::Ntsc,
        }
    }

    /// Returns the block length cap clamped to what the cache can represent.
    pub fn block_instruction_limit(&self) -> usize {
        self.max_block_instructions.clamp(1, MAX_BLOCK_INSTRUCTIONS_LIMIT)
    }

    /// Applies settings from INI-style text. Blank lines and lines starting
    /// with `#` or `;` are ignored, keys are case-insensitive, and section
    /// headers are accepted but have no meaning.
    pub fn apply_ini(&mut self, text: &str) -> Result<(), ConfigError> {

        for (index, raw_line) in text.lines().enumerate() {

            let line_number = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with('[') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MalformedLine { line: line_number });
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            let invalid = || ConfigError::InvalidValue {
                line: line_number,
                key: key.clone(),
                value: value.to_string(),
            };

            match key.as_str() {
                "region" => {
                    self.region = match value.to_ascii_lowercase().as_str() {
                        "ntsc" => Region::Ntsc,
                        "pal" => Region::Pal,
                        _ => return Err(invalid()),
                    };
                },
                "max_block_instructions" => {
                    self.max_block_instructions = value.parse().map_err(|_| invalid())?;
                },
                "superblock_continuations" => {
                    self.superblock_continuations = value.parse().map_err(|_| invalid())?;
                },
                "code_buffer_capacity" => {
                    self.code_buffer_capacity = value.parse().map_err(|_| invalid())?;
                },
                "flush_margin" => {
                    self.flush_margin = value.parse().map_err(|_| invalid())?;
                },
                "dead_code_elimination" => {
                    self.dead_code_elimination = parse_switch(value).ok_or_else(invalid)?;
                },
                "direct_linking" => {
                    self.direct_linking = parse_switch(value).ok_or_else(invalid)?;
                },
                "smc_detection" => {
                    self.smc_detection = parse_switch(value).ok_or_else(invalid)?;
                },
                "idle_skip" => {
                    self.idle_skip = parse_switch(value).ok_or_else(invalid)?;
                },
                _ => {
                    return Err(ConfigError::UnknownKey { line: line_number, key });
                },
            }

            debug!("config: {} = {}", key, value);
        }

        Ok(())
    }
}

/// Parses the on/off spellings used in configuration files.
fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" | "enabled" => Some(true),
        "0" | "off" | "false" | "no" | "disabled" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn apply_ini_should_override_defaults() {

        let mut config = DynarecConfig::new();
        let text = "\
            # comment\n\
            [dynarec]\n\
            Region = PAL\n\
            dead_code_elimination = off\n\
            max_block_instructions = 16\n\
            ; another comment\n";

        config.apply_ini(text).unwrap();

        assert_eq!(config.region, Region::Pal);
        assert!(!config.dead_code_elimination);
        assert_eq!(config.max_block_instructions, 16);
        assert!(config.direct_linking);
    }

    #[test]
    fn apply_ini_should_reject_unknown_keys_and_bad_values() {

        let mut config = DynarecConfig::new();

        assert_eq!(
            config.apply_ini("turbo = on"),
            Err(ConfigError::UnknownKey { line: 1, key: "turbo".to_string() })
        );
        assert_eq!(
            config.apply_ini("\nidle_skip = maybe"),
            Err(ConfigError::InvalidValue {
                line: 2,
                key: "idle_skip".to_string(),
                value: "maybe".to_string()
            })
        );
        assert_eq!(config.apply_ini("no equals"), Err(ConfigError::MalformedLine { line: 1 }));
    }

    #[test]
    fn block_instruction_limit_should_clamp() {

        let mut config = DynarecConfig::new();
        config.max_block_instructions = 0;
        assert_eq!(config.block_instruction_limit(), 1);

        config.max_block_instructions = 100_000;
        assert_eq!(config.block_instruction_limit(), MAX_BLOCK_INSTRUCTIONS_LIMIT);
    }
}
