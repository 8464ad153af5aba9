// SPDX-License-Identifier: GPL-3.0
// main.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::process::ExitCode;

// This file is the core of the basic client - it exists merely as a CLI-based
// program to load in a BIOS file and run the recompiler for a while, printing
// whatever the guest wrote to the console and the recompiler statistics.

use clap::{Parser, ValueEnum};
use dynapsx_core::{
    config::{DynarecConfig, Region},
    error::{ConfigError, DynarecError},
    machine::PsxMachine,
};
use log::{error, info, LevelFilter};

/// Everything that can stop the basic client.
#[derive(Debug, thiserror::Error)]
enum ClientError {

    #[error("cannot read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("{path}: {source}")]
    Config { path: String, source: ConfigError },

    #[error(transparent)]
    Dynarec(#[from] DynarecError),
}

fn read_file(path: &OsString) -> Result<Vec<u8>, ClientError> {
    fs::read(path).map_err(|source| ClientError::Read { path: path.to_string_lossy().into_owned(), source })
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RegionArg {
    Ntsc,
    Pal,
}

#[derive(Parser)]
#[command(
    version,
    about = "A basic barebones UI for the DynaPSX recompiler",
    long_about = None
)]
struct DynaPsxArgs {
    #[arg(
        long = "bios",
        help = "A compatible PS1 BIOS file",
        id = "BIOS file"
    )]
    bios: OsString,

    #[arg(
        long = "config",
        help = "An optional INI-style recompiler configuration file",
        id = "config file"
    )]
    config: Option<OsString>,

    #[arg(
        long = "cycles",
        help = "How many CPU cycles to run for",
        default_value_t = 33_868_800
    )]
    cycles: u64,

    #[arg(long = "region", value_enum, help = "Override the video region")]
    region: Option<RegionArg>,

    #[arg(long = "no-dce", help = "Disable dead code elimination")]
    no_dce: bool,

    #[arg(long = "no-link", help = "Disable direct block linking")]
    no_link: bool,

    #[arg(long = "no-idle-skip", help = "Disable idle loop skipping")]
    no_idle_skip: bool,

    #[arg(short, long, action = clap::ArgAction::Count, help = "More log output (repeatable)")]
    verbose: u8,

    #[arg(short, long, conflicts_with = "verbose", help = "Only log errors")]
    quiet: bool,
}

impl DynaPsxArgs {

    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Builds the configuration: defaults, then the file, then the flags.
    fn dynarec_config(&self) -> Result<DynarecConfig, ClientError> {

        let mut config = DynarecConfig::new();

        if let Some(path) = &self.config {
            let text = String::from_utf8_lossy(&read_file(path)?).into_owned();
            config.apply_ini(&text).map_err(|source| ClientError::Config {
                path: path.to_string_lossy().into_owned(),
                source,
            })?;
        }

        if let Some(region) = self.region {
            config.region = match region {
                RegionArg::Ntsc => Region::Ntsc,
                RegionArg::Pal => Region::Pal,
            };
        }
        config.dead_code_elimination &= !self.no_dce;
        config.direct_linking &= !self.no_link;
        config.idle_skip &= !self.no_idle_skip;

        Ok(config)
    }
}

fn run(args: &DynaPsxArgs) -> Result<(), ClientError> {

    let config = args.dynarec_config()?;
    let bios = read_file(&args.bios)?;

    let mut machine = PsxMachine::new(config);
    machine.load_bios(&bios)?;

    let result = machine.run_for(args.cycles);

    let tty = machine.tty_output();
    if !tty.is_empty() {
        print!("{}", tty);
    }
    info!("ran {} cycles: {}", machine.cycles(), machine.stats().summary_line());

    result.map_err(ClientError::from)
}

fn main() -> ExitCode {
    let dynapsx_args = DynaPsxArgs::parse();

    let mut builder = colog::default_builder();
    builder.filter_level(dynapsx_args.log_level());
    builder.init();

    match run(&dynapsx_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use std::ffi::OsStr;

    fn args_with_config(config: &std::path::Path) -> DynaPsxArgs {
        let args: [&OsStr; 6] = [
            OsStr::new("dynapsx"),
            OsStr::new("--bios"),
            OsStr::new("bios.bin"),
            OsStr::new("--config"),
            config.as_os_str(),
            OsStr::new("--no-link"),
        ];
        DynaPsxArgs::parse_from(args)
    }

    #[test]
    fn missing_config_file_should_be_a_read_error() {

        let path = std::env::temp_dir().join("dynapsx_missing_config.ini");
        let _ = fs::remove_file(&path);

        let result = args_with_config(&path).dynarec_config();

        assert!(matches!(result, Err(ClientError::Read { .. })));
    }

    #[test]
    fn bad_config_line_should_keep_the_config_error() {

        let path = std::env::temp_dir().join("dynapsx_bad_config.ini");
        fs::write(&path, "max_block_instructions = many\n").unwrap();

        let result = args_with_config(&path).dynarec_config();
        fs::remove_file(&path).unwrap();

        assert!(matches!(
            result,
            Err(ClientError::Config { source: ConfigError::InvalidValue { line: 1, .. }, .. })
        ));
    }

    #[test]
    fn flags_should_override_the_config_file() {

        let path = std::env::temp_dir().join("dynapsx_link_config.ini");
        fs::write(&path, "direct_linking = on\n").unwrap();

        let config = args_with_config(&path).dynarec_config().unwrap();
        fs::remove_file(&path).unwrap();

        assert!(!config.direct_linking);
    }
}
