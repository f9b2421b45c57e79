// SPDX-License-Identifier: MIT

//! `corim-cli`: create, display, validate, sign and verify CoMID and CoRIM
//! documents.

mod comid;
mod corim;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::error;

#[derive(Parser)]
#[command(name = "corim-cli", about = "CoRIM and CoMID manipulation", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// CoMID manipulation
    Comid {
        #[command(subcommand)]
        command: comid::ComidCmd,
    },
    /// CoRIM manipulation
    Corim {
        #[command(subcommand)]
        command: corim::CorimCmd,
    },
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Comid { command } => comid::run(command),
        Command::Corim { command } => corim::run(command),
    }
}

/// Applies `op` to every input, logging each failure, and fails with a
/// `n/m <what>(s) failed` summary if any input failed.
pub(crate) fn run_batch<F>(inputs: &[PathBuf], what: &str, mut op: F) -> anyhow::Result<()>
where
    F: FnMut(&Path) -> anyhow::Result<()>,
{
    let mut failed = 0;
    for input in inputs {
        if let Err(e) = op(input) {
            error!("{}: {e:#}", input.display());
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed}/{} {what}(s) failed", inputs.len());
    }
    Ok(())
}

/// `<dir>/<stem of input>.cbor`
pub(crate) fn output_path(dir: &Path, input: &Path) -> anyhow::Result<PathBuf> {
    let stem = input
        .file_stem()
        .with_context(|| format!("{} has no file name", input.display()))?;
    Ok(dir.join(format!("{}.cbor", stem.to_string_lossy())))
}

pub(crate) fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("error loading {}", path.display()))
}

pub(crate) fn read_string(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("error loading {}", path.display()))
}

pub(crate) fn write(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    fs::write(path, data).with_context(|| format!("error saving {}", path.display()))?;
    log::info!("created {}", path.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
