// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use corimkit::{comid::Comid, CborCodec, JsonCodec};
use log::info;

use crate::{output_path, read, read_string, run_batch, write};

#[derive(Subcommand)]
pub enum ComidCmd {
    /// Create CBOR CoMIDs from JSON templates
    Create {
        /// CoMID JSON template, may be repeated
        #[arg(short, long = "template", required = true)]
        templates: Vec<PathBuf>,
        /// Directory for the produced files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Print CBOR CoMIDs as JSON
    Display {
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,
    },
    /// Decode and validate CBOR CoMIDs
    Validate {
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,
    },
}

pub fn run(command: ComidCmd) -> anyhow::Result<()> {
    match command {
        ComidCmd::Create {
            templates,
            output_dir,
        } => run_batch(&templates, "creation", |template| {
            let comid = Comid::from_json(&read_string(template)?)
                .with_context(|| format!("error decoding template {}", template.display()))?;
            let data = comid.to_cbor()?;
            write(&output_path(&output_dir, template)?, &data)
        }),
        ComidCmd::Display { files } => run_batch(&files, "display", |file| {
            let comid = Comid::from_cbor(&read(file)?)
                .with_context(|| format!("error decoding CoMID from {}", file.display()))?;
            println!(">> [{}]\n{}", file.display(), comid.to_json_pretty()?);
            Ok(())
        }),
        ComidCmd::Validate { files } => run_batch(&files, "validation", |file| {
            Comid::from_cbor(&read(file)?)
                .with_context(|| format!("error decoding CoMID from {}", file.display()))?;
            info!(">> {} is valid", file.display());
            Ok(())
        }),
    }
}
