// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ionpulse", version, about = "Pulse-program tools for the FPGA pulser")]
struct Args {
    /// Also log decoder diagnostics
    #[arg(long, global = true)]
    diagnostics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a ppp source to assembly
    Compile {
        input: PathBuf,
        /// Write the assembly here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Assemble a pulse program and print its listing
    Assemble {
        input: PathBuf,
        /// Print the listing and variables as JSON
        #[arg(long)]
        json: bool,
        /// Write the instruction image to this file
        #[arg(long)]
        code: Option<PathBuf>,
        /// Write the data image to this file
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Print the mnemonics of an instruction image
    Disassemble { image: PathBuf },
    /// Encode a value such as "10 MHz" into a data word
    Encode {
        value: String,
        #[arg(short, long)]
        encoding: Option<String>,
    },
    /// Decode a data word, given in hex or decimal
    Decode {
        word: String,
        #[arg(short, long)]
        encoding: Option<String>,
    },
    /// Show the header and MD5 of a firmware bitfile
    BitfileInfo { path: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    ionpulse_log::init_logging(args.diagnostics);

    let output = match args.command {
        Command::Compile { input, output } => {
            let assembly = commands::compile(&input)?;
            if let Some(path) = output {
                std::fs::write(path, assembly)?;
                return Ok(());
            }
            assembly
        }
        Command::Assemble {
            input,
            json,
            code,
            data,
        } => {
            let program = commands::assemble(&input)?;
            if let Some(path) = code {
                std::fs::write(path, program.code_image())?;
            }
            if let Some(path) = data {
                std::fs::write(path, program.data_image())?;
            }
            if json {
                serde_json::to_string_pretty(&commands::listing_json(&program))?
            } else {
                commands::listing_text(&program)
            }
        }
        Command::Disassemble { image } => commands::disassemble(&std::fs::read(image)?)?,
        Command::Encode { value, encoding } => commands::encode(&value, encoding.as_deref())?,
        Command::Decode { word, encoding } => commands::decode(&word, encoding.as_deref())?,
        Command::BitfileInfo { path } => commands::bitfile_info(&path)?,
    };
    println!("{output}");
    Ok(())
}
