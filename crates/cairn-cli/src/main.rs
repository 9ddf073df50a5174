//! Cairn CLI - Command-line interface for the Cairn virtual machine

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod repl;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(version = cairn_core::VERSION)]
#[command(about = "The Cairn stack virtual machine", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive REPL
    Repl,

    /// Assemble and run an instruction listing
    Run {
        /// Path to the listing
        file: PathBuf,

        /// Also print the variables left after the run
        #[arg(long)]
        vars: bool,
    },

    /// Print the disassembly of an instruction listing
    Disasm {
        /// Path to the listing
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Repl) | None => {
            let mut repl = repl::Repl::new(config)?;
            repl.run()?;
        }

        Some(Commands::Run { file, vars }) => {
            let vm = commands::run_file(&file, config)?;
            print!("{}", commands::format_stack(&vm));
            if vars {
                print!("{}", commands::format_variables(&vm));
            }
        }

        Some(Commands::Disasm { file }) => {
            print!("{}", commands::disassemble_file(&file)?);
        }
    }

    Ok(())
}

/// Install the stderr log subscriber; `RUST_LOG` overrides the verbosity flag
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
