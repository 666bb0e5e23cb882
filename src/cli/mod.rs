pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use self::commands::{parse, run};

#[derive(Parser)]
#[command(name = "ebs")]
#[command(about = "EBS scripting language tool", version, author)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse an EBS script and output the JSON representation of the AST
    Parse {
        /// The input script to parse
        #[arg(required = true)]
        input: PathBuf,

        /// The output JSON file (defaults to <input>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit errors as JSON to stdout and exit with non-zero status
        #[arg(long, default_value_t = false)]
        errors_json: bool,
    },

    /// Run an EBS script against the console host
    Run {
        /// The input script to execute
        #[arg(required = true)]
        input: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Parse {
            input,
            output,
            errors_json,
        } => parse::execute(input, output, errors_json),
        Commands::Run { input } => run::execute(input),
    }
}
