pub mod commands;
pub mod fixtures;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use revguard_core::{EngineConfig, LogFormat};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "revguard",
    about = "Revguard leakage detection CLI",
    long_about = "Run revenue leakage detection over unified billing records, generate \
                  deterministic demo batches, and inspect effective configuration.",
    after_help = "Examples:\n  revguard detect --input records.json\n  revguard demo --records 200 --seed 42\n  revguard config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a revguard.toml config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run leakage detection over a JSON batch of unified billing records")]
    Detect {
        #[arg(long, help = "Path to a JSON array of unified records")]
        input: PathBuf,
        #[arg(long, help = "Emit the full machine-readable detection report")]
        json: bool,
    },
    #[command(about = "Run detection over a deterministic synthetic batch with injected leakage")]
    Demo {
        #[arg(long, default_value_t = 200, help = "Number of synthetic records to generate")]
        records: usize,
        #[arg(long, default_value_t = 42, help = "Seed for the deterministic generator")]
        seed: u64,
        #[arg(long, help = "Emit the full machine-readable detection report")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Detect { input, json } => {
            commands::detect::run(cli.config.as_deref(), &input, json)
        }
        Command::Demo { records, seed, json } => {
            commands::demo::run(cli.config.as_deref(), records, seed, json)
        }
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(cli.config.as_deref()),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Tolerates repeated calls; only the first subscriber in a process wins.
pub(crate) fn init_logging(config: &EngineConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(log_level);
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
