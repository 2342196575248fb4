mod cmd;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::BuildArgs;
use crate::output::OutputFormat;

/// pb - Polyglot build orchestrator
#[derive(Parser)]
#[command(name = "pb")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a target and everything it depends on
  Build(BuildArgs),

  /// List the targets of a repository
  Targets {
    /// Repository locator (default: the current directory)
    locator: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Remove build outputs
  Clean {
    /// Remove only the run with this build tag
    tag: Option<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      output::failed(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Build(args) => cmd::cmd_build(args, cli.verbose),
    Commands::Targets { locator, format } => cmd::cmd_targets(locator.as_deref(), format),
    Commands::Clean { tag } => cmd::cmd_clean(tag.as_deref()),
  }
}
