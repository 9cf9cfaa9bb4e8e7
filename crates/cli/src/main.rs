//! windowpack CLI — the main entry point.
//!
//! Commands:
//! - `assemble` — Pack a session into a token budget and print the report
//! - `compress` — Run the overflow cascade on a piece of text
//! - `compact`  — Session-wide compaction of a saved history
//! - `plan`     — Generation ceiling and next action for a usage level
//! - `config`   — Show, validate or locate the configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "windowpack",
    about = "windowpack — context-window budget allocation and overflow compression",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Config file (defaults to ~/.windowpack/config.toml)
    #[arg(short, long, global = true, env = "WINDOWPACK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble one turn's context from a saved session
    Assemble(commands::assemble::AssembleArgs),

    /// Compress text to a token ceiling
    Compress {
        /// Input file (reads stdin when omitted)
        input: Option<PathBuf>,

        /// Token ceiling
        #[arg(short = 'n', long)]
        ceiling: usize,

        /// Skip the summarization stage
        #[arg(long)]
        no_summarize: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compact a whole session history
    Compact {
        /// Session JSON (a conversation object or an array of messages)
        session: PathBuf,

        /// Write the compacted session here (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Knowledge file that receives harvested facts
        #[arg(short, long)]
        knowledge: Option<PathBuf>,

        /// Skip the summarization stage
        #[arg(long)]
        no_summarize: bool,
    },

    /// Compute the generation ceiling and the next action
    Plan {
        /// Total context capacity (defaults to the configured budget)
        #[arg(short, long)]
        budget: Option<usize>,

        /// Tokens already in use
        #[arg(short, long, conflicts_with = "session")]
        used: Option<usize>,

        /// Measure usage from a saved session instead
        #[arg(short, long)]
        session: Option<PathBuf>,

        /// Preamble file counted together with the session
        #[arg(short, long, requires = "session")]
        preamble: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets omitted)
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
    /// Print a default configuration file
    Default,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Assemble(args) => commands::assemble::run(config_path, args).await?,
        Commands::Compress {
            input,
            ceiling,
            no_summarize,
            json,
        } => commands::compress::run(config_path, input, ceiling, no_summarize, json).await?,
        Commands::Compact {
            session,
            output,
            knowledge,
            no_summarize,
        } => commands::compact::run(config_path, session, output, knowledge, no_summarize).await?,
        Commands::Plan {
            budget,
            used,
            session,
            preamble,
        } => commands::plan::run(config_path, budget, used, session, preamble).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
            ConfigAction::Default => commands::config_cmd::default().await?,
        },
    }

    Ok(())
}
