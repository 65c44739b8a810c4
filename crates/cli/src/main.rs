//! promptc CLI: the main entry point.
//!
//! Commands:
//! - `compile`: Compile a prompt for one context
//! - `check`  : Lint the configured atom corpus
//! - `init`   : Write a starter config
//! - `config` : Show the effective configuration

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "promptc",
    about = "promptc: budgeted prompt compiler for agent runtimes",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $PROMPTC_CONFIG or ~/.promptc/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a prompt for one context
    Compile(CompileArgs),

    /// Lint the configured atom corpus
    Check,

    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub struct CompileArgs {
    /// Shard identifier
    #[arg(long)]
    pub shard: String,

    /// Session identifier
    #[arg(long)]
    pub session: Option<String>,

    /// Intent verb (e.g. explain, deploy)
    #[arg(long = "intent-verb")]
    pub verb: String,

    /// Intent category
    #[arg(long = "intent-category", default_value = "query")]
    pub category: String,

    /// Intent target
    #[arg(long)]
    pub target: Option<String>,

    /// Token budget (default from config)
    #[arg(short, long, allow_negative_numbers = true)]
    pub budget: Option<i64>,

    /// Context filter tag; repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Free-text similarity query
    #[arg(short, long)]
    pub query: Option<String>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the default config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays the prompt
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Compile(args) => commands::compile::run(config_path, args).await?,
        Commands::Check => commands::check::run(config_path).await?,
        Commands::Init { force } => commands::init::run(config_path, force).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
        },
    }

    Ok(())
}
