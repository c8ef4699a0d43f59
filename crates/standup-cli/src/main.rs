mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "standupbot",
    about = "IRC standup bot: collects daily standups and reminds whoever is missing",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: conf/custom-config.yaml in this or a parent directory)
    #[arg(long, short = 'c', global = true, env = "STANDUP_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to IRC, arm the reminder timers and serve the submission form
    Run {
        /// Config file; overrides --config
        path: Option<PathBuf>,
    },

    /// Validate the config and show when each phase fires next
    Check,

    /// Show who has not submitted this cycle
    Missing,

    /// Clear every submission marker now, as the deadline does
    Reset,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Run { path } => {
            let config = root::resolve_config(path.as_deref().or(cli.config.as_deref()));
            cmd::run::run(&config)
        }
        Commands::Check => cmd::check::run(&root::resolve_config(cli.config.as_deref()), cli.json),
        Commands::Missing => {
            cmd::missing::run(&root::resolve_config(cli.config.as_deref()), cli.json)
        }
        Commands::Reset => cmd::reset::run(&root::resolve_config(cli.config.as_deref()), cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
