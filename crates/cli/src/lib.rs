pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shelfwise_core::config::LoadOptions;
use tracing_subscriber::EnvFilter;

use crate::commands::ask::AskOptions;

#[derive(Debug, Parser)]
#[command(
    name = "shelfwise",
    about = "Shelfwise operator CLI",
    long_about = "Prepare the Shelfwise catalog database, inspect configuration, check readiness, and run single agent turns.",
    after_help = "Examples:\n  shelfwise doctor --json\n  shelfwise seed\n  shelfwise ask \"which books are low on stock?\"\n  shelfwise ask --offline --script turn.json \"restock Clean Code by 3\""
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog, customers and historical orders into an empty database")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, completion provider settings, and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one request through the agent pipeline and print the outcome as JSON")]
    Ask {
        #[arg(required = true, help = "Natural-language request, e.g. \"find books by Martin Kleppmann\"")]
        text: Vec<String>,
        #[arg(long, help = "Replay scripted completion responses instead of calling a provider")]
        offline: bool,
        #[arg(long, requires = "offline", help = "JSON array of completion responses for --offline")]
        script: Option<PathBuf>,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            ..LoadOptions::default()
        }
    }
}

/// Logs go to stderr; stdout carries only command output.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Ask { text, offline, script } => {
            commands::ask::run(options, AskOptions { text: text.join(" "), offline, script })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
