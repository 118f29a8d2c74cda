#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::utils::SessionOptions;
use webassist::WebassistError;
use webassist::types::OutputFormat;

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "webassist")]
#[command(about = "Voice and text driven browser assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: SessionOptions,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session reading commands from stdin
    Run {
        /// Page to open first (defaults to the configured start URL)
        #[arg(long)]
        start_url: Option<String>,
    },

    /// Run one or more commands and print what happened
    Exec {
        /// Commands, run in order until one fails
        #[arg(required = true)]
        commands: Vec<String>,

        /// Page to open first (defaults to the configured start URL)
        #[arg(short, long)]
        url: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Print the page context used for selector suggestions
    Context {
        /// Page to describe (defaults to the configured start URL)
        #[arg(short, long)]
        url: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            let webassist_err: WebassistError = err.into();

            // JSON on stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": webassist_err.to_string(),
                "exit_code": webassist_err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", webassist_err);
            std::process::exit(webassist_err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webassist=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { start_url } => commands::run::handle_run(&cli.options, start_url).await,
        Commands::Exec {
            commands: list,
            url,
            format,
        } => commands::exec::handle_exec(&cli.options, list, url, format).await,
        Commands::Context { url, format } => {
            commands::context::handle_context(&cli.options, url, format).await
        }
        Commands::Config => commands::config::handle_config(&cli.options),
    }
}
