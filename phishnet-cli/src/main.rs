//! phishnet CLI: train the phishing-URL classifier and serve predictions.
//!
//! Every subcommand resolves the layered pipeline configuration relative to
//! the workspace directory.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// phishnet: phishing URL detection pipeline
#[derive(Parser, Debug)]
#[command(name = "phishnet", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the full training pipeline and deploy the selected model
    Train,
    /// Classify the rows of a feature CSV
    Predict {
        /// Input CSV with the feature columns the model was trained on
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the rows with the appended prediction column
        #[arg(short, long, default_value = "prediction_output/output.csv")]
        output: PathBuf,
    },
    /// Extract features from a URL and classify it
    PredictUrl {
        /// URL to classify
        url: String,
    },
    /// Load a labeled feature CSV into the record store
    PushData {
        /// CSV file to load; replaces the configured collection
        file: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (0, true) => "error",
        (0, false) => "info",
        (1, _) => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // Structured JSON logs in daily files; the guard flushes on exit.
    let _log_guard = match directories::ProjectDirs::from("dev", "phishnet", "phishnet") {
        Some(dirs) => {
            let log_dir = dirs.data_dir().join("logs");
            std::fs::create_dir_all(&log_dir)?;
            let file_appender = tracing_appender::rolling::daily(&log_dir, "phishnet.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(json_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
    };

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
