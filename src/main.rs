//! Pricewise - terminal client for the product-search agent

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use the library crate
use pricewise::app;
use pricewise::types::config::{ResumeMode, DEFAULT_API_URL};
use pricewise::util::default_state_file;

#[derive(Parser, Debug)]
#[command(name = "pricewise")]
#[command(about = "Pricewise - chat with a product-search agent from the terminal")]
#[command(version)]
struct Args {
    /// Initial prompt to start the conversation with.
    /// Starts interactive mode with this prompt pre-submitted.
    #[arg(value_name = "PROMPT")]
    prompt: Option<String>,

    /// Print mode: send prompt, print response, then exit (non-interactive).
    #[arg(short = 'p', long)]
    print: bool,

    /// Base URL of the agent's chat API
    #[arg(long, env = "PRICEWISE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// File holding the persisted session id
    #[arg(long, env = "PRICEWISE_STATE_FILE", value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Discard any persisted session and start a new conversation.
    #[arg(long)]
    new: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Info-level logs would interleave with the conversation on the terminal
    let filter = if args.debug { "debug" } else { "warn" };

    // Interactive output shares the terminal with logs, so debug logs go to a file
    let is_interactive = !args.print;

    if is_interactive && args.debug {
        let log_path = std::env::temp_dir().join("pricewise.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)
            .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {e}", log_path.display()))?;

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| filter.into()),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .init();

        eprintln!("Debug logs written to: {}", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| filter.into()),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    let resume_mode = if args.new {
        ResumeMode::Fresh
    } else {
        ResumeMode::Persisted
    };

    let state_file = args.state_file.unwrap_or_else(default_state_file);

    let mut config = app::Config::new(args.api_url, state_file)
        .with_resume_mode(resume_mode)
        .with_print_mode(args.print);
    if let Some(prompt) = args.prompt {
        config = config.with_initial_prompt(prompt);
    }

    app::run(config).await
}
