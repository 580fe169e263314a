//! Command-line front end.
//!
//! Runs one turn per message argument, or one turn per stdin line when no
//! message is given.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use tracing::debug;

use codeloop::config::{self, CodeloopConfig};
use codeloop::llm::OptionsPatch;
use codeloop::logging::{init_logging, LogLevel};
use codeloop::orchestrator::{Orchestrator, StreamEvent};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Message to send; reads one message per stdin line when omitted
    message: Vec<String>,

    /// Path to config file (default: ./codeloop.toml, then the XDG config dir)
    #[arg(short, long, env = "CODELOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Named provider from the config file
    #[arg(short, long, env = "CODELOOP_PROVIDER")]
    provider: Option<String>,

    /// Override the provider's model
    #[arg(short, long)]
    model: Option<String>,

    /// Override the iteration ceiling
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Print text as it streams in
    #[arg(short, long)]
    stream: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<CodeloopConfig> {
    match cli.config {
        Some(ref path) => config::from_path(path).context("loading config file"),
        None => config::load().context("loading config"),
    }
}

fn build(cli: &Cli, config: &CodeloopConfig) -> Result<Orchestrator> {
    if config.is_empty() {
        let searched: Vec<String> = config::search_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        bail!(
            "no providers configured; add a [providers.<name>] section to one of: {}",
            searched.join(", ")
        );
    }

    let mut builder = config.orchestrator_builder(cli.provider.as_deref())?;
    if let Some(ref model) = cli.model {
        builder = builder.request_options(OptionsPatch::default().with_model(model));
    }
    if let Some(max) = cli.max_iterations {
        builder = builder.max_iterations(max);
    }

    Ok(builder.build()?)
}

async fn turn(orchestrator: &mut Orchestrator, input: &str, stream: bool) -> Result<()> {
    if !stream {
        let output = orchestrator.run(input).await?;
        println!("{output}");
        return Ok(());
    }

    let mut events = orchestrator.run_stream(input);
    let mut stdout = io::stdout();
    while let Some(event) = events.next().await {
        debug!(event = event.name(), "Stream event");
        match event {
            StreamEvent::Text { delta, .. } => {
                write!(stdout, "{delta}")?;
                stdout.flush()?;
            }
            StreamEvent::CodeResult { id, result, success } => {
                let status = if success { "ok" } else { "failed" };
                eprintln!("\n[{id} {status}] {result}");
            }
            StreamEvent::Iteration { iteration } => {
                eprintln!("\n[iteration {iteration}]");
            }
            StreamEvent::Complete { .. } => {
                writeln!(stdout)?;
            }
            StreamEvent::Error { message } => bail!(message),
            StreamEvent::Thinking
            | StreamEvent::CodeFound { .. }
            | StreamEvent::CodeExecuting { .. } => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging = logging.with_level(LogLevel::Debug);
    }
    init_logging(&logging).context("initializing logging")?;

    let mut orchestrator = build(&cli, &config)?;

    if !cli.message.is_empty() {
        let input = cli.message.join(" ");
        return turn(&mut orchestrator, &input, cli.stream).await;
    }

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        turn(&mut orchestrator, input, cli.stream).await?;
    }

    Ok(())
}
