use anyhow::{Context, Result};
use clap::Parser;
use formdeck::ui::{self, RunArgs};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Fill in a declared form in the terminal.
#[derive(Parser, Debug)]
#[command(name = "formdeck", version, about)]
struct Args {
    /// Form declaration (YAML or JSON).
    form: PathBuf,
    /// Document providing the initial values.
    document: Option<PathBuf>,
}

// The terminal owns stdout, so logs only go to FORMDECK_LOG_FILE.
fn init_logging() -> Result<()> {
    let Ok(path) = std::env::var("FORMDECK_LOG_FILE") else {
        return Ok(());
    };
    let file = std::fs::File::create(&path).with_context(|| format!("creating log file {path}"))?;
    let filter = EnvFilter::try_from_env("FORMDECK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;
    ui::run(RunArgs {
        form: args.form,
        document: args.document,
    })
}
