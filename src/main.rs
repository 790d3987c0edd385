// src/main.rs

//! codementor
//!
//! Entry point for the codementor CLI and JSON API.
//!
//! Runs learner-submitted Python, JavaScript and Java in throwaway
//! directories with a wall-clock limit, and serves starter templates,
//! pre-run checks, session reports and AI hints to the editor front-end.
//!
//! This file only wires up logging and hands off to `commands`.

mod analysis;
mod auth;
mod checks;
mod cli;
mod commands;
mod config;
mod encoding;
mod engine;
mod language;
mod mentor;
mod metrics;
mod report;
mod run_id;
mod runner;
mod runtime;
mod sinks;
mod templates;
mod toolchain;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; a missing file is not an error
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = cli::Cli::parse();
    commands::dispatch(cli).await
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` (default info), forced to debug by `DEBUG=true`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(log_level(
            std::env::var("LOG_LEVEL").ok().as_deref(),
            std::env::var("DEBUG").ok().as_deref(),
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn log_level(level: Option<&str>, debug: Option<&str>) -> String {
    if matches!(debug.map(str::trim), Some(v) if v.eq_ignore_ascii_case("true") || v == "1") {
        return "debug".to_string();
    }
    level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("info")
        .to_ascii_lowercase()
}
