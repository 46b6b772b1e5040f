//! MediSage CLI application
//!
//! Drives relay sessions from the command line. Streaming commands (`chat`,
//! `score`) print the downstream frame stream to stdout exactly as a web
//! client would receive it; diagnostics go to stderr.
//!
//! # Examples
//!
//! ```bash
//! medisage conversations new --agent 腹痛患者
//! medisage chat <conversation_id> "哪里不舒服？"
//! medisage score <conversation_id>
//! ```

mod args;
mod commands;
mod router;
mod signal_handler;

use args::Cli;
use clap::Parser;
use medisage_core::config::LoggingConfig;
use medisage_core::error::RelayResult;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> RelayResult<()> {
    let cli = Cli::parse();
    let config = medisage_core::load_config(cli.config_file.as_deref())?;

    init_logging(&config.logging);

    router::route(cli, config).await
}

/// Install the tracing subscriber; RUST_LOG overrides the configured level
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.is_json() {
        builder.json().init();
    } else if logging.format.eq_ignore_ascii_case("compact") {
        builder.compact().init();
    } else {
        builder.pretty().init();
    }
}
