//! Binary entry point
//!
//! Parses configuration, wires up logging and hands control to the
//! recorder. Exits 0 after a clean interrupt-triggered shutdown and 1
//! on startup failure or any uncaught internal error.

use anyhow::Context;
use clap::Parser;
use yaptabber::config::Cli;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    yaptabber::init_tracing();

    if let Err(err) = run_to_completion(cli).await {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run_to_completion(cli: Cli) -> anyhow::Result<()> {
    yaptabber::run(cli)
        .await
        .context("recorder terminated abnormally")
}
