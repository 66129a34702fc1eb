//! `ringside` command line.
//!
//! Drives the same registration the proxy host uses, one event at a time,
//! against the configured cache database. Results are printed to stdout as
//! JSON; logs go to stderr.

use anyhow::Result;
use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbose);
    cli::run(cli).await
}
