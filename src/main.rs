mod bus;
mod cli;
mod config;
mod database;
mod logging;
mod manager;
mod monitoring;
mod pool;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Cli::parse().run().await
}
