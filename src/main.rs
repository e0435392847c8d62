mod app;
mod cli;
mod config;
mod cover;
mod error;
mod http;
mod logging;
mod metadata;
mod paths;
mod publish;
mod recording;
mod schedule;
#[cfg(test)]
mod testing;
mod timing;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logging::init(cli.verbose)?;
    app::run(cli)
}
