use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "mixclouder",
    version,
    about = "Takes recent shows and publishes them to Mixcloud"
)]
pub struct Cli {
    /// TOML config file; environment variables override its values.
    #[arg(short = 'c', long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Write an example config file to the given path and exit.
    #[arg(long = "example-config", value_name = "PATH")]
    pub example_config: Option<PathBuf>,

    /// Re-run every hour at this minute instead of running once.
    #[arg(long, value_name = "MINUTE", value_parser = clap::value_parser!(u32).range(0..60))]
    pub trigger_minute: Option<u32>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,
}
