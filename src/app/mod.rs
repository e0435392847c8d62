mod pipeline;


use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveDate, Timelike, Utc};
use tracing::info;

use crate::cli::Cli;
use crate::config::Config;
use crate::paths::default_config_path;

use self::pipeline::Pipeline;

const CLOCK_POLL: Duration = Duration::from_secs(60);

pub fn run(cli: Cli) -> Result<()> {
    if let Some(path) = cli.example_config {
        Config::write_example(&path)?;
        info!("wrote example config to {}", path.display());
        return Ok(());
    }

    let config_path = match cli.config_file {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)?;
    if cli.trigger_minute.is_some() {
        config.trigger_minute = cli.trigger_minute;
        config.validate()?;
    }

    let pipeline = Pipeline::from_config(&config)?;
    match config.trigger_minute {
        Some(minute) => run_hourly(&pipeline, minute),
        None => run_once(&pipeline),
    }
}

fn run_once(pipeline: &Pipeline) -> Result<()> {
    let summary = pipeline.run_at(Utc::now().timestamp())?;
    info!(
        discovered = summary.discovered,
        published = summary.published,
        skipped = summary.skipped,
        reverted = summary.reverted,
        rate_limited = summary.rate_limited,
        "run finished"
    );
    Ok(())
}

fn run_hourly(pipeline: &Pipeline, minute: u32) -> Result<()> {
    info!("running every hour at minute {minute}");
    let mut last_run = None::<(NaiveDate, u32)>;
    loop {
        let now = Local::now();
        let slot = (now.date_naive(), now.hour());
        if now.minute() == minute && last_run != Some(slot) {
            last_run = Some(slot);
            run_once(pipeline)?;
        }
        thread::sleep(CLOCK_POLL);
    }
}
