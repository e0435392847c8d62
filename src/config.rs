use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Runtime settings. Field names are the lowercase forms of the recognised
/// environment keys, so `MYRADIO_URL` overrides `myradio_url`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct Config {
    pub(crate) mixcloud_client_oauth: String,
    #[serde(default = "default_mixcloud_api_url")]
    pub(crate) mixcloud_api_url: String,

    pub(crate) myradio_api_key: String,
    pub(crate) myradio_url: String,
    pub(crate) myradio_image_domain: String,

    pub(crate) loggerng_url: String,
    pub(crate) loggerng_memberid: String,
    pub(crate) loggerng_logdir: PathBuf,
    #[serde(default = "default_loggerng_timeout_mins")]
    pub(crate) loggerng_timeout_mins: u64,

    /// Seconds skipped at the top of each show.
    #[serde(default)]
    pub(crate) news_length: i64,
    /// Minute of the hour at which the pipeline re-runs; unset runs once.
    #[serde(default)]
    pub(crate) trigger_minute: Option<u32>,

    #[serde(default = "default_lookback_days")]
    pub(crate) lookback_days: i64,
    #[serde(default = "default_min_tracks")]
    pub(crate) min_tracks: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub(crate) http_timeout_secs: u64,
    #[serde(default = "default_dst_correction")]
    pub(crate) dst_correction: bool,
}

fn default_mixcloud_api_url() -> String {
    "https://api.mixcloud.com/".to_string()
}

fn default_loggerng_timeout_mins() -> u64 {
    30
}

fn default_lookback_days() -> i64 {
    65
}

fn default_min_tracks() -> usize {
    1
}

fn default_http_timeout_secs() -> u64 {
    60
}

fn default_dst_correction() -> bool {
    true
}

impl Config {
    /// Reads the TOML file (when present) and layers the process environment on top.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let mut builder = config::Config::builder();
        if path.exists() {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(config::Environment::default().try_parsing(true));

        let config: Self = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let required = [
            ("MIXCLOUD_CLIENT_OAUTH", &self.mixcloud_client_oauth),
            ("MIXCLOUD_API_URL", &self.mixcloud_api_url),
            ("MYRADIO_API_KEY", &self.myradio_api_key),
            ("MYRADIO_URL", &self.myradio_url),
            ("MYRADIO_IMAGE_DOMAIN", &self.myradio_image_domain),
            ("LOGGERNG_URL", &self.loggerng_url),
            ("LOGGERNG_MEMBERID", &self.loggerng_memberid),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                bail!("{key} must not be empty");
            }
        }
        if self.loggerng_logdir.as_os_str().is_empty() {
            bail!("LOGGERNG_LOGDIR must not be empty");
        }
        if let Some(minute) = self.trigger_minute {
            if minute >= 60 {
                bail!("TRIGGER_MINUTE must be between 0 and 59, got {minute}");
            }
        }
        if self.lookback_days <= 0 {
            bail!("LOOKBACK_DAYS must be positive");
        }
        Ok(())
    }

    pub(crate) fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub(crate) fn example() -> Self {
        Self {
            mixcloud_client_oauth: "useroauthtokengoeshere".to_string(),
            mixcloud_api_url: default_mixcloud_api_url(),
            myradio_api_key: "apikeygoeshere".to_string(),
            myradio_url: "https://mydomain.fm/api/v2/".to_string(),
            myradio_image_domain: "https://mydomain.fm/".to_string(),
            loggerng_url: "http://mylogger.mydomain.fm:8080/".to_string(),
            loggerng_memberid: "779".to_string(),
            loggerng_logdir: PathBuf::from("/mnt/logs"),
            loggerng_timeout_mins: default_loggerng_timeout_mins(),
            news_length: 0,
            trigger_minute: None,
            lookback_days: default_lookback_days(),
            min_tracks: default_min_tracks(),
            http_timeout_secs: default_http_timeout_secs(),
            dst_correction: default_dst_correction(),
        }
    }

    pub(crate) fn write_example(path: &Path) -> Result<()> {
        let rendered =
            toml::to_string_pretty(&Self::example()).context("failed to render example config")?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }
        std::fs::write(path, rendered)
            .with_context(|| format!("failed to write example config to {}", path.display()))
    }
}
