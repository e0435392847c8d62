use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::RecordingError;
use crate::http;
use crate::timing::Window;

const NOT_READY_STATUS: u16 = 403;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const TITLE_PREFIX_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Recording {
    pub(crate) path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Poll {
    Ready(Recording),
    Pending,
}

/// Client for the audio logging service (loggerng).
pub(crate) struct RecordingClient {
    agent: ureq::Agent,
    base_url: String,
    member_id: String,
    log_dir: PathBuf,
    max_polls: u64,
    poll_interval: Duration,
}

/// Title sent to the logging service: a short prefix of the show title plus its start label.
pub(crate) fn log_title(title: &str, start_label: &str) -> String {
    let prefix = title.chars().take(TITLE_PREFIX_CHARS).collect::<String>();
    format!("{} {}", prefix.trim_end(), start_label.trim())
}

impl RecordingClient {
    pub(crate) fn new(
        base_url: &str,
        member_id: &str,
        log_dir: &Path,
        timeout_mins: u64,
        request_timeout: Duration,
    ) -> Self {
        Self {
            agent: http::build_agent(request_timeout),
            base_url: base_url.to_string(),
            member_id: member_id.to_string(),
            log_dir: log_dir.to_path_buf(),
            // Two polls per minute at the default interval.
            max_polls: timeout_mins.saturating_mul(2).max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn query(&self, window: &Window, title: &str) -> Vec<(String, String)> {
        vec![
            ("user".to_string(), self.member_id.clone()),
            ("start".to_string(), window.start.to_string()),
            ("end".to_string(), window.end.to_string()),
            ("format".to_string(), "mp3".to_string()),
            ("title".to_string(), title.to_string()),
        ]
    }

    /// Asks the logging service to start building the file. Completion is observed by polling.
    pub(crate) fn request_generation(
        &self,
        window: &Window,
        title: &str,
    ) -> Result<(), RecordingError> {
        let url = http::join_url(&self.base_url, "make");
        match http::get_text(&self.agent, &url, &self.query(window, title)) {
            Ok(_) => Ok(()),
            Err(err) if err.is_unreachable() => Err(RecordingError::Unreachable(err)),
            // The make response carries nothing we need; download polling reports real failures.
            Err(err) => {
                debug!("log generation request answered with {err}");
                Ok(())
            }
        }
    }

    pub(crate) fn poll_download(
        &self,
        window: &Window,
        title: &str,
    ) -> Result<Poll, RecordingError> {
        let url = http::join_url(&self.base_url, "download");
        let body = match http::get_json(&self.agent, &url, &self.query(window, title)) {
            Ok(body) => body,
            Err(err) if err.status() == Some(NOT_READY_STATUS) => return Ok(Poll::Pending),
            Err(err) => return Err(err.into()),
        };
        self.locate(&body).map(Poll::Ready)
    }

    fn locate(&self, body: &Value) -> Result<Recording, RecordingError> {
        let filename = body
            .get("filename_disk")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(RecordingError::MissingFilename)?;
        let path = self.log_dir.join(filename);
        if !path.is_file() {
            return Err(RecordingError::MissingFile(path));
        }
        Ok(Recording { path })
    }

    /// Requests generation, then polls until the file is ready or the poll ceiling is hit.
    pub(crate) fn fetch(&self, window: &Window, title: &str) -> Result<Recording, RecordingError> {
        self.request_generation(window, title)?;
        info!(
            "initiated log generation for '{title}' ({})",
            window.duration_label()
        );

        for poll in 1..=self.max_polls {
            match self.poll_download(window, title)? {
                Poll::Ready(recording) => return Ok(recording),
                Poll::Pending if poll == self.max_polls => {}
                Poll::Pending => {
                    info!("still waiting for log generation ({poll}/{})", self.max_polls);
                    thread::sleep(self.poll_interval);
                }
            }
        }
        Err(RecordingError::Timeout {
            polls: self.max_polls,
        })
    }
}
