use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpError;

/// Failures talking to the schedule service. Every variant ends the run.
#[derive(Debug, Error)]
pub(crate) enum ScheduleError {
    #[error("schedule API returned 401 for {method}: no API key provided")]
    Unauthorized { method: String },
    #[error("schedule API returned 403: the API key has no access to {method}")]
    Forbidden { method: String },
    #[error("schedule API returned status {status} for {method}")]
    Status { method: String, status: String },
    #[error("schedule API request {method} failed: {source}")]
    Http {
        method: String,
        #[source]
        source: HttpError,
    },
    #[error("unexpected payload from {method}: {source}")]
    Payload {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ScheduleError {
    /// Credential failures; nothing else the schedule API does can succeed afterwards.
    pub(crate) fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Forbidden { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum TimeError {
    #[error("cannot parse local time '{0}'")]
    DateTime(String),
    #[error("cannot parse duration '{0}'")]
    Duration(String),
    #[error("window ends at {end} before it starts at {start}")]
    InvertedWindow { start: i64, end: i64 },
}

#[derive(Debug, Error)]
pub(crate) enum RecordingError {
    #[error("logging service unreachable: {0}")]
    Unreachable(#[source] HttpError),
    #[error("log generation not ready after {polls} polls")]
    Timeout { polls: u64 },
    #[error("logging service request failed: {0}")]
    Http(#[source] HttpError),
    #[error("logging service response has no filename_disk")]
    MissingFilename,
    #[error("recording {} does not exist", .0.display())]
    MissingFile(PathBuf),
}

impl From<HttpError> for RecordingError {
    fn from(err: HttpError) -> Self {
        if err.is_unreachable() {
            Self::Unreachable(err)
        } else {
            Self::Http(err)
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum CoverError {
    #[error("cover fetch failed: {0}")]
    Fetch(#[from] HttpError),
    #[error("cover decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cover encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Error)]
pub(crate) enum PublishError {
    #[error("cannot attach recording {}: {source}", .path.display())]
    Attach {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
}
