use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::PublishError;
use crate::metadata::Metadata;

/// Slowest link we still wait for; bounds the upload time by file size.
const MIN_UPLOAD_BYTES_PER_SEC: u64 = 64 * 1024;

/// How the hosting service answered an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UploadOutcome {
    Published { key: String },
    RateLimited { message: String, retry_after: Duration },
    Rejected { message: String },
    Unreadable { status: u16, body: String },
}

pub(crate) struct Publisher {
    client: Client,
    api_url: String,
    access_token: String,
    timeout: Duration,
}

/// Request timeout for an upload of `bytes`: the base timeout plus the transfer
/// time at the slowest accepted rate.
pub(crate) fn upload_timeout(base: Duration, bytes: u64) -> Duration {
    base + Duration::from_secs(bytes.div_ceil(MIN_UPLOAD_BYTES_PER_SEC))
}

impl Publisher {
    pub(crate) fn new(api_url: &str, access_token: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            // Set per request from the file size.
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            access_token: access_token.to_string(),
            timeout,
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/", self.api_url.trim_end_matches('/'))
    }

    fn build_form(
        &self,
        audio: &Path,
        cover_jpeg: Option<Vec<u8>>,
        metadata: &Metadata,
    ) -> Result<Form, PublishError> {
        let mut form = Form::new();
        for (key, value) in metadata.form_fields() {
            form = form.text(key, value);
        }
        form = form
            .file("mp3", audio)
            .map_err(|source| PublishError::Attach {
                path: audio.to_path_buf(),
                source,
            })?;
        if let Some(jpeg) = cover_jpeg {
            let picture = Part::bytes(jpeg)
                .file_name("cover.jpg")
                .mime_str("image/jpeg")?;
            form = form.part("picture", picture);
        }
        Ok(form)
    }

    pub(crate) fn upload(
        &self,
        audio: &Path,
        cover_jpeg: Option<Vec<u8>>,
        metadata: &Metadata,
    ) -> Result<UploadOutcome, PublishError> {
        let size = std::fs::metadata(audio)
            .map_err(|source| PublishError::Attach {
                path: audio.to_path_buf(),
                source,
            })?
            .len();
        let form = self.build_form(audio, cover_jpeg, metadata)?;
        info!("starting upload of '{}' ({size} bytes)", metadata.name);

        let response = self
            .client
            .post(self.upload_url())
            .query(&[("access_token", self.access_token.as_str())])
            .multipart(form)
            .timeout(upload_timeout(self.timeout, size))
            .send()?;
        let status = response.status().as_u16();
        let success = response.status().is_success();
        let body = response.text()?;
        debug!(status, "upload response: {body}");

        Ok(interpret_response(status, success, &body))
    }
}

pub(crate) fn interpret_response(status: u16, success: bool, body: &str) -> UploadOutcome {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return UploadOutcome::Unreadable {
            status,
            body: body.chars().take(240).collect(),
        };
    };

    if success {
        return match parsed.pointer("/result/key").and_then(Value::as_str) {
            Some(key) if !key.trim().is_empty() => UploadOutcome::Published {
                key: key.trim().to_string(),
            },
            _ => UploadOutcome::Rejected {
                message: "upload succeeded without a result key".to_string(),
            },
        };
    }

    let message = parsed
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("upload failed with HTTP status {status}"));
    match parsed.pointer("/error/retry_after").and_then(retry_seconds) {
        Some(seconds) => UploadOutcome::RateLimited {
            message,
            retry_after: Duration::from_secs(seconds),
        },
        None => UploadOutcome::Rejected { message },
    }
}

fn retry_seconds(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|secs| secs.max(0.0).ceil() as u64))
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
}
