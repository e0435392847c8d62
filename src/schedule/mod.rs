mod model;

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ScheduleError;
use crate::http::{self, HttpError};
use crate::timing;

pub(crate) use model::*;

/// Studio source id the selector reports while the automated jukebox is on air.
pub(crate) const JUKEBOX_SOURCE: &str = "3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StudioSource(String);

impl StudioSource {
    pub(crate) fn is_jukebox(&self) -> bool {
        self.0 == JUKEBOX_SOURCE
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSource {
    Id(i64),
    Name(String),
}

/// Client for the station scheduling API (MyRadio).
pub(crate) struct ScheduleClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl ScheduleClient {
    pub(crate) fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            agent: http::build_agent(timeout),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn auth_query(&self, mut query: Vec<(String, String)>) -> Vec<(String, String)> {
        query.push(("api_key".to_string(), self.api_key.clone()));
        query
    }

    fn request(&self, method: &str, query: Vec<(String, String)>) -> Result<Value, ScheduleError> {
        debug!(method, "schedule API request");
        let url = http::join_url(&self.base_url, method);
        let response = http::get_json(&self.agent, &url, &self.auth_query(query));
        unwrap_envelope(method, response)
    }

    fn submit(&self, method: &str, form: &[(&str, &str)]) -> Result<Value, ScheduleError> {
        debug!(method, "schedule API submit");
        let url = http::join_url(&self.base_url, method);
        let response = http::post_form_json(&self.agent, &url, &self.auth_query(Vec::new()), form);
        unwrap_envelope(method, response)
    }

    /// Next timeslot starting after `after_epoch`, or `None` past the end of the schedule.
    pub(crate) fn get_next_timeslot(
        &self,
        after_epoch: i64,
    ) -> Result<Option<Timeslot>, ScheduleError> {
        let method = "Timeslot/getNextTimeslot";
        let payload = self.request(method, vec![("time".to_string(), after_epoch.to_string())])?;
        if payload.is_null() {
            return Ok(None);
        }
        decode(method, payload).map(Some)
    }

    /// Tracklist sorted by start time. Items with an unreadable start time are dropped.
    pub(crate) fn get_tracklist(&self, timeslot_id: u64) -> Result<Vec<Track>, ScheduleError> {
        let method = "TracklistItem/getTracklistForTimeslot";
        let payload = self.request(
            method,
            vec![("timeslotid".to_string(), timeslot_id.to_string())],
        )?;
        if payload.is_null() {
            return Ok(Vec::new());
        }
        let tracks: Vec<Track> = decode(method, payload)?;
        Ok(sort_tracks(timeslot_id, tracks))
    }

    pub(crate) fn get_studio_source(&self, at_epoch: i64) -> Result<StudioSource, ScheduleError> {
        let method = "Selector/getStudioAtTime";
        let payload = self.request(method, vec![("time".to_string(), at_epoch.to_string())])?;
        let source = match decode::<RawSource>(method, payload)? {
            RawSource::Id(id) => id.to_string(),
            RawSource::Name(name) => name.trim().to_string(),
        };
        Ok(StudioSource(source))
    }

    pub(crate) fn set_upload_status(
        &self,
        timeslot_id: u64,
        status: &UploadStatus,
    ) -> Result<(), ScheduleError> {
        let method = format!("Timeslot/{timeslot_id}/setMeta");
        debug!(timeslot = timeslot_id, status = %status, "writing upload state");
        self.submit(
            &method,
            &[("string_key", "upload_state"), ("value", status.as_str())],
        )?;
        Ok(())
    }
}

fn sort_tracks(timeslot_id: u64, tracks: Vec<Track>) -> Vec<Track> {
    let mut keyed = tracks
        .into_iter()
        .filter_map(|track| match timing::to_epoch(&track.start_time) {
            Ok(epoch) => Some((epoch, track)),
            Err(err) => {
                warn!(timeslot = timeslot_id, "dropping track '{}': {err}", track.song);
                None
            }
        })
        .collect::<Vec<_>>();
    keyed.sort_by_key(|(epoch, _)| *epoch);
    keyed.into_iter().map(|(_, track)| track).collect()
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, payload: Value) -> Result<T, ScheduleError> {
    serde_json::from_value(payload).map_err(|source| ScheduleError::Payload {
        method: method.to_string(),
        source,
    })
}

fn envelope_status(value: &Value) -> Option<String> {
    match value.get("status")? {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn classify_status(method: &str, status: &str) -> ScheduleError {
    let method = method.to_string();
    match status {
        "401" => ScheduleError::Unauthorized { method },
        "403" => ScheduleError::Forbidden { method },
        other => ScheduleError::Status {
            method,
            status: other.to_string(),
        },
    }
}

/// Unwraps the `{status, payload}` envelope the schedule API wraps every response in.
fn unwrap_envelope(method: &str, response: Result<Value, HttpError>) -> Result<Value, ScheduleError> {
    let value = match response {
        Ok(value) => value,
        Err(HttpError::Status { status, body }) => {
            let status = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| envelope_status(&value))
                .unwrap_or_else(|| status.to_string());
            return Err(classify_status(method, &status));
        }
        Err(source) => {
            return Err(ScheduleError::Http {
                method: method.to_string(),
                source,
            });
        }
    };

    match envelope_status(&value).as_deref() {
        Some("OK") => Ok(value.get("payload").cloned().unwrap_or(Value::Null)),
        Some(status) => Err(classify_status(method, status)),
        None => Err(ScheduleError::Status {
            method: method.to_string(),
            status: "missing".to_string(),
        }),
    }
}
