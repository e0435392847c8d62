use std::thread;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::cover::CoverProcessor;
use crate::error::{PublishError, RecordingError, ScheduleError};
use crate::metadata;
use crate::publish::{Publisher, UploadOutcome};
use crate::recording::{self, RecordingClient};
use crate::schedule::{PendingState, ScheduleClient, Timeslot, UploadStatus};
use crate::timing::{self, DstRule, LocalDst, NoDst, TimeResolver, Window};

/// The selector is sampled this far into a show when checking it went out live.
const OFF_AIR_PROBE_SECS: i64 = 150;
const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) discovered: usize,
    pub(crate) published: usize,
    pub(crate) skipped: usize,
    pub(crate) reverted: usize,
    pub(crate) rate_limited: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Published,
    Skipped,
    Reverted,
    RateLimited,
}

#[derive(Debug, Error)]
enum SlotError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

struct Candidate {
    timeslot: Timeslot,
    window: Window,
}

pub(crate) struct Pipeline {
    schedule: ScheduleClient,
    resolver: TimeResolver,
    recorder: RecordingClient,
    covers: CoverProcessor,
    publisher: Publisher,
    lookback_secs: i64,
    min_tracks: usize,
    pause: Box<dyn Fn(Duration)>,
}

impl Pipeline {
    pub(crate) fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.http_timeout();
        let dst: Box<dyn DstRule> = if config.dst_correction {
            Box::new(LocalDst)
        } else {
            Box::new(NoDst)
        };
        Ok(Self {
            schedule: ScheduleClient::new(&config.myradio_url, &config.myradio_api_key, timeout),
            resolver: TimeResolver::new(config.news_length, dst),
            recorder: RecordingClient::new(
                &config.loggerng_url,
                &config.loggerng_memberid,
                &config.loggerng_logdir,
                config.loggerng_timeout_mins,
                timeout,
            ),
            covers: CoverProcessor::new(&config.myradio_image_domain, timeout),
            publisher: Publisher::new(
                &config.mixcloud_api_url,
                &config.mixcloud_client_oauth,
                timeout,
            )?,
            lookback_secs: config.lookback_days * SECS_PER_DAY,
            min_tracks: config.min_tracks,
            pause: Box::new(thread::sleep),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_pause(mut self, pause: impl Fn(Duration) + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.recorder = self.recorder.with_poll_interval(interval);
        self
    }

    /// Runs discovery and publishing once. Discovery failures and rejected
    /// schedule credentials abort the run; anything else only reverts the timeslot.
    pub(crate) fn run_at(&self, now: i64) -> Result<RunSummary, ScheduleError> {
        let queued = self.discover(now)?;
        info!("found {} shows pending upload", queued.len());

        let mut summary = RunSummary {
            discovered: queued.len(),
            ..RunSummary::default()
        };
        for candidate in queued {
            match self.process(&candidate)? {
                Disposition::Published => summary.published += 1,
                Disposition::Skipped => summary.skipped += 1,
                Disposition::Reverted => summary.reverted += 1,
                Disposition::RateLimited => summary.rate_limited += 1,
            }
        }
        Ok(summary)
    }

    fn set_status(&self, timeslot_id: u64, status: impl Into<UploadStatus>) -> Result<(), ScheduleError> {
        self.schedule.set_upload_status(timeslot_id, &status.into())
    }

    fn discover(&self, now: i64) -> Result<Vec<Candidate>, ScheduleError> {
        let mut cursor = now - self.lookback_secs;
        let mut queued = Vec::new();

        while let Some(timeslot) = self.schedule.get_next_timeslot(cursor)? {
            let scheduled = match timing::to_epoch(&timeslot.start_time) {
                Ok(scheduled) if scheduled >= cursor => scheduled,
                Ok(_) => {
                    warn!(timeslot = timeslot.id, "schedule went backwards; stopping discovery");
                    break;
                }
                Err(err) => {
                    error!(timeslot = timeslot.id, "cannot advance past timeslot: {err}");
                    break;
                }
            };
            cursor = scheduled + 1;

            let window = match self.resolver.resolve_window(&timeslot) {
                Ok(window) => window,
                Err(err) => {
                    error!(timeslot = timeslot.id, "invalid time window: {err}");
                    continue;
                }
            };
            if window.end > now {
                debug!(timeslot = timeslot.id, "timeslot has not finished airing");
                break;
            }

            let Some(status) = timeslot.upload_status() else {
                continue;
            };
            if !status.is_eligible() {
                continue;
            }

            if !status.is_forced()
                && self
                    .schedule
                    .get_studio_source(window.start + OFF_AIR_PROBE_SECS)?
                    .is_jukebox()
            {
                warn!(timeslot = timeslot.id, "timeslot {} was not on air", timeslot.label());
                self.set_status(timeslot.id, PendingState::SkippedOffAir)?;
                continue;
            }

            self.set_status(timeslot.id, PendingState::Queued)?;
            queued.push(Candidate { timeslot, window });
        }

        Ok(queued)
    }

    fn process(&self, candidate: &Candidate) -> Result<Disposition, ScheduleError> {
        let id = candidate.timeslot.id;
        match self.publish(candidate) {
            Ok(disposition) => Ok(disposition),
            Err(SlotError::Schedule(err)) if err.is_authorization() => Err(err),
            Err(SlotError::Recording(err @ RecordingError::Timeout { .. })) => {
                error!(timeslot = id, "gave up waiting for the recording: {err}");
                self.revert(id)
            }
            Err(SlotError::Recording(err @ RecordingError::Unreachable(_))) => {
                error!(timeslot = id, "could not connect to the logging service: {err}");
                self.revert(id)
            }
            Err(err) => {
                error!(timeslot = id, "could not publish timeslot: {err}");
                self.revert(id)
            }
        }
    }

    fn revert(&self, timeslot_id: u64) -> Result<Disposition, ScheduleError> {
        self.set_status(timeslot_id, PendingState::Requested)?;
        Ok(Disposition::Reverted)
    }

    fn publish(&self, candidate: &Candidate) -> Result<Disposition, SlotError> {
        let Candidate { timeslot, window } = candidate;

        let tracklist = self.schedule.get_tracklist(timeslot.id)?;
        if tracklist.len() < self.min_tracks {
            warn!(
                timeslot = timeslot.id,
                "timeslot {} has {} of at least {} tracks in its tracklist",
                timeslot.label(),
                tracklist.len(),
                self.min_tracks
            );
            self.set_status(timeslot.id, PendingState::SkippedIncompleteTracklist)?;
            return Ok(Disposition::Skipped);
        }

        let title = recording::log_title(&timeslot.title, &timeslot.start_time);
        let recording = self.recorder.fetch(window, &title)?;
        let metadata = metadata::build_payload(timeslot, window, &tracklist, &self.resolver);
        let cover = self.cover_for(timeslot);

        match self.publisher.upload(&recording.path, cover, &metadata)? {
            UploadOutcome::Published { key } => {
                info!(timeslot = timeslot.id, "upload successful: {key}");
                self.set_status(timeslot.id, UploadStatus::Published(key))?;
                Ok(Disposition::Published)
            }
            UploadOutcome::RateLimited {
                message,
                retry_after,
            } => {
                error!(timeslot = timeslot.id, "{message}");
                warn!(
                    "waiting {} seconds before continuing",
                    retry_after.as_secs()
                );
                (self.pause)(retry_after);
                Ok(Disposition::RateLimited)
            }
            UploadOutcome::Rejected { message } => {
                error!(timeslot = timeslot.id, "{message}");
                self.set_status(timeslot.id, PendingState::Requested)?;
                Ok(Disposition::Reverted)
            }
            UploadOutcome::Unreadable { status, body } => {
                error!(
                    timeslot = timeslot.id,
                    "unreadable upload response (HTTP {status}): {body}"
                );
                self.set_status(timeslot.id, PendingState::Requested)?;
                Ok(Disposition::Reverted)
            }
        }
    }

    fn cover_for(&self, timeslot: &Timeslot) -> Option<Vec<u8>> {
        let Some(photo) = timeslot.photo.as_deref() else {
            warn!(timeslot = timeslot.id, "no show photo; uploading without a picture");
            return None;
        };
        let url = self.covers.photo_url(photo);
        match self.covers.prepare_cover(&url) {
            Ok(jpeg) => Some(jpeg),
            Err(err) => {
                warn!(timeslot = timeslot.id, "{err}; uploading without a picture");
                None
            }
        }
    }
}
