use chrono::{Datelike, Local, NaiveDateTime, Offset, TimeZone};

use crate::error::TimeError;
use crate::schedule::Timeslot;

const LABEL_FORMATS: [&str; 2] = ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];
const DST_SHIFT_SECS: i64 = 3600;

/// Answers whether an instant falls inside daylight-saving time.
pub(crate) trait DstRule {
    fn is_dst(&self, epoch: i64) -> bool;
}

/// The host's local timezone rules.
pub(crate) struct LocalDst;

impl DstRule for LocalDst {
    fn is_dst(&self, epoch: i64) -> bool {
        let Some(at) = Local.timestamp_opt(epoch, 0).single() else {
            return false;
        };
        let offset_at = |month: u32| {
            Local
                .with_ymd_and_hms(at.year(), month, 1, 12, 0, 0)
                .earliest()
                .map(|dt| dt.offset().fix().local_minus_utc())
        };
        let standard = match (offset_at(1), offset_at(7)) {
            (Some(january), Some(july)) => january.min(july),
            _ => return false,
        };
        at.offset().fix().local_minus_utc() > standard
    }
}

/// Never applies a correction.
pub(crate) struct NoDst;

impl DstRule for NoDst {
    fn is_dst(&self, _epoch: i64) -> bool {
        false
    }
}

pub(crate) fn parse_label(label: &str) -> Result<NaiveDateTime, TimeError> {
    let trimmed = label.trim();
    LABEL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| TimeError::DateTime(label.to_string()))
}

/// Reads a schedule label's calendar and clock fields as if they were UTC.
pub(crate) fn to_epoch(label: &str) -> Result<i64, TimeError> {
    Ok(parse_label(label)?.and_utc().timestamp())
}

/// Parses `H:M:S` where the hour field is unbounded.
pub(crate) fn to_duration(label: &str) -> Result<i64, TimeError> {
    let invalid = || TimeError::Duration(label.to_string());
    let parts = label
        .trim()
        .split(':')
        .map(|part| part.trim().parse::<i64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let &[hours, minutes, seconds] = parts.as_slice() else {
        return Err(invalid());
    };
    if hours < 0 || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return Err(invalid());
    }
    Ok(hours * 3600 + minutes * 60 + seconds)
}

pub(crate) fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub(crate) start: i64,
    pub(crate) end: i64,
}

impl Window {
    pub(crate) fn duration_seconds(&self) -> i64 {
        self.end - self.start
    }

    pub(crate) fn duration_label(&self) -> String {
        format_duration(self.duration_seconds())
    }
}

pub(crate) struct TimeResolver {
    news_length: i64,
    dst: Box<dyn DstRule>,
}

impl TimeResolver {
    pub(crate) fn new(news_length: i64, dst: Box<dyn DstRule>) -> Self {
        Self { news_length, dst }
    }

    fn correct_dst(&self, epoch: i64) -> i64 {
        if self.dst.is_dst(epoch) {
            epoch - DST_SHIFT_SECS
        } else {
            epoch
        }
    }

    /// Epoch of a schedule label with the DST correction applied.
    pub(crate) fn to_instant(&self, label: &str) -> Result<i64, TimeError> {
        Ok(self.correct_dst(to_epoch(label)?))
    }

    pub(crate) fn resolve_window(&self, timeslot: &Timeslot) -> Result<Window, TimeError> {
        let duration = to_duration(&timeslot.duration)?;
        let scheduled = self.correct_dst(to_epoch(&timeslot.start_time)? + self.news_length);

        let start = match &timeslot.custom_start {
            Some(label) => self.to_instant(label)?,
            None => scheduled,
        };
        let end = match &timeslot.custom_end {
            Some(label) => self.to_instant(label)?,
            None => scheduled + duration,
        };

        if end < start {
            return Err(TimeError::InvertedWindow { start, end });
        }
        Ok(Window { start, end })
    }
}
