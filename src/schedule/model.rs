use std::fmt;

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingState {
    Requested,
    Queued,
    ForceUpload,
    PlayedOut,
    SkippedOffAir,
    SkippedIncompleteTracklist,
}

impl PendingState {
    const ALL: [Self; 6] = [
        Self::Requested,
        Self::Queued,
        Self::ForceUpload,
        Self::PlayedOut,
        Self::SkippedOffAir,
        Self::SkippedIncompleteTracklist,
    ];

    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Requested => "Requested",
            Self::Queued => "Queued",
            Self::ForceUpload => "Force Upload",
            Self::PlayedOut => "Played Out",
            Self::SkippedOffAir => "Skipped - Off Air",
            Self::SkippedIncompleteTracklist => "Skipped - Incomplete Tracklist",
        }
    }

    fn from_label(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.label() == raw)
    }
}

/// The `upload_state` meta value stored on a timeslot.
///
/// Known labels are control states; anything else is the identifier the
/// hosting service assigned to a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UploadStatus {
    Pending(PendingState),
    Published(String),
}

impl UploadStatus {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match PendingState::from_label(trimmed) {
            Some(state) => Self::Pending(state),
            None => Self::Published(trimmed.to_string()),
        })
    }

    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::Pending(state) => state.label(),
            Self::Published(key) => key,
        }
    }

    /// Only these states are picked up for upload.
    pub(crate) fn is_eligible(&self) -> bool {
        matches!(
            self,
            Self::Pending(
                PendingState::Requested | PendingState::ForceUpload | PendingState::PlayedOut
            )
        )
    }

    pub(crate) fn is_forced(&self) -> bool {
        matches!(self, Self::Pending(PendingState::ForceUpload))
    }
}

impl From<PendingState> for UploadStatus {
    fn from(state: PendingState) -> Self {
        Self::Pending(state)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.trim().is_empty()))
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Timeslot {
    pub(crate) id: u64,
    pub(crate) title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) season_num: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) timeslot_num: u32,
    /// Local wall-clock label, `dd/mm/YYYY HH:MM`.
    pub(crate) start_time: String,
    /// `H:M:S`, hours may exceed 23.
    pub(crate) duration: String,
    #[serde(default, rename = "mixcloud_starttime", deserialize_with = "non_empty")]
    pub(crate) custom_start: Option<String>,
    #[serde(default, rename = "mixcloud_endtime", deserialize_with = "non_empty")]
    pub(crate) custom_end: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) tags: Vec<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub(crate) photo: Option<String>,
    #[serde(default, rename = "mixcloud_status", deserialize_with = "non_empty")]
    status: Option<String>,
}

impl Timeslot {
    pub(crate) fn upload_status(&self) -> Option<UploadStatus> {
        self.status.as_deref().and_then(UploadStatus::parse)
    }

    pub(crate) fn label(&self) -> String {
        format!(
            "{} {}x{}",
            self.title, self.season_num, self.timeslot_num
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Track {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) artist: String,
    #[serde(default, rename = "title", deserialize_with = "null_as_default")]
    pub(crate) song: String,
    #[serde(rename = "starttime")]
    pub(crate) start_time: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub(crate) length: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_maps_known_labels_to_pending_states() {
        assert_eq!(
            UploadStatus::parse("Force Upload"),
            Some(UploadStatus::Pending(PendingState::ForceUpload))
        );
        assert_eq!(
            UploadStatus::parse("Skipped - Incomplete Tracklist"),
            Some(UploadStatus::Pending(PendingState::SkippedIncompleteTracklist))
        );
    }

    #[test]
    fn parse_treats_unknown_labels_as_published_keys() {
        let status = UploadStatus::parse("/urybsod/show-2024-01-01/").expect("non-empty");
        assert_eq!(
            status,
            UploadStatus::Published("/urybsod/show-2024-01-01/".to_string())
        );
        assert!(!status.is_eligible());
    }

    #[test]
    fn parse_rejects_blank_values() {
        assert_eq!(UploadStatus::parse("   "), None);
    }

    #[test]
    fn only_requested_forced_and_played_out_are_eligible() {
        let eligible = PendingState::ALL
            .into_iter()
            .filter(|state| UploadStatus::from(*state).is_eligible())
            .collect::<Vec<_>>();
        assert_eq!(
            eligible,
            vec![
                PendingState::Requested,
                PendingState::ForceUpload,
                PendingState::PlayedOut
            ]
        );
    }

    #[test]
    fn labels_round_trip_through_display() {
        for state in PendingState::ALL {
            let status = UploadStatus::from(state);
            assert_eq!(UploadStatus::parse(&status.to_string()), Some(status));
        }
    }

    #[test]
    fn timeslot_tolerates_nulls_and_blank_overrides() {
        let raw = r#"{
            "id": 12,
            "title": "Breakfast",
            "season_num": null,
            "timeslot_num": 4,
            "start_time": "01/02/2024 08:00",
            "duration": "02:00:00",
            "mixcloud_starttime": "",
            "mixcloud_endtime": null,
            "description": null,
            "tags": null,
            "photo": "",
            "mixcloud_status": "Requested"
        }"#;

        let timeslot: Timeslot = serde_json::from_str(raw).expect("timeslot parses");

        assert_eq!(timeslot.season_num, 0);
        assert_eq!(timeslot.custom_start, None);
        assert_eq!(timeslot.custom_end, None);
        assert!(timeslot.description.is_empty());
        assert!(timeslot.tags.is_empty());
        assert_eq!(timeslot.photo, None);
        assert_eq!(
            timeslot.upload_status(),
            Some(UploadStatus::Pending(PendingState::Requested))
        );
        assert_eq!(timeslot.label(), "Breakfast 0x4");
    }

    #[test]
    fn track_maps_remote_field_names() {
        let raw = r#"{"artist":"A","title":"Song","starttime":"01/02/2024 08:03:00","length":null}"#;

        let track: Track = serde_json::from_str(raw).expect("track parses");

        assert_eq!(track.song, "Song");
        assert_eq!(track.start_time, "01/02/2024 08:03:00");
        assert_eq!(track.length, None);
    }

    #[test]
    fn track_tolerates_null_artist_and_title() {
        let raw = r#"{"artist":null,"title":null,"starttime":"01/02/2024 08:03:00"}"#;

        let track: Track = serde_json::from_str(raw).expect("track parses");

        assert!(track.artist.is_empty());
        assert!(track.song.is_empty());
    }
}
