use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::schedule::{Timeslot, Track};
use crate::timing::{self, TimeResolver, Window};

pub(crate) const MAX_DESCRIPTION_CHARS: usize = 1000;
pub(crate) const MAX_TAGS: usize = 5;
pub(crate) const INTRO_CHAPTER: &str = "Intro";

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<]+?>").expect("tag pattern is valid"));
static ENTITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#?\w+;").expect("entity pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Section {
    Chapter { start: i64, title: String },
    Track { start: i64, artist: String, song: String },
}

impl Section {
    pub(crate) fn start(&self) -> i64 {
        match self {
            Self::Chapter { start, .. } | Self::Track { start, .. } => *start,
        }
    }
}

/// Everything the hosting service receives apart from the files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Metadata {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) tags: Vec<String>,
    pub(crate) sections: Vec<Section>,
    pub(crate) percentage_music: u8,
}

impl Metadata {
    /// Flattens into the indexed form fields the upload endpoint expects.
    pub(crate) fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("name".to_string(), self.name.clone()),
            ("description".to_string(), self.description.clone()),
            (
                "percentage_music".to_string(),
                self.percentage_music.to_string(),
            ),
        ];
        for (idx, tag) in self.tags.iter().enumerate() {
            fields.push((format!("tags-{idx}-tag"), tag.clone()));
        }
        for (idx, section) in self.sections.iter().enumerate() {
            match section {
                Section::Chapter { title, .. } => {
                    fields.push((format!("sections-{idx}-chapter"), title.clone()));
                }
                Section::Track { artist, song, .. } => {
                    fields.push((format!("sections-{idx}-artist"), artist.clone()));
                    fields.push((format!("sections-{idx}-song"), song.clone()));
                }
            }
            fields.push((
                format!("sections-{idx}-start_time"),
                section.start().to_string(),
            ));
        }
        fields
    }
}

/// Best-effort tag stripping, entity decoding and length cap.
pub(crate) fn cleanse_description(html: &str) -> String {
    let stripped = TAG_PATTERN.replace_all(html, "");
    let decoded = decode_entities(&stripped);
    let trimmed = decoded.trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_CHARS {
        warn!("description truncated to {MAX_DESCRIPTION_CHARS} characters");
        return trimmed.chars().take(MAX_DESCRIPTION_CHARS).collect();
    }
    trimmed.to_string()
}

/// Decodes entities one at a time; bare `&` and unknown entities are kept verbatim.
fn decode_entities(text: &str) -> String {
    ENTITY_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[0];
            htmlescape::decode_html(entity).unwrap_or_else(|_| entity.to_string())
        })
        .into_owned()
}

pub(crate) fn show_name(timeslot: &Timeslot) -> String {
    match timing::parse_label(&timeslot.start_time) {
        Ok(start) => format!("{} - {}", timeslot.title.trim(), start.format("%-d %b %Y")),
        Err(_) => timeslot.title.trim().to_string(),
    }
}

/// Percentage of the window covered by tracks, truncated. A zero-length window reports 0.
pub(crate) fn music_percentage(window: &Window, tracks: &[(i64, Option<i64>)]) -> u8 {
    let duration = window.duration_seconds();
    if duration <= 0 {
        return 0;
    }
    let music: i64 = tracks
        .iter()
        .filter_map(|(start, length)| length.map(|length| (*start, start + length)))
        .map(|(start, end)| (end.min(window.end) - start.max(window.start)).max(0))
        .sum();
    (music * 100 / duration).clamp(0, 100) as u8
}

fn chapter_sections(window: &Window, tracks: &[(i64, &Track)]) -> Vec<Section> {
    let mut sections = vec![Section::Chapter {
        start: 0,
        title: INTRO_CHAPTER.to_string(),
    }];
    for (start, track) in tracks {
        if *start < window.start {
            continue;
        }
        let mut offset = (start - window.start).max(0);
        let previous = sections.last().map(Section::start).unwrap_or(-1);
        if offset <= previous {
            // The hosting service rejects repeated start times.
            debug!("moving marker for '{}' from {offset} to {}", track.song, previous + 1);
            offset = previous + 1;
        }
        sections.push(Section::Track {
            start: offset,
            artist: track.artist.clone(),
            song: track.song.clone(),
        });
    }
    sections
}

pub(crate) fn build_payload(
    timeslot: &Timeslot,
    window: &Window,
    tracklist: &[Track],
    resolver: &TimeResolver,
) -> Metadata {
    let timed = tracklist
        .iter()
        .filter_map(|track| match resolver.to_instant(&track.start_time) {
            Ok(start) => Some((start, track)),
            Err(err) => {
                warn!(timeslot = timeslot.id, "ignoring track '{}': {err}", track.song);
                None
            }
        })
        .collect::<Vec<_>>();

    let lengths = timed
        .iter()
        .map(|(start, track)| {
            let length = track
                .length
                .as_deref()
                .and_then(|label| timing::to_duration(label).ok());
            (*start, length)
        })
        .collect::<Vec<_>>();

    Metadata {
        name: show_name(timeslot),
        description: cleanse_description(&timeslot.description),
        tags: timeslot.tags.iter().take(MAX_TAGS).cloned().collect(),
        sections: chapter_sections(window, &timed),
        percentage_music: music_percentage(window, &lengths),
    }
}
