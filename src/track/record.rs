//! The persisted part of a track: metadata snapshot plus library-only
//! properties (identity, rating, color, cue position, play counter, ...).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::audio::{FramePos, StreamInfo};

use super::key::{ChromaticKey, KeySource, Keys};
use super::metadata::{RgbColor, TrackMetadata, compare_and_set};

/// Database identity of a persisted track.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(i64);

impl TrackId {
    pub fn new(value: i64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    Updated,
    Unchanged,
    Rejected,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayCounter {
    pub times_played: u32,
    pub last_played_at: Option<DateTime<Utc>>,
    /// Played during the current session.
    pub played: bool,
}

impl PlayCounter {
    pub fn update_last_played_now_and_times_played(&mut self, played: bool) {
        if played {
            if !self.played {
                self.times_played += 1;
            }
            self.last_played_at = Some(Utc::now());
        } else if self.played && self.times_played > 0 {
            self.times_played -= 1;
        }
        self.played = played;
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverType {
    #[default]
    None,
    /// Embedded in the file tags.
    Metadata,
    /// A separate image file next to the track.
    File,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverSource {
    #[default]
    Unknown,
    Guessed,
    UserSelected,
}

/// Where the cover art comes from, relative to the track location.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverInfo {
    pub cover_type: CoverType,
    pub source: CoverSource,
    pub location: String,
    /// Hex encoded SHA-256 of the image bytes.
    pub digest: Option<String>,
}

impl CoverInfo {
    pub fn image_digest(image: &[u8]) -> String {
        Sha256::digest(image)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Recompute the digest from freshly loaded image bytes. An empty image
    /// clears the cover.
    pub fn refresh_image_digest(&mut self, image: &[u8]) -> bool {
        if image.is_empty() {
            return compare_and_set(self, CoverInfo::default());
        }
        let mut changed = compare_and_set(&mut self.digest, Some(Self::image_digest(image)));
        if self.cover_type == CoverType::None {
            self.cover_type = CoverType::Metadata;
            self.source = CoverSource::Guessed;
            changed = true;
        }
        changed
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackRecord {
    pub id: Option<TrackId>,
    pub metadata: TrackMetadata,
    pub color: Option<RgbColor>,
    pub rating: u8,
    pub file_type: String,
    pub url: String,
    pub main_cue_position: Option<FramePos>,
    pub bpm_locked: bool,
    pub source_synchronized_at: Option<DateTime<Utc>>,
    pub date_added: Option<DateTime<Utc>>,
    pub play_counter: PlayCounter,
    pub cover_info: CoverInfo,
    pub keys: Keys,
    /// Authoritative stream properties reported by the decoder. Never
    /// persisted; they are measured again whenever the file is opened.
    #[serde(skip)]
    pub stream_info_from_source: Option<StreamInfo>,
}

impl TrackRecord {
    pub fn new(id: Option<TrackId>) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn is_source_synchronized(&self) -> bool {
        self.source_synchronized_at.is_some()
    }

    pub fn has_stream_info_from_source(&self) -> bool {
        self.stream_info_from_source.is_some()
    }

    /// Replace the metadata with a snapshot imported from file tags. Stream
    /// properties already measured by the decoder take precedence over the
    /// ones stored in the tags.
    pub(crate) fn replace_metadata_from_source(
        &mut self,
        mut imported: TrackMetadata,
        synchronized_at: Option<DateTime<Utc>>,
    ) -> bool {
        if let Some(stream_info) = self.stream_info_from_source {
            imported.stream_info = stream_info;
        }
        let mut modified = compare_and_set(&mut self.metadata, imported);
        if synchronized_at.is_some() {
            modified |= compare_and_set(&mut self.source_synchronized_at, synchronized_at);
        }
        modified
    }

    /// Store the decoder's stream properties. These are write-once: a later
    /// call must report the same values.
    pub(crate) fn update_stream_info_from_source(&mut self, stream_info: StreamInfo) -> bool {
        if let Some(existing) = self.stream_info_from_source {
            if existing != stream_info {
                tracing::warn!(
                    "Ignoring conflicting stream properties from source: {} -> {}",
                    existing,
                    stream_info
                );
                debug_assert!(false, "stream properties from source are write-once");
            }
            return false;
        }
        self.stream_info_from_source = Some(stream_info);
        compare_and_set(&mut self.metadata.stream_info, stream_info)
    }

    pub(crate) fn update_global_key(&mut self, key: ChromaticKey, source: KeySource) -> bool {
        if self.keys.global == Some(key) {
            return false;
        }
        self.keys = Keys::new(key, source);
        self.metadata.track_info.key = key.to_string();
        true
    }

    pub(crate) fn update_global_key_text(&mut self, text: &str, source: KeySource) -> UpdateResult {
        match ChromaticKey::parse(text) {
            Some(key) if self.update_global_key(key, source) => UpdateResult::Updated,
            Some(_) => UpdateResult::Unchanged,
            None => UpdateResult::Rejected,
        }
    }

    pub(crate) fn reset_keys(&mut self) -> bool {
        let mut modified = compare_and_set(&mut self.keys, Keys::default());
        modified |= compare_and_set(&mut self.metadata.track_info.key, String::new());
        modified
    }
}
