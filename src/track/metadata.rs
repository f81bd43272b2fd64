//! Descriptive track metadata as stored in file tags.
//!
//! `TrackMetadata` is a plain value snapshot. The aggregate hands out copies
//! and replaces it wholesale or field by field; nothing in here knows about
//! locking or notifications.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::{StreamInfo, format_duration};

use super::import::EmbeddedTags;

/// Assign `value` to `field` if it differs. Returns whether anything changed.
pub(crate) fn compare_and_set<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field != value {
        *field = value;
        true
    } else {
        false
    }
}

/// Tempo in beats per minute. Only finite, positive values can be constructed.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bpm(f64);

/// Precision used when deciding whether two tempo values differ.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BpmComparison {
    Exact,
    /// Some tag formats (ID3v2 `TBPM`) only store integers.
    Integer,
}

impl Bpm {
    /// Number of decimal places kept when writing tags.
    const EXPORT_DECIMALS: i32 = 2;

    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn normalized(self) -> Self {
        let scale = 10f64.powi(Self::EXPORT_DECIMALS);
        Self::new((self.0 * scale).round() / scale).unwrap_or(self)
    }

    pub fn parse(text: &str) -> Option<Self> {
        text.trim().replace(',', ".").parse::<f64>().ok().and_then(Self::new)
    }
}

impl fmt::Display for Bpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

pub fn bpm_eq(lhs: Option<Bpm>, rhs: Option<Bpm>, comparison: BpmComparison) -> bool {
    match (lhs, rhs) {
        (Some(a), Some(b)) => match comparison {
            BpmComparison::Exact => a == b,
            BpmComparison::Integer => a.0.round() == b.0.round(),
        },
        (None, None) => true,
        _ => false,
    }
}

/// 24-bit RGB color, e.g. `0xFF8000`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RgbColor(pub u32);

impl RgbColor {
    pub fn new(rgb: u32) -> Self {
        Self(rgb & 0x00FF_FFFF)
    }

    /// Parse `#rrggbb` or `rrggbb`.
    pub fn from_hex(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Self::new)
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

/// Loudness normalization info. `ratio` is the linear gain factor.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayGain {
    pub ratio: Option<f64>,
    pub peak: Option<f64>,
}

impl ReplayGain {
    pub fn from_db(gain_db: f64) -> Self {
        Self {
            ratio: Some(10f64.powf(gain_db / 20.0)),
            peak: None,
        }
    }

    pub fn gain_db(&self) -> Option<f64> {
        self.ratio
            .filter(|r| *r > 0.0)
            .map(|r| 20.0 * r.log10())
    }

    /// Parse tag text like `-6.48 dB`.
    pub fn parse_db(text: &str) -> Option<f64> {
        let text = text.trim();
        let number = text
            .strip_suffix("dB")
            .or_else(|| text.strip_suffix("db"))
            .unwrap_or(text);
        number.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Round to the precision the tag text format can represent.
    pub fn normalized(self) -> Self {
        Self {
            ratio: self
                .gain_db()
                .map(|db| 10f64.powf(((db * 100.0).round() / 100.0) / 20.0)),
            peak: self.peak.map(|p| (p * 1_000_000.0).round() / 1_000_000.0),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub genre: String,
    pub composer: String,
    pub grouping: String,
    pub year: String,
    pub track_number: String,
    pub track_total: String,
    pub comment: String,
    /// Cache of the beat grid tempo while a grid exists.
    pub bpm: Option<Bpm>,
    pub key: String,
    pub replay_gain: ReplayGain,
    /// Proprietary tag blob carrying beats, cues, color and the tempo lock.
    pub embedded: EmbeddedTags,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumInfo {
    pub title: String,
    pub artist: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMetadata {
    pub track_info: TrackInfo,
    pub album_info: AlbumInfo,
    pub stream_info: StreamInfo,
    /// Tag items that are carried along but not interpreted (mood, label, ...).
    pub extra: BTreeMap<String, String>,
}

impl TrackMetadata {
    /// Adjust precision and whitespace before comparing with or writing to
    /// file tags.
    pub fn normalize_before_export(&mut self) {
        let info = &mut self.track_info;
        for field in [
            &mut info.title,
            &mut info.artist,
            &mut info.genre,
            &mut info.composer,
            &mut info.grouping,
            &mut info.year,
            &mut info.track_number,
            &mut info.track_total,
            &mut info.comment,
            &mut info.key,
            &mut self.album_info.title,
            &mut self.album_info.artist,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
        info.bpm = info.bpm.map(Bpm::normalized);
        info.replay_gain = info.replay_gain.normalized();
    }

    /// Whether writing `self` would change any tag stored in `imported`.
    /// Stream properties are not part of the tags and are ignored.
    pub fn any_file_tags_modified(&self, imported: &TrackMetadata, bpm: BpmComparison) -> bool {
        let (a, b) = (&self.track_info, &imported.track_info);
        a.title != b.title
            || a.artist != b.artist
            || a.genre != b.genre
            || a.composer != b.composer
            || a.grouping != b.grouping
            || a.year != b.year
            || a.track_number != b.track_number
            || a.track_total != b.track_total
            || a.comment != b.comment
            || a.key != b.key
            || a.replay_gain != b.replay_gain
            || a.embedded != b.embedded
            || !bpm_eq(a.bpm, b.bpm, bpm)
            || self.album_info != imported.album_info
            || self.extra != imported.extra
    }

    /// Copy tag items from `imported` that are not tracked here yet. Existing
    /// values are never overwritten.
    pub fn merge_extra_from(&mut self, imported: &TrackMetadata) -> bool {
        let mut modified = false;
        for (key, value) in &imported.extra {
            if !self.extra.contains_key(key) {
                self.extra.insert(key.clone(), value.clone());
                modified = true;
            }
        }
        modified
    }

    pub fn duration_text(&self, with_centis: bool) -> String {
        format_duration(self.stream_info.duration, with_centis)
    }

    pub fn bitrate_text(&self) -> String {
        if self.stream_info.bitrate.is_valid() {
            self.stream_info.bitrate.kbps().to_string()
        } else {
            String::new()
        }
    }
}
