//! Deferred import of beats and cues from file tags.
//!
//! Tag formats store timing in milliseconds relative to their own decoder,
//! so turning them into frame positions needs the sample rate measured by
//! our decoder. Until that is known the importer is parked on the track.

use serde::{Deserialize, Serialize};

use crate::audio::{FramePos, SignalInfo};

use super::beats::{Beats, BeatsPointer};
use super::cue::{CueInfo, CueType};
use super::metadata::{Bpm, RgbColor};

/// Name of the custom tag item that holds the serialized `EmbeddedTags`.
pub const EMBEDDED_TAGS_KEY: &str = "TRACKSTATE_TAGS";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    /// Waiting for the stream properties from the decoder.
    Pending,
    Complete,
}

/// Raw beat data waiting to be turned into a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatsImporter {
    positions_millis: Vec<f64>,
    bpm_hint: Option<Bpm>,
    timing_offset_millis: f64,
}

impl BeatsImporter {
    pub fn new(
        positions_millis: Vec<f64>,
        bpm_hint: Option<Bpm>,
        timing_offset_millis: f64,
    ) -> Self {
        Self {
            positions_millis,
            bpm_hint,
            timing_offset_millis,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions_millis.is_empty()
    }

    /// Consume the importer, applying the timing offset.
    pub fn import_beats(self, signal: &SignalInfo) -> Option<BeatsPointer> {
        let positions: Vec<FramePos> = self
            .positions_millis
            .iter()
            .filter_map(|ms| FramePos::new(signal.millis_to_frames(ms + self.timing_offset_millis)))
            .collect();
        Beats::from_beat_positions(signal.sample_rate, &positions, self.bpm_hint)
    }
}

/// Raw cue data waiting to be turned into cue markers.
#[derive(Debug, Clone, PartialEq)]
pub struct CueInfoImporter {
    cue_infos: Vec<CueInfo>,
    timing_offset_millis: f64,
}

impl CueInfoImporter {
    /// Infos without any position are dropped; they cannot become markers.
    pub fn new(mut cue_infos: Vec<CueInfo>, timing_offset_millis: f64) -> Self {
        cue_infos.retain(|info| {
            info.start_position_millis.is_some() || info.end_position_millis.is_some()
        });
        Self {
            cue_infos,
            timing_offset_millis,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cue_infos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cue_infos.len()
    }

    pub fn has_cue_of_type(&self, cue_type: CueType) -> bool {
        self.cue_infos.iter().any(|c| c.cue_type == cue_type)
    }

    /// Consume the importer, applying the timing offset.
    pub fn import_cue_infos(self) -> Vec<CueInfo> {
        let offset = self.timing_offset_millis;
        self.cue_infos
            .into_iter()
            .map(|mut info| {
                info.start_position_millis = info.start_position_millis.map(|ms| ms + offset);
                info.end_position_millis = info.end_position_millis.map(|ms| ms + offset);
                info
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedBeats {
    pub bpm: Option<Bpm>,
    pub positions_millis: Vec<f64>,
}

/// Proprietary per-file data stored in a single custom tag item as JSON.
///
/// Positions are stored relative to the writer's decoder; `timing_offset_millis`
/// is added on import and subtracted on export.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedTags {
    pub bpm_locked: bool,
    pub color: Option<RgbColor>,
    pub beats: Option<EmbeddedBeats>,
    pub cues: Vec<CueInfo>,
    pub timing_offset_millis: f64,
}

impl EmbeddedTags {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn beats_importer(&self) -> Option<BeatsImporter> {
        let beats = self.beats.as_ref()?;
        let importer = BeatsImporter::new(
            beats.positions_millis.clone(),
            beats.bpm,
            self.timing_offset_millis,
        );
        (!importer.is_empty()).then_some(importer)
    }

    pub fn cue_infos_importer(&self) -> Option<CueInfoImporter> {
        let importer = CueInfoImporter::new(self.cues.clone(), self.timing_offset_millis);
        (!importer.is_empty()).then_some(importer)
    }

    /// Store a beat grid as tempo plus the first beat position.
    pub fn set_beats(&mut self, beats: Option<&Beats>, signal: &SignalInfo) {
        self.beats = beats.map(|beats| EmbeddedBeats {
            bpm: Some(beats.bpm()),
            positions_millis: vec![
                signal.frames_to_millis(beats.first_beat().value()) - self.timing_offset_millis,
            ],
        });
    }

    pub fn set_cue_infos(&mut self, cue_infos: Vec<CueInfo>) {
        let offset = self.timing_offset_millis;
        self.cues = cue_infos
            .into_iter()
            .map(|mut info| {
                info.start_position_millis = info.start_position_millis.map(|ms| ms - offset);
                info.end_position_millis = info.end_position_millis.map(|ms| ms - offset);
                info
            })
            .collect();
    }
}
