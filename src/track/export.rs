//! Writing track metadata back into file tags.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::MetadataSettings;

use super::cue::CueInfo;
use super::metadata::{BpmComparison, TrackMetadata, compare_and_set};
use super::model::{Track, TrackState};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImportResult {
    Succeeded,
    /// The file is missing, unreadable or has no tags.
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExportResult {
    Succeeded,
    /// The file format does not support writing tags.
    Unsupported,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExportTrackMetadataResult {
    Succeeded,
    Skipped,
    Failed,
}

/// Tags read from a file plus the raw bytes of its embedded cover image.
pub type ImportedTags = (ImportResult, TrackMetadata, Option<Vec<u8>>);

/// Reads and writes the tags of one file.
pub trait MetadataSource {
    fn import_track_metadata_and_cover_image(&self) -> ImportedTags;

    /// Returns the time the file was synchronized with `metadata`.
    fn export_track_metadata(
        &self,
        metadata: &TrackMetadata,
    ) -> (ExportResult, Option<DateTime<Utc>>);
}

impl Track {
    /// Write the metadata into the file tags if they would change.
    ///
    /// Tracks that were never read from their file are only exported after
    /// [`Track::mark_for_metadata_export`], so foreign tags are not
    /// overwritten by accident.
    pub fn export_metadata(
        &self,
        source: &dyn MetadataSource,
        settings: &MetadataSettings,
    ) -> ExportTrackMetadataResult {
        let mut state = self.state.lock();
        let (result, modified) = export_while_locked(&mut state, source, settings);
        if modified {
            self.mark_dirty_and_unlock(state, Vec::new());
        }
        result
    }
}

/// Returns the export result and whether the record was modified.
fn export_while_locked(
    state: &mut TrackState,
    source: &dyn MetadataSource,
    settings: &MetadataSettings,
) -> (ExportTrackMetadataResult, bool) {
    let location = state.location.display().to_string();
    if !state.marked_for_metadata_export && !state.record.is_source_synchronized() {
        info!("Skip exporting of unsynchronized track metadata: {location}");
        return (ExportTrackMetadataResult::Skipped, false);
    }

    let mut modified = false;
    if settings.export_embedded_tags {
        let Some(stream_info) = state
            .record
            .stream_info_from_source
            .filter(|s| s.signal.is_valid() && s.has_duration())
        else {
            warn!("Cannot write embedded tags without stream properties: {location}");
            return (ExportTrackMetadataResult::Skipped, false);
        };
        let signal = stream_info.signal;
        let cue_infos: Vec<CueInfo> = state
            .cue_points
            .iter()
            .map(|cue| cue.to_cue_info(&signal))
            .collect();
        let mut embedded = state.record.metadata.track_info.embedded.clone();
        embedded.color = state.record.color;
        embedded.bpm_locked = state.record.bpm_locked;
        embedded.set_cue_infos(cue_infos);
        embedded.set_beats(state.beats.as_deref(), &signal);
        modified |= compare_and_set(&mut state.record.metadata.track_info.embedded, embedded);
    }

    // The file may have been modified by other applications, so compare
    // against what is stored there now.
    let (import_result, imported, _) = source.import_track_metadata_and_cover_image();
    let normalized = match import_result {
        ImportResult::Succeeded => {
            // Never drop tag items that are not tracked yet.
            modified |= state.record.metadata.merge_extra_from(&imported);
            // Normalize a copy. The tempo of the record must stay equal to
            // the beat grid.
            let mut normalized = state.record.metadata.clone();
            normalized.normalize_before_export();
            // Integer precision avoids rewriting ID3 tags over fractional
            // tempo values.
            if !state.marked_for_metadata_export
                && !normalized.any_file_tags_modified(&imported, BpmComparison::Integer)
            {
                debug!("Skip exporting of unmodified track metadata into file: {location}");
                return (ExportTrackMetadataResult::Skipped, modified);
            }
            normalized
        }
        ImportResult::Failed => {
            if !state.marked_for_metadata_export {
                warn!("Skip exporting of track metadata after failed import from file: {location}");
                return (ExportTrackMetadataResult::Skipped, modified);
            }
            info!("Adding or overwriting tags after failure to import tags from file: {location}");
            let mut normalized = state.record.metadata.clone();
            normalized.normalize_before_export();
            normalized
        }
    };

    // Only one attempt per request.
    state.marked_for_metadata_export = false;
    debug!(?imported, ?normalized, "Exporting track metadata: {location}");
    match source.export_track_metadata(&normalized) {
        (ExportResult::Succeeded, synchronized_at) => {
            if synchronized_at.is_some() {
                modified |=
                    compare_and_set(&mut state.record.source_synchronized_at, synchronized_at);
            }
            debug!("Exported track metadata: {location}");
            (ExportTrackMetadataResult::Succeeded, modified)
        }
        (ExportResult::Unsupported, _) => (ExportTrackMetadataResult::Skipped, modified),
        (ExportResult::Failed, _) => {
            warn!("Failed to export track metadata: {location}");
            (ExportTrackMetadataResult::Failed, modified)
        }
    }
}
