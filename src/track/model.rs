use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::audio::{Bitrate, ChannelCount, FramePos, SampleRate, SignalInfo, StreamInfo};

use super::beats::{Beats, BeatsPointer};
use super::cue::{Cue, CuePointer, CueType, CueUpdateCallback, FIRST_HOT_CUE_INDEX};
use super::events::{EventBus, TrackEvent};
use super::import::{BeatsImporter, CueInfoImporter, ImportStatus};
use super::key::{ChromaticKey, KeySource, Keys};
use super::metadata::{Bpm, ReplayGain, RgbColor, TrackMetadata, compare_and_set};
use super::record::{CoverInfo, PlayCounter, TrackId, TrackRecord, UpdateResult};

pub type TrackPointer = Arc<Track>;

const ARTIST_TITLE_SEPARATOR: &str = " - ";

/// Precomputed rendering data. Not part of the persisted record.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Number of data points per second of audio.
    pub visual_sample_rate: f64,
    pub data: Vec<u8>,
}

pub type WaveformPointer = Arc<Waveform>;

/// Everything guarded by the track lock.
///
/// Methods on this type assume the lock is held; a `&mut TrackState` can only
/// be obtained through the guard. They never emit events.
pub(super) struct TrackState {
    pub(super) location: PathBuf,
    pub(super) record: TrackRecord,
    pub(super) beats: Option<BeatsPointer>,
    pub(super) cue_points: Vec<CuePointer>,
    pub(super) dirty: bool,
    pub(super) marked_for_metadata_export: bool,
    pending_beats: Option<BeatsImporter>,
    pending_cues: Option<CueInfoImporter>,
    on_cue_updated: CueUpdateCallback,
}

impl TrackState {
    fn bpm(&self) -> Option<Bpm> {
        let bpm = self.record.metadata.track_info.bpm;
        debug_assert_eq!(bpm, self.beats.as_ref().map(|b| b.bpm()));
        bpm
    }

    fn sample_rate(&self) -> SampleRate {
        self.record.metadata.stream_info.signal.sample_rate
    }

    fn signal_from_source(&self) -> Option<SignalInfo> {
        self.record.stream_info_from_source.map(|s| s.signal)
    }

    fn set_beats(&mut self, beats: Option<BeatsPointer>) -> bool {
        let unchanged = match (&self.beats, &beats) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return false;
        }
        self.record.metadata.track_info.bpm = beats.as_ref().map(|b| b.bpm());
        self.beats = beats;
        true
    }

    fn try_set_beats(&mut self, beats: Option<BeatsPointer>, lock_bpm_after_set: bool) -> bool {
        if self.beats.is_some() && self.record.bpm_locked {
            debug!(
                "Beat grid of {} is locked, discarding new beats",
                self.location.display()
            );
            return false;
        }
        let mut modified = self.set_beats(beats);
        modified |= compare_and_set(&mut self.record.bpm_locked, lock_bpm_after_set);
        modified
    }

    /// `None` removes the beat grid.
    fn try_set_bpm(&mut self, bpm: Option<Bpm>) -> bool {
        match (bpm, self.beats.clone()) {
            (None, _) => self.try_set_beats(None, false),
            (Some(bpm), None) => {
                let anchor = self.record.main_cue_position.unwrap_or(FramePos::START);
                let beats = Beats::from_const_tempo(self.sample_rate(), anchor, bpm);
                self.try_set_beats(Some(beats), false)
            }
            (Some(bpm), Some(beats)) if beats.bpm() != bpm => {
                debug!("Updating BPM of {}", self.location.display());
                self.try_set_beats(Some(beats.with_bpm(bpm)), false)
            }
            _ => false,
        }
    }

    fn import_pending_beats(&mut self) -> bool {
        let Some(importer) = self.pending_beats.take() else {
            return false;
        };
        let Some(signal) = self.signal_from_source() else {
            debug_assert!(
                false,
                "pending beats need the stream properties from source"
            );
            self.pending_beats = Some(importer);
            return false;
        };
        let beats = importer.import_beats(&signal);
        if beats.is_none() {
            warn!(
                "Imported beats of {} do not describe a beat grid",
                self.location.display()
            );
        }
        self.set_beats(beats)
    }

    fn import_pending_cue_infos(&mut self) -> bool {
        let Some(importer) = self.pending_cues.take() else {
            return false;
        };
        let Some(signal) = self.signal_from_source() else {
            debug_assert!(false, "pending cues need the stream properties from source");
            self.pending_cues = Some(importer);
            return false;
        };
        // Cues of types the importer does not provide are preserved.
        let mut cue_points: Vec<CuePointer> = self
            .cue_points
            .iter()
            .filter(|c| !importer.has_cue_of_type(c.cue_type()))
            .cloned()
            .collect();
        cue_points.extend(
            importer
                .import_cue_infos()
                .iter()
                .map(|info| Cue::from_cue_info(info, &signal)),
        );
        self.set_cue_points(cue_points)
    }

    fn set_cue_points(&mut self, cue_points: Vec<CuePointer>) -> bool {
        if self.cue_points.is_empty() && cue_points.is_empty() {
            return false;
        }
        for cue in self.cue_points.drain(..) {
            cue.detach();
        }
        let mut has_main_cue = false;
        for cue in cue_points {
            if cue.cue_type() == CueType::MainCue {
                if has_main_cue {
                    warn!(
                        "Dropping duplicate main cue of {}",
                        self.location.display()
                    );
                    continue;
                }
                has_main_cue = true;
                self.record.main_cue_position = cue.position();
            }
            cue.attach(self.on_cue_updated.clone());
            self.cue_points.push(cue);
        }
        if !has_main_cue && self.record.main_cue_position.is_some() {
            self.record.main_cue_position = Some(FramePos::START);
        }
        true
    }

    fn find_cue_by_type(&self, cue_type: CueType) -> Option<CuePointer> {
        self.cue_points
            .iter()
            .find(|c| c.cue_type() == cue_type)
            .cloned()
    }

    fn file_name(&self) -> String {
        self.location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The in-memory aggregate of one audio file: metadata, beat grid and cue
/// points behind a single lock.
///
/// Mutators compute their changes under the lock, release it and only then
/// publish events through [`Track::events`].
pub struct Track {
    pub(super) state: Mutex<TrackState>,
    events: EventBus,
    waveform: RwLock<Option<WaveformPointer>>,
    waveform_summary: RwLock<Option<WaveformPointer>>,
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Track")
            .field("location", &state.location)
            .field("id", &state.record.id)
            .field("dirty", &state.dirty)
            .finish_non_exhaustive()
    }
}

impl Track {
    /// A track that has not been persisted yet.
    pub fn new_temporary(location: impl Into<PathBuf>) -> TrackPointer {
        Self::with_record(location, TrackRecord::default(), None)
    }

    pub fn new_dummy(location: impl Into<PathBuf>, id: TrackId) -> TrackPointer {
        Self::with_record(location, TrackRecord::new(Some(id)), None)
    }

    /// Restore a track from a persisted record. Without a beat grid the
    /// record's tempo, if any, seeds a constant tempo grid.
    pub fn with_record(
        location: impl Into<PathBuf>,
        record: TrackRecord,
        beats: Option<BeatsPointer>,
    ) -> TrackPointer {
        let location = location.into();
        Arc::new_cyclic(|this: &Weak<Track>| {
            let owner = this.clone();
            let on_cue_updated: CueUpdateCallback = Arc::new(move |cue: &Cue| {
                if let Some(track) = owner.upgrade() {
                    track.on_cue_updated(cue);
                }
            });
            let bpm_locked = record.bpm_locked;
            let bpm = record.metadata.track_info.bpm;
            let mut state = TrackState {
                location,
                record,
                beats: None,
                cue_points: Vec::new(),
                dirty: false,
                marked_for_metadata_export: false,
                pending_beats: None,
                pending_cues: None,
                on_cue_updated,
            };
            state.record.metadata.track_info.bpm = None;
            match beats {
                Some(beats) => {
                    state.set_beats(Some(beats));
                }
                None => {
                    state.try_set_bpm(bpm);
                }
            }
            state.record.bpm_locked = bpm_locked;
            Track {
                state: Mutex::new(state),
                events: EventBus::new(),
                waveform: RwLock::new(None),
                waveform_summary: RwLock::new(None),
            }
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn lock(&self) -> MutexGuard<'_, TrackState> {
        self.state.lock()
    }

    pub(super) fn mark_dirty_and_unlock(
        &self,
        state: MutexGuard<'_, TrackState>,
        events: Vec<TrackEvent>,
    ) {
        self.set_dirty_and_unlock(state, true, events);
    }

    fn set_dirty_and_unlock(
        &self,
        mut state: MutexGuard<'_, TrackState>,
        dirty: bool,
        events: Vec<TrackEvent>,
    ) {
        let dirty_changed = state.dirty != dirty;
        state.dirty = dirty;
        let id = state.record.id;
        drop(state);

        let mut notifications = Vec::with_capacity(events.len() + 2);
        // Transient tracks are not tracked by the persistence layer.
        if let Some(id) = id {
            if dirty_changed {
                notifications.push(if dirty {
                    TrackEvent::Dirty(id)
                } else {
                    TrackEvent::Clean(id)
                });
            }
            if dirty {
                notifications.push(TrackEvent::Changed(id));
            }
        }
        notifications.extend(events);
        self.events.emit(notifications);
    }

    fn update_text(
        &self,
        value: &str,
        field: impl FnOnce(&mut TrackRecord) -> &mut String,
        event: impl FnOnce(String) -> TrackEvent,
    ) {
        let value = value.trim();
        let mut state = self.lock();
        let target = field(&mut state.record);
        if target.as_str() == value {
            return;
        }
        *target = value.to_string();
        self.mark_dirty_and_unlock(state, vec![event(value.to_string())]);
    }

    // Location

    pub fn location(&self) -> PathBuf {
        self.lock().location.clone()
    }

    pub fn file_name(&self) -> String {
        self.lock().file_name()
    }

    /// The new location comes from the persistence layer, so the track does
    /// not become dirty.
    pub fn relocate(&self, location: impl AsRef<Path>) {
        self.lock().location = location.as_ref().to_path_buf();
    }

    // Identity

    pub fn id(&self) -> Option<TrackId> {
        self.lock().record.id
    }

    /// Assign the database id. Only allowed once; assigning an id does not
    /// make the track dirty.
    pub fn init_id(&self, id: TrackId) {
        let mut state = self.lock();
        let current_id = state.record.id;
        match current_id {
            Some(current) if current == id => {}
            Some(current) => {
                warn!(
                    "Cannot change id of {} from {} to {}",
                    state.location.display(),
                    current,
                    id
                );
                drop(state);
                debug_assert!(false, "track id must not be reassigned");
            }
            None => state.record.id = Some(id),
        }
    }

    pub fn reset_id(&self) {
        self.lock().record.id = None;
    }

    // Record and metadata snapshots

    pub fn record(&self) -> TrackRecord {
        self.lock().record.clone()
    }

    /// Snapshot for the persistence layer together with the dirty flag, read
    /// atomically.
    pub fn record_and_dirty_flag(&self) -> (TrackRecord, bool) {
        let state = self.lock();
        (state.record.clone(), state.dirty)
    }

    pub fn metadata(&self) -> TrackMetadata {
        self.lock().record.metadata.clone()
    }

    /// Replace the whole record, e.g. after editing a copy. The tempo stays
    /// consistent with the beat grid: an explicit grid wins, otherwise the
    /// record's tempo is applied to the current grid. The id is kept.
    pub fn replace_record(&self, mut record: TrackRecord, beats: Option<BeatsPointer>) -> bool {
        let mut state = self.lock();
        let current_id = state.record.id;
        if let Some(id) = record.id.filter(|&id| Some(id) != current_id) {
            warn!(
                "Ignoring id {} of the replacement record for {}",
                id,
                state.location.display()
            );
            debug_assert!(current_id.is_none(), "track id must not be reassigned");
        }
        record.id = current_id;
        record.stream_info_from_source = state.record.stream_info_from_source;
        if let Some(main_cue) = state.find_cue_by_type(CueType::MainCue) {
            record.main_cue_position = main_cue.position();
        }
        let record_unchanged = state.record == record;
        if record_unchanged && beats.is_none() {
            return false;
        }

        let old_keys = state.record.keys;
        let old_replay_gain = state.record.metadata.track_info.replay_gain;
        let old_color = state.record.color;

        let beats_updated = match beats {
            Some(beats) => {
                let updated = state.try_set_beats(Some(beats), record.bpm_locked);
                if record_unchanged && !updated {
                    return false;
                }
                updated
            }
            None => state.try_set_bpm(record.metadata.track_info.bpm),
        };
        record.metadata.track_info.bpm = state.record.metadata.track_info.bpm;

        let new_keys = record.keys;
        let new_replay_gain = record.metadata.track_info.replay_gain;
        let new_color = record.color;
        state.record = record;

        let mut events = Vec::new();
        if beats_updated {
            events.push(TrackEvent::BeatsUpdated);
        }
        if old_keys != new_keys {
            events.push(TrackEvent::KeyChanged);
        }
        if old_replay_gain != new_replay_gain {
            events.push(TrackEvent::ReplayGainUpdated(new_replay_gain));
        }
        if old_color != new_color {
            events.push(TrackEvent::ColorUpdated(new_color));
        }
        events.push(TrackEvent::InfoChanged);
        self.mark_dirty_and_unlock(state, events);
        true
    }

    /// Apply metadata freshly read from file tags.
    ///
    /// Tempo and key are owned by the beat grid and the key detection: the
    /// imported tempo only seeds a grid when there is none, and the imported
    /// key only replaces the current one if it can be parsed. Beats and cues
    /// found in the embedded tag item are imported afterwards and may stay
    /// pending until the stream properties are known.
    pub fn replace_metadata_from_source(
        &self,
        mut imported: TrackMetadata,
        synchronized_at: Option<DateTime<Utc>>,
    ) {
        let embedded = imported.track_info.embedded.clone();
        let beats_importer = embedded.beats_importer();
        let cues_importer = embedded.cue_infos_importer();
        let imported_bpm = imported.track_info.bpm;
        let imported_key_text = imported.track_info.key.clone();
        let imported_key = ChromaticKey::parse(&imported_key_text);

        {
            let mut state = self.lock();
            imported.track_info.bpm = state.bpm();
            imported.track_info.key = state.record.metadata.track_info.key.clone();

            let old_replay_gain = state.record.metadata.track_info.replay_gain;
            let mut modified = state
                .record
                .replace_metadata_from_source(imported, synchronized_at);
            let new_replay_gain = state.record.metadata.track_info.replay_gain;

            let beats_modified =
                imported_bpm.is_some() && state.beats.is_none() && state.try_set_bpm(imported_bpm);
            modified |= beats_modified;

            let key_modified = imported_key.is_some()
                && state
                    .record
                    .update_global_key_text(&imported_key_text, KeySource::FileMetadata)
                    == UpdateResult::Updated;
            modified |= key_modified;

            let color_modified = embedded
                .color
                .is_some_and(|color| compare_and_set(&mut state.record.color, Some(color)));
            modified |= color_modified;
            let new_color = state.record.color;

            if modified {
                let mut events = Vec::new();
                if beats_modified {
                    events.push(TrackEvent::BeatsUpdated);
                }
                if key_modified {
                    events.push(TrackEvent::KeyChanged);
                }
                if old_replay_gain != new_replay_gain {
                    events.push(TrackEvent::ReplayGainUpdated(new_replay_gain));
                }
                if color_modified {
                    events.push(TrackEvent::ColorUpdated(new_color));
                }
                events.push(TrackEvent::InfoChanged);
                self.mark_dirty_and_unlock(state, events);
            }
        }

        if let Some(importer) = beats_importer {
            debug!("Importing embedded beats");
            self.try_import_beats(importer, embedded.bpm_locked);
        }
        if let Some(importer) = cues_importer {
            debug!("Importing {} embedded cue(s)", importer.len());
            self.import_cue_infos(importer);
        }
    }

    /// Adopt tag items that are not tracked yet without touching existing
    /// values.
    pub fn merge_extra_metadata_from_source(&self, imported: &TrackMetadata) -> bool {
        let mut state = self.lock();
        if !state.record.metadata.merge_extra_from(imported) {
            return false;
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::InfoChanged]);
        true
    }

    pub fn is_source_synchronized(&self) -> bool {
        self.lock().record.is_source_synchronized()
    }

    pub fn source_synchronized_at(&self) -> Option<DateTime<Utc>> {
        self.lock().record.source_synchronized_at
    }

    pub fn set_source_synchronized_at(&self, synchronized_at: Option<DateTime<Utc>>) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.source_synchronized_at, synchronized_at) {
            self.mark_dirty_and_unlock(state, Vec::new());
        }
    }

    // Descriptive fields

    /// "Artist - Title", the title alone or the file name, whichever is
    /// available.
    pub fn info(&self) -> String {
        let state = self.lock();
        let info = &state.record.metadata.track_info;
        match (info.artist.trim().is_empty(), info.title.trim().is_empty()) {
            (false, _) => format!("{}{}{}", info.artist, ARTIST_TITLE_SEPARATOR, info.title),
            (true, false) => info.title.clone(),
            (true, true) => state.file_name(),
        }
    }

    pub fn title_info(&self) -> String {
        let state = self.lock();
        let info = &state.record.metadata.track_info;
        if info.artist.trim().is_empty() && info.title.trim().is_empty() {
            state.file_name()
        } else {
            info.title.clone()
        }
    }

    pub fn title(&self) -> String {
        self.lock().record.metadata.track_info.title.clone()
    }

    pub fn set_title(&self, title: &str) {
        self.update_text(
            title,
            |r| &mut r.metadata.track_info.title,
            TrackEvent::TitleChanged,
        );
    }

    pub fn artist(&self) -> String {
        self.lock().record.metadata.track_info.artist.clone()
    }

    pub fn set_artist(&self, artist: &str) {
        self.update_text(
            artist,
            |r| &mut r.metadata.track_info.artist,
            TrackEvent::ArtistChanged,
        );
    }

    pub fn album(&self) -> String {
        self.lock().record.metadata.album_info.title.clone()
    }

    pub fn set_album(&self, album: &str) {
        self.update_text(
            album,
            |r| &mut r.metadata.album_info.title,
            TrackEvent::AlbumChanged,
        );
    }

    pub fn album_artist(&self) -> String {
        self.lock().record.metadata.album_info.artist.clone()
    }

    pub fn set_album_artist(&self, album_artist: &str) {
        self.update_text(
            album_artist,
            |r| &mut r.metadata.album_info.artist,
            TrackEvent::AlbumArtistChanged,
        );
    }

    pub fn genre(&self) -> String {
        self.lock().record.metadata.track_info.genre.clone()
    }

    pub fn set_genre(&self, genre: &str) {
        self.update_text(
            genre,
            |r| &mut r.metadata.track_info.genre,
            TrackEvent::GenreChanged,
        );
    }

    pub fn composer(&self) -> String {
        self.lock().record.metadata.track_info.composer.clone()
    }

    pub fn set_composer(&self, composer: &str) {
        self.update_text(
            composer,
            |r| &mut r.metadata.track_info.composer,
            TrackEvent::ComposerChanged,
        );
    }

    pub fn grouping(&self) -> String {
        self.lock().record.metadata.track_info.grouping.clone()
    }

    pub fn set_grouping(&self, grouping: &str) {
        self.update_text(
            grouping,
            |r| &mut r.metadata.track_info.grouping,
            TrackEvent::GroupingChanged,
        );
    }

    pub fn year(&self) -> String {
        self.lock().record.metadata.track_info.year.clone()
    }

    pub fn set_year(&self, year: &str) {
        self.update_text(
            year,
            |r| &mut r.metadata.track_info.year,
            TrackEvent::YearChanged,
        );
    }

    pub fn track_number(&self) -> String {
        self.lock().record.metadata.track_info.track_number.clone()
    }

    pub fn set_track_number(&self, track_number: &str) {
        self.update_text(
            track_number,
            |r| &mut r.metadata.track_info.track_number,
            TrackEvent::TrackNumberChanged,
        );
    }

    pub fn track_total(&self) -> String {
        self.lock().record.metadata.track_info.track_total.clone()
    }

    pub fn set_track_total(&self, track_total: &str) {
        self.update_text(
            track_total,
            |r| &mut r.metadata.track_info.track_total,
            TrackEvent::TrackTotalChanged,
        );
    }

    pub fn comment(&self) -> String {
        self.lock().record.metadata.track_info.comment.clone()
    }

    pub fn set_comment(&self, comment: &str) {
        self.update_text(
            comment,
            |r| &mut r.metadata.track_info.comment,
            TrackEvent::CommentChanged,
        );
    }

    pub fn file_type(&self) -> String {
        self.lock().record.file_type.clone()
    }

    pub fn set_file_type(&self, file_type: &str) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.file_type, file_type.trim().to_string()) {
            self.mark_dirty_and_unlock(state, Vec::new());
        }
    }

    pub fn url(&self) -> String {
        self.lock().record.url.clone()
    }

    pub fn set_url(&self, url: &str) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.url, url.trim().to_string()) {
            self.mark_dirty_and_unlock(state, Vec::new());
        }
    }

    pub fn rating(&self) -> u8 {
        self.lock().record.rating
    }

    pub fn set_rating(&self, rating: u8) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.rating, rating) {
            self.mark_dirty_and_unlock(state, Vec::new());
        }
    }

    pub fn color(&self) -> Option<RgbColor> {
        self.lock().record.color
    }

    pub fn set_color(&self, color: Option<RgbColor>) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.color, color) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::ColorUpdated(color)]);
        }
    }

    pub fn date_added(&self) -> Option<DateTime<Utc>> {
        self.lock().record.date_added
    }

    /// Set by the persistence layer when the track is first stored.
    pub fn set_date_added(&self, date_added: Option<DateTime<Utc>>) {
        self.lock().record.date_added = date_added;
    }

    pub fn play_counter(&self) -> PlayCounter {
        self.lock().record.play_counter.clone()
    }

    pub fn set_play_counter(&self, play_counter: PlayCounter) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.play_counter, play_counter) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::TimesPlayedChanged]);
        }
    }

    pub fn update_play_counter(&self, played: bool) {
        let mut state = self.lock();
        let mut play_counter = state.record.play_counter.clone();
        play_counter.update_last_played_now_and_times_played(played);
        if compare_and_set(&mut state.record.play_counter, play_counter) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::TimesPlayedChanged]);
        }
    }

    // Replay gain

    pub fn replay_gain(&self) -> ReplayGain {
        self.lock().record.metadata.track_info.replay_gain
    }

    pub fn set_replay_gain(&self, replay_gain: ReplayGain) {
        let mut state = self.lock();
        if compare_and_set(
            &mut state.record.metadata.track_info.replay_gain,
            replay_gain,
        ) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::ReplayGainUpdated(replay_gain)]);
        }
    }

    /// Scale the replay gain ratio by a user adjusted pregain factor.
    pub fn adjust_replay_gain_from_pregain(&self, gain: f64) {
        let mut state = self.lock();
        let mut replay_gain = state.record.metadata.track_info.replay_gain;
        replay_gain.ratio = replay_gain.ratio.map(|ratio| ratio * gain);
        if compare_and_set(
            &mut state.record.metadata.track_info.replay_gain,
            replay_gain,
        ) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::ReplayGainAdjusted(replay_gain)]);
        }
    }

    // Stream properties

    pub fn stream_info(&self) -> StreamInfo {
        self.lock().record.metadata.stream_info
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.lock().sample_rate()
    }

    pub fn channel_count(&self) -> ChannelCount {
        self.lock().record.metadata.stream_info.signal.channel_count
    }

    pub fn duration(&self) -> Duration {
        self.lock().record.metadata.stream_info.duration
    }

    pub fn duration_text(&self, with_centis: bool) -> String {
        self.lock().record.metadata.duration_text(with_centis)
    }

    /// Rejected if the decoder already reported a different duration.
    pub fn set_duration(&self, duration: Duration) {
        let mut state = self.lock();
        if let Some(source) = state.record.stream_info_from_source {
            if source.has_duration() && source.duration != duration {
                warn!(
                    "Cannot override stream duration of {}: {:?} -> {:?}",
                    state.location.display(),
                    source.duration,
                    duration
                );
                return;
            }
        }
        if compare_and_set(&mut state.record.metadata.stream_info.duration, duration) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::DurationChanged]);
        }
    }

    pub fn bitrate(&self) -> Bitrate {
        self.lock().record.metadata.stream_info.bitrate
    }

    pub fn bitrate_text(&self) -> String {
        self.lock().record.metadata.bitrate_text()
    }

    /// Rejected if the decoder already reported a different bitrate.
    pub fn set_bitrate(&self, bitrate: Bitrate) {
        let mut state = self.lock();
        if let Some(source) = state.record.stream_info_from_source {
            if source.bitrate.is_valid() && source.bitrate != bitrate {
                warn!(
                    "Cannot override stream bitrate of {}: {} -> {}",
                    state.location.display(),
                    source.bitrate,
                    bitrate
                );
                return;
            }
        }
        if compare_and_set(&mut state.record.metadata.stream_info.bitrate, bitrate) {
            self.mark_dirty_and_unlock(state, Vec::new());
        }
    }

    /// Stream properties from file tags or the database. They are
    /// provisional and ignored once the decoder has reported the actual ones.
    pub fn set_audio_properties(&self, stream_info: StreamInfo) {
        let mut state = self.lock();
        if state.record.has_stream_info_from_source() {
            warn!(
                "Ignoring audio properties of {}: stream properties from source are already known",
                state.location.display()
            );
            return;
        }
        if compare_and_set(&mut state.record.metadata.stream_info, stream_info) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::DurationChanged]);
        }
    }

    /// Called once by the decoder when the stream has been opened. Completes
    /// pending beat and cue imports.
    pub fn update_stream_info_from_source(&self, stream_info: StreamInfo) {
        let mut state = self.lock();
        let updated = state.record.update_stream_info_from_source(stream_info);

        let beats_imported = state.pending_beats.is_some() && {
            debug!(
                "Finishing deferred import of beats for {}",
                state.location.display()
            );
            state.import_pending_beats()
        };
        let cues_imported = match state.pending_cues.as_ref().map(CueInfoImporter::len) {
            Some(count) => {
                debug!(
                    "Finishing deferred import of {} cue(s) for {}",
                    count,
                    state.location.display()
                );
                state.import_pending_cue_infos()
            }
            None => false,
        };

        if !(updated || beats_imported || cues_imported) {
            return;
        }
        let mut events = Vec::new();
        if updated {
            events.push(TrackEvent::DurationChanged);
        }
        if beats_imported {
            events.push(TrackEvent::BeatsUpdated);
        }
        if cues_imported {
            events.push(TrackEvent::CuesUpdated);
        }
        self.mark_dirty_and_unlock(state, events);
    }

    // Tempo and beat grid

    /// Always equal to the tempo of the beat grid.
    pub fn bpm(&self) -> Option<Bpm> {
        self.lock().bpm()
    }

    /// Set the tempo, creating a grid at the main cue if there is none. An
    /// invalid value removes the grid.
    pub fn try_set_bpm(&self, bpm: f64) -> bool {
        let mut state = self.lock();
        if !state.try_set_bpm(Bpm::new(bpm)) {
            return false;
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::BeatsUpdated]);
        true
    }

    pub fn beats(&self) -> Option<BeatsPointer> {
        self.lock().beats.clone()
    }

    /// Replace the beat grid unless the current one is locked.
    pub fn try_set_beats(&self, beats: Option<BeatsPointer>) -> bool {
        self.try_set_beats_and_unlock(beats, false)
    }

    pub fn try_set_and_lock_beats(&self, beats: Option<BeatsPointer>) -> bool {
        self.try_set_beats_and_unlock(beats, true)
    }

    fn try_set_beats_and_unlock(
        &self,
        beats: Option<BeatsPointer>,
        lock_bpm_after_set: bool,
    ) -> bool {
        let mut state = self.lock();
        if !state.try_set_beats(beats, lock_bpm_after_set) {
            return false;
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::BeatsUpdated]);
        true
    }

    pub fn is_bpm_locked(&self) -> bool {
        self.lock().record.bpm_locked
    }

    pub fn set_bpm_locked(&self, bpm_locked: bool) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.bpm_locked, bpm_locked) {
            self.mark_dirty_and_unlock(state, Vec::new());
        }
    }

    /// Import beats from file tags. If the sample rate is not known yet the
    /// current grid is removed and the import completes in
    /// [`Track::update_stream_info_from_source`].
    pub fn try_import_beats(
        &self,
        importer: BeatsImporter,
        lock_bpm_after_set: bool,
    ) -> ImportStatus {
        if importer.is_empty() {
            return ImportStatus::Complete;
        }
        let mut state = self.lock();
        if state.pending_beats.is_some() {
            warn!(
                "Replacing pending import of beats for {}",
                state.location.display()
            );
            debug_assert!(false, "only one import of beats may be pending");
        }
        if state.beats.is_some() && state.record.bpm_locked {
            debug!(
                "Beat grid of {} is locked, discarding imported beats",
                state.location.display()
            );
            return ImportStatus::Complete;
        }
        state.pending_beats = Some(importer);

        if state.record.has_stream_info_from_source() {
            let mut modified = state.import_pending_beats();
            modified |= compare_and_set(&mut state.record.bpm_locked, lock_bpm_after_set);
            if modified {
                self.mark_dirty_and_unlock(state, vec![TrackEvent::BeatsUpdated]);
            }
            return ImportStatus::Complete;
        }

        debug!(
            "Import of beats for {} is pending until the sample rate is known",
            state.location.display()
        );
        // Stale beats must not be visible while the import is pending.
        if state.try_set_beats(None, lock_bpm_after_set) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::BeatsUpdated]);
        }
        ImportStatus::Pending
    }

    pub fn beats_import_status(&self) -> ImportStatus {
        if self.lock().pending_beats.is_some() {
            ImportStatus::Pending
        } else {
            ImportStatus::Complete
        }
    }

    // Keys

    pub fn keys(&self) -> Keys {
        self.lock().record.keys
    }

    pub fn set_keys(&self, keys: Keys) {
        let mut state = self.lock();
        let text = keys.text();
        let mut modified = compare_and_set(&mut state.record.keys, keys);
        modified |= compare_and_set(&mut state.record.metadata.track_info.key, text);
        if modified {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::KeyChanged]);
        }
    }

    pub fn reset_keys(&self) {
        let mut state = self.lock();
        if state.record.reset_keys() {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::KeyChanged]);
        }
    }

    pub fn key(&self) -> Option<ChromaticKey> {
        self.lock().record.keys.global
    }

    pub fn key_text(&self) -> String {
        self.lock().record.keys.text()
    }

    pub fn set_key(&self, key: ChromaticKey, source: KeySource) {
        let mut state = self.lock();
        if state.record.update_global_key(key, source) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::KeyChanged]);
        }
    }

    pub fn set_key_text(&self, text: &str, source: KeySource) -> UpdateResult {
        let mut state = self.lock();
        let result = state.record.update_global_key_text(text, source);
        if result == UpdateResult::Updated {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::KeyChanged]);
        }
        result
    }

    // Cover art

    pub fn cover_info(&self) -> CoverInfo {
        self.lock().record.cover_info.clone()
    }

    pub fn set_cover_info(&self, cover_info: CoverInfo) {
        let mut state = self.lock();
        if compare_and_set(&mut state.record.cover_info, cover_info) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::CoverArtUpdated]);
        }
    }

    /// Update the digest after the cover image has been loaded.
    pub fn refresh_cover_image_digest(&self, image: &[u8]) -> bool {
        let mut state = self.lock();
        if !state.record.cover_info.refresh_image_digest(image) {
            return false;
        }
        info!(
            "Refreshed cover image digest of {}",
            state.location.display()
        );
        self.mark_dirty_and_unlock(state, vec![TrackEvent::CoverArtUpdated]);
        true
    }

    // Cue points

    pub fn main_cue_position(&self) -> Option<FramePos> {
        self.lock().record.main_cue_position
    }

    /// Move, create or (with `None`) remove the main cue.
    pub fn set_main_cue_position(&self, position: Option<FramePos>) {
        let mut state = self.lock();
        if !compare_and_set(&mut state.record.main_cue_position, position) {
            return;
        }
        let main_cue = state.find_cue_by_type(CueType::MainCue);
        match (position, main_cue) {
            (Some(_), Some(cue)) => {
                cue.set_start_position_silently(position);
            }
            (Some(_), None) => {
                let cue = Cue::new(CueType::MainCue, None, position, None);
                cue.attach(state.on_cue_updated.clone());
                state.cue_points.push(cue);
            }
            (None, Some(cue)) => {
                cue.detach();
                state.cue_points.retain(|c| !Arc::ptr_eq(c, &cue));
            }
            (None, None) => {}
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
    }

    /// Returns `None` for an invalid hot cue index, if both positions are
    /// missing or if a second main cue is requested.
    pub fn create_and_add_cue(
        &self,
        cue_type: CueType,
        hot_cue_index: Option<i32>,
        start_position: Option<FramePos>,
        end_position: Option<FramePos>,
    ) -> Option<CuePointer> {
        if hot_cue_index.is_some_and(|index| index < FIRST_HOT_CUE_INDEX) {
            warn!("Invalid hot cue index {:?}", hot_cue_index);
            return None;
        }
        if start_position.is_none() && end_position.is_none() {
            warn!("Cannot create a cue without any position");
            return None;
        }
        let cue = Cue::new(cue_type, hot_cue_index, start_position, end_position);

        let mut state = self.lock();
        if cue_type == CueType::MainCue {
            if state.find_cue_by_type(CueType::MainCue).is_some() {
                warn!("{} already has a main cue", state.location.display());
                return None;
            }
            state.record.main_cue_position = start_position;
        }
        cue.attach(state.on_cue_updated.clone());
        state.cue_points.push(cue.clone());
        self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
        Some(cue)
    }

    /// The first cue of the given type. Hot cues are usually looked up by
    /// index instead.
    pub fn find_cue_by_type(&self, cue_type: CueType) -> Option<CuePointer> {
        self.lock().find_cue_by_type(cue_type)
    }

    pub fn find_cue_by_id(&self, id: i64) -> Option<CuePointer> {
        self.lock()
            .cue_points
            .iter()
            .find(|c| c.id() == Some(id))
            .cloned()
    }

    /// Independent copy of the cue handles.
    pub fn cue_points(&self) -> Vec<CuePointer> {
        self.lock().cue_points.clone()
    }

    pub fn remove_cue(&self, cue: &CuePointer) -> bool {
        let mut state = self.lock();
        let Some(index) = state.cue_points.iter().position(|c| Arc::ptr_eq(c, cue)) else {
            return false;
        };
        let removed = state.cue_points.remove(index);
        removed.detach();
        if removed.cue_type() == CueType::MainCue {
            state.record.main_cue_position = Some(FramePos::START);
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
        true
    }

    pub fn remove_cues_of_type(&self, cue_type: CueType) {
        let mut state = self.lock();
        let (removed, kept): (Vec<CuePointer>, Vec<CuePointer>) = state
            .cue_points
            .drain(..)
            .partition(|c| c.cue_type() == cue_type);
        state.cue_points = kept;
        if removed.is_empty() {
            return;
        }
        for cue in &removed {
            cue.detach();
        }
        if cue_type == CueType::MainCue {
            state.record.main_cue_position = Some(FramePos::START);
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
    }

    /// Replace all cue points. A non-empty list supersedes a pending cue
    /// import.
    pub fn set_cue_points(&self, cue_points: Vec<CuePointer>) {
        let mut state = self.lock();
        if !cue_points.is_empty() && state.pending_cues.take().is_some() {
            warn!(
                "Discarding pending import of cues for {}",
                state.location.display()
            );
        }
        if state.set_cue_points(cue_points) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
        }
    }

    /// Shift all cues by a time offset. Needs the stream properties from
    /// the decoder.
    pub fn shift_cue_positions_millis(&self, milliseconds: f64) {
        let mut state = self.lock();
        let Some(signal) = state.signal_from_source() else {
            warn!(
                "Cannot shift cues of {} before the sample rate is known",
                state.location.display()
            );
            return;
        };
        let frames = signal.millis_to_frames(milliseconds);
        let mut modified = false;
        for cue in &state.cue_points {
            modified |= cue.shift_position_frames_silently(frames);
        }
        if !modified {
            return;
        }
        if let Some(main_cue) = state.find_cue_by_type(CueType::MainCue) {
            state.record.main_cue_position = main_cue.position();
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
    }

    /// Import cues from file tags. If the sample rate is not known yet the
    /// current cues are removed and the import completes in
    /// [`Track::update_stream_info_from_source`].
    pub fn import_cue_infos(&self, importer: CueInfoImporter) -> ImportStatus {
        if importer.is_empty() {
            return ImportStatus::Complete;
        }
        let count = importer.len();
        let mut state = self.lock();
        if state.pending_cues.is_some() {
            warn!(
                "Replacing pending import of cues for {}",
                state.location.display()
            );
            debug_assert!(false, "only one import of cues may be pending");
        }
        state.pending_cues = Some(importer);

        if state.record.has_stream_info_from_source() {
            if state.import_pending_cue_infos() {
                self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
            }
            return ImportStatus::Complete;
        }

        debug!(
            "Import of {} cue(s) for {} is pending until the sample rate is known",
            count,
            state.location.display()
        );
        if state.set_cue_points(Vec::new()) {
            self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
        }
        ImportStatus::Pending
    }

    pub fn cue_import_status(&self) -> ImportStatus {
        if self.lock().pending_cues.is_some() {
            ImportStatus::Pending
        } else {
            ImportStatus::Complete
        }
    }

    /// A holder modified one of our cues.
    fn on_cue_updated(&self, cue: &Cue) {
        let mut state = self.lock();
        let is_member = state
            .cue_points
            .iter()
            .any(|c| std::ptr::eq(Arc::as_ptr(c), cue));
        if !is_member {
            return;
        }
        if cue.cue_type() == CueType::MainCue {
            state.record.main_cue_position = cue.position();
        }
        self.mark_dirty_and_unlock(state, vec![TrackEvent::CuesUpdated]);
    }

    // Dirty state

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn mark_dirty(&self) {
        let state = self.lock();
        self.set_dirty_and_unlock(state, true, Vec::new());
    }

    /// Called by the persistence layer after the record has been stored.
    pub fn mark_clean(&self) {
        let state = self.lock();
        self.set_dirty_and_unlock(state, false, Vec::new());
    }

    /// Force the next export even if the file tags look unchanged. The flag
    /// is not persisted and does not dirty the track.
    pub fn mark_for_metadata_export(&self) {
        self.lock().marked_for_metadata_export = true;
    }

    pub fn is_marked_for_metadata_export(&self) -> bool {
        self.lock().marked_for_metadata_export
    }

    // Analysis artifacts. Write-once per assignment and not part of the
    // record, so they bypass the track lock and the dirty flag.

    pub fn waveform(&self) -> Option<WaveformPointer> {
        self.waveform.read().clone()
    }

    pub fn set_waveform(&self, waveform: Option<WaveformPointer>) {
        *self.waveform.write() = waveform;
        self.events.emit(vec![TrackEvent::WaveformUpdated]);
    }

    pub fn waveform_summary(&self) -> Option<WaveformPointer> {
        self.waveform_summary.read().clone()
    }

    pub fn set_waveform_summary(&self, waveform: Option<WaveformPointer>) {
        *self.waveform_summary.write() = waveform;
        self.events.emit(vec![TrackEvent::WaveformSummaryUpdated]);
    }

    pub fn analysis_finished(&self) {
        self.events.emit(vec![TrackEvent::Analyzed]);
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.pending_beats.as_ref().is_some_and(|i| !i.is_empty()) {
            warn!(
                "Discarding pending import of beats for {}",
                state.location.display()
            );
        }
        if let Some(importer) = state.pending_cues.as_ref().filter(|i| !i.is_empty()) {
            warn!(
                "Discarding pending import of {} cue(s) for {}",
                importer.len(),
                state.location.display()
            );
        }
        for cue in &state.cue_points {
            cue.detach();
        }
    }
}
