use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lofty::config::WriteOptions;
use lofty::error::ErrorKind;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::PictureType;
use lofty::tag::{ItemKey, Tag};
use tracing::{debug, warn};

use crate::audio::{Bitrate, ChannelCount, SampleRate, SignalInfo, StreamInfo};
use crate::error::{Error, Result};
use crate::track::{
    Bpm, EMBEDDED_TAGS_KEY, EmbeddedTags, ExportResult, ImportResult, ImportedTags, MetadataSource,
    ReplayGain, TrackMetadata,
};

/// Tag items that are carried along without being interpreted.
fn extra_items() -> [(ItemKey, &'static str); 6] {
    [
        (ItemKey::Mood, "MOOD"),
        (ItemKey::Label, "LABEL"),
        (ItemKey::Isrc, "ISRC"),
        (ItemKey::Remixer, "REMIXER"),
        (ItemKey::Conductor, "CONDUCTOR"),
        (ItemKey::Lyricist, "LYRICIST"),
    ]
}

fn embedded_tags_key() -> ItemKey {
    ItemKey::Unknown(EMBEDDED_TAGS_KEY.to_string())
}

/// Tags of a single audio file, read and written with lofty.
#[derive(Debug, Clone)]
pub struct TagFile {
    path: PathBuf,
}

impl TagFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata from the primary tag (or the first one found) plus the cover
    /// image bytes. Stream properties are taken from the container headers.
    pub fn read(&self) -> Result<(TrackMetadata, Option<Vec<u8>>)> {
        let tagged = lofty::read_from_path(&self.path)?;

        let mut metadata = TrackMetadata::default();
        let properties = tagged.properties();
        metadata.stream_info = StreamInfo::new(
            SignalInfo::new(
                ChannelCount::new(properties.channels().map(u16::from).unwrap_or(0)),
                SampleRate::new(properties.sample_rate().unwrap_or(0)),
            ),
            Bitrate::new(properties.audio_bitrate().unwrap_or(0)),
            properties.duration(),
        );

        let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
            return Err(Error::NoTags(self.path.clone()));
        };

        let text = |key: ItemKey| {
            tag.get_string(&key)
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let info = &mut metadata.track_info;
        info.title = text(ItemKey::TrackTitle);
        info.artist = text(ItemKey::TrackArtist);
        info.genre = text(ItemKey::Genre);
        info.composer = text(ItemKey::Composer);
        info.grouping = text(ItemKey::ContentGroup);
        info.year = text(ItemKey::RecordingDate);
        info.track_number = text(ItemKey::TrackNumber);
        info.track_total = text(ItemKey::TrackTotal);
        info.comment = text(ItemKey::Comment);
        info.key = text(ItemKey::InitialKey);
        info.bpm = tag
            .get_string(&ItemKey::Bpm)
            .or_else(|| tag.get_string(&ItemKey::IntegerBpm))
            .and_then(Bpm::parse);
        if let Some(gain_db) = tag
            .get_string(&ItemKey::ReplayGainTrackGain)
            .and_then(ReplayGain::parse_db)
        {
            info.replay_gain = ReplayGain::from_db(gain_db);
        }
        info.replay_gain.peak = tag
            .get_string(&ItemKey::ReplayGainTrackPeak)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());

        if let Some(json) = tag.get_string(&embedded_tags_key()) {
            match EmbeddedTags::from_json(json) {
                Ok(embedded) => info.embedded = embedded,
                Err(err) => warn!(
                    "Ignoring invalid embedded tags in {}: {err}",
                    self.path.display()
                ),
            }
        }

        metadata.album_info.title = text(ItemKey::AlbumTitle);
        metadata.album_info.artist = text(ItemKey::AlbumArtist);

        for (key, name) in extra_items() {
            let value = text(key);
            if !value.is_empty() {
                metadata.extra.insert(name.to_string(), value);
            }
        }

        let pictures = tag.pictures();
        let cover = pictures
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.first())
            .map(|p| p.data().to_vec());

        Ok((metadata, cover))
    }

    /// Write all tag fields. Empty values remove the tag item.
    pub fn write(&self, metadata: &TrackMetadata) -> Result<()> {
        let mut tagged = lofty::read_from_path(&self.path)?;
        if tagged.primary_tag().is_none() {
            let tag_type = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
        }
        let Some(tag) = tagged.primary_tag_mut() else {
            return Err(Error::NoTags(self.path.clone()));
        };

        let info = &metadata.track_info;
        set_text(tag, ItemKey::TrackTitle, &info.title);
        set_text(tag, ItemKey::TrackArtist, &info.artist);
        set_text(tag, ItemKey::Genre, &info.genre);
        set_text(tag, ItemKey::Composer, &info.composer);
        set_text(tag, ItemKey::ContentGroup, &info.grouping);
        set_text(tag, ItemKey::RecordingDate, &info.year);
        set_text(tag, ItemKey::TrackNumber, &info.track_number);
        set_text(tag, ItemKey::TrackTotal, &info.track_total);
        set_text(tag, ItemKey::Comment, &info.comment);
        set_text(tag, ItemKey::InitialKey, &info.key);
        set_text(tag, ItemKey::AlbumTitle, &metadata.album_info.title);
        set_text(tag, ItemKey::AlbumArtist, &metadata.album_info.artist);

        let bpm = info
            .bpm
            .map(|bpm| bpm.value().to_string())
            .unwrap_or_default();
        set_text(tag, ItemKey::Bpm, &bpm);

        let gain = info
            .replay_gain
            .gain_db()
            .map(|db| format!("{db:.2} dB"))
            .unwrap_or_default();
        set_text(tag, ItemKey::ReplayGainTrackGain, &gain);
        let peak = info
            .replay_gain
            .peak
            .map(|peak| format!("{peak:.6}"))
            .unwrap_or_default();
        set_text(tag, ItemKey::ReplayGainTrackPeak, &peak);

        for (key, name) in extra_items() {
            let value = metadata
                .extra
                .get(name)
                .map(String::as_str)
                .unwrap_or_default();
            set_text(tag, key, value);
        }

        let embedded = if info.embedded.is_empty() {
            String::new()
        } else {
            info.embedded.to_json()?
        };
        set_text(tag, embedded_tags_key(), &embedded);

        tagged.save_to_path(&self.path, WriteOptions::default())?;
        Ok(())
    }

    /// Modification time of the file, used as the synchronization timestamp.
    pub fn modified_at(&self) -> Result<DateTime<Utc>> {
        let modified = fs::metadata(&self.path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

fn set_text(tag: &mut Tag, key: ItemKey, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        tag.remove_key(&key);
    } else {
        tag.insert_text(key, value.to_string());
    }
}

impl MetadataSource for TagFile {
    fn import_track_metadata_and_cover_image(&self) -> ImportedTags {
        match self.read() {
            Ok((metadata, cover)) => (ImportResult::Succeeded, metadata, cover),
            Err(err) => {
                debug!("Failed to import tags: {err}");
                (ImportResult::Failed, TrackMetadata::default(), None)
            }
        }
    }

    fn export_track_metadata(
        &self,
        metadata: &TrackMetadata,
    ) -> (ExportResult, Option<DateTime<Utc>>) {
        match self.write(metadata) {
            Ok(()) => (ExportResult::Succeeded, self.modified_at().ok()),
            Err(Error::Tag(err)) if matches!(err.kind(), ErrorKind::UnknownFormat) => {
                debug!("Writing tags is not supported for {}", self.path.display());
                (ExportResult::Unsupported, None)
            }
            Err(err) => {
                warn!("Failed to write tags into {}: {err}", self.path.display());
                (ExportResult::Failed, None)
            }
        }
    }
}
