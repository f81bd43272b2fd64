use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;

use super::*;
use crate::audio::{ChannelCount, SampleRate};
use crate::track::{ExportResult, ImportStatus, TrackMetadata};

/// Silent 16-bit PCM.
fn write_wav(path: &Path, sample_rate: u32, channels: u16, seconds: u32) {
    let bits: u16 = 16;
    let block_align = channels * bits / 8;
    let data_len = sample_rate * seconds * u32::from(block_align);
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);
    fs::write(path, bytes).unwrap();
}

#[test]
fn probe_reports_decoded_signal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_wav(&path, 44_100, 2, 1);

    let stream_info = probe_stream_info(&path).unwrap();
    assert_eq!(stream_info.signal.sample_rate, SampleRate::new(44_100));
    assert_eq!(stream_info.signal.channel_count, ChannelCount::new(2));
    assert_eq!(stream_info.duration.as_millis(), 1000);
    assert!(stream_info.bitrate.is_valid());
}

#[test]
fn probe_fails_for_missing_and_garbage_files() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        probe_stream_info(&dir.path().join("missing.mp3")),
        Err(crate::error::Error::Io(_))
    ));

    let garbage = dir.path().join("garbage.txt");
    fs::write(&garbage, b"definitely not audio").unwrap();
    assert!(probe_stream_info(&garbage).is_err());
}

#[test]
fn reading_missing_file_fails_import() {
    let dir = tempdir().unwrap();
    let file = TagFile::new(dir.path().join("missing.flac"));
    let (result, metadata, cover) = file.import_track_metadata_and_cover_image();
    assert_eq!(result, ImportResult::Failed);
    assert_eq!(metadata, TrackMetadata::default());
    assert!(cover.is_none());
}

#[test]
fn writing_unknown_format_is_unsupported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, b"hello").unwrap();
    let (result, synchronized_at) =
        TagFile::new(&path).export_track_metadata(&TrackMetadata::default());
    assert_eq!(result, ExportResult::Unsupported);
    assert!(synchronized_at.is_none());
}

#[test]
fn tags_round_trip_through_wav() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tagged.wav");
    write_wav(&path, 44_100, 2, 1);
    let file = TagFile::new(&path);

    let mut metadata = TrackMetadata::default();
    metadata.track_info.title = "Title".to_string();
    metadata.track_info.artist = "Artist".to_string();
    metadata.album_info.title = "Album".to_string();
    let (result, synchronized_at) = file.export_track_metadata(&metadata);
    assert_eq!(result, ExportResult::Succeeded);
    assert!(synchronized_at.is_some());

    let (read, _) = file.read().unwrap();
    assert_eq!(read.track_info.title, "Title");
    assert_eq!(read.track_info.artist, "Artist");
    assert_eq!(read.album_info.title, "Album");
    assert_eq!(read.stream_info.signal.sample_rate, SampleRate::new(44_100));
}

#[test]
fn update_from_untagged_file_still_probes_stream() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.wav");
    write_wav(&path, 48_000, 1, 2);
    let track = Track::new_temporary(&path);

    let result = update_track_from_source(&track, &MetadataSettings::default());
    assert_eq!(result, ImportResult::Failed);
    assert_eq!(track.sample_rate(), SampleRate::new(48_000));
    assert_eq!(track.duration(), Duration::from_secs(2));
    assert_eq!(track.file_type(), "wav");
    assert!(!track.is_source_synchronized());
}

#[test]
fn update_from_missing_file_leaves_track_untouched() {
    let dir = tempdir().unwrap();
    let track = Track::new_temporary(dir.path().join("gone.mp3"));
    track.mark_clean();
    let result = update_track_from_source(&track, &MetadataSettings::default());
    assert_eq!(result, ImportResult::Failed);
    assert!(track.stream_info().duration.is_zero());
    assert_eq!(track.beats_import_status(), ImportStatus::Complete);
}

#[test]
fn update_imports_tags_and_completes_after_probe() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("song.wav");
    write_wav(&path, 44_100, 2, 1);
    let mut metadata = TrackMetadata::default();
    metadata.track_info.title = "Song".to_string();
    let (result, _) = TagFile::new(&path).export_track_metadata(&metadata);
    assert_eq!(result, ExportResult::Succeeded);

    let track = Track::new_temporary(&path);
    let result = update_track_from_source(&track, &MetadataSettings::default());
    assert_eq!(result, ImportResult::Succeeded);
    assert_eq!(track.title(), "Song");
    assert!(track.is_source_synchronized());
    assert_eq!(track.sample_rate(), SampleRate::new(44_100));
}
