//! Audio files as the source of track metadata.
//!
//! Tags are read and written with lofty; the stream properties come from
//! opening the file with the decoder.

mod decoder;
mod tags;

pub use decoder::probe_stream_info;
pub use tags::TagFile;

use tracing::{debug, warn};

use crate::config::MetadataSettings;
use crate::track::{ImportResult, MetadataSource, Track};

/// Import the file tags (unless the track is already synchronized) and the
/// stream properties of the track's file. Embedded beats and cues complete
/// once the stream has been probed.
pub fn update_track_from_source(track: &Track, settings: &MetadataSettings) -> ImportResult {
    let location = track.location();
    let file = TagFile::new(&location);
    let mut result = ImportResult::Succeeded;

    if let Some(extension) = location.extension().and_then(|e| e.to_str()) {
        track.set_file_type(&extension.to_ascii_lowercase());
    }

    if track.is_source_synchronized() && !settings.reimport_synchronized {
        debug!(
            "Skip importing tags of synchronized track: {}",
            location.display()
        );
    } else {
        match file.import_track_metadata_and_cover_image() {
            (ImportResult::Succeeded, metadata, cover) => {
                track.replace_metadata_from_source(metadata, file.modified_at().ok());
                if let Some(image) = cover {
                    track.refresh_cover_image_digest(&image);
                }
            }
            (ImportResult::Failed, _, _) => {
                warn!("Failed to import tags of {}", location.display());
                result = ImportResult::Failed;
            }
        }
    }

    match probe_stream_info(&location) {
        Ok(stream_info) => track.update_stream_info_from_source(stream_info),
        Err(err) => {
            warn!("Failed to open {}: {err}", location.display());
            result = ImportResult::Failed;
        }
    }
    result
}

#[cfg(test)]
mod tests;
