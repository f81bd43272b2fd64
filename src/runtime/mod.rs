use std::env;
use std::path::PathBuf;

use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;

use trackstate::config::Settings;
use trackstate::library::scan;
use trackstate::source::{TagFile, update_track_from_source};
use trackstate::track::{ExportTrackMetadataResult, ImportResult, ImportStatus, TrackPointer};

mod settings;

#[derive(Debug, Default)]
struct Summary {
    imported: usize,
    failed: usize,
    with_beats: usize,
    with_cues: usize,
    pending: usize,
}

#[derive(Debug, Default)]
struct ExportSummary {
    exported: usize,
    skipped: usize,
    failed: usize,
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut print_config = false;
    let mut dir: Option<PathBuf> = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--print-config" => print_config = true,
            _ => dir = Some(PathBuf::from(arg)),
        }
    }

    let settings = settings::load_settings();
    if print_config {
        print!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let dir = match dir {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let tracks = scan(&dir, &settings.library);
    info!("Found {} audio file(s) in {}", tracks.len(), dir.display());

    let summary = load_tracks(&tracks, &settings);
    info!(
        "Loaded {} track(s): {} failed, {} with beat grid, {} with cues, {} incomplete",
        summary.imported, summary.failed, summary.with_beats, summary.with_cues, summary.pending
    );

    if settings.metadata.export_on_exit {
        let exports = export_tracks(&tracks, &settings);
        info!(
            "Exported metadata of {} track(s): {} skipped, {} failed",
            exports.exported, exports.skipped, exports.failed
        );
    }
    Ok(())
}

fn load_tracks(tracks: &[TrackPointer], settings: &Settings) -> Summary {
    let mut summary = Summary::default();
    for track in tracks {
        match update_track_from_source(track, &settings.metadata) {
            ImportResult::Succeeded => summary.imported += 1,
            ImportResult::Failed => summary.failed += 1,
        }
        if track.beats().is_some() {
            summary.with_beats += 1;
        }
        if !track.cue_points().is_empty() {
            summary.with_cues += 1;
        }
        if track.beats_import_status() == ImportStatus::Pending
            || track.cue_import_status() == ImportStatus::Pending
        {
            warn!(
                "Import of beats or cues incomplete: {}",
                track.location().display()
            );
            summary.pending += 1;
        }
        debug!(
            "{} [{}] bpm={} key={} cues={}",
            track.info(),
            track.duration_text(false),
            track.bpm().map(|b| b.to_string()).unwrap_or_default(),
            track.key_text(),
            track.cue_points().len()
        );
    }
    summary
}

fn export_tracks(tracks: &[TrackPointer], settings: &Settings) -> ExportSummary {
    let mut summary = ExportSummary::default();
    for track in tracks.iter().filter(|t| t.is_dirty()) {
        let file = TagFile::new(track.location());
        match track.export_metadata(&file, &settings.metadata) {
            ExportTrackMetadataResult::Succeeded => summary.exported += 1,
            ExportTrackMetadataResult::Skipped => summary.skipped += 1,
            ExportTrackMetadataResult::Failed => summary.failed += 1,
        }
    }
    summary
}
