//! In-memory track aggregates for a DJ library.
//!
//! A [`track::Track`] owns the metadata of one audio file together with its
//! beat grid and cue points and keeps them consistent while being shared
//! between threads. Beats and cues read from file tags are imported once the
//! decoder has reported the stream properties.

pub mod audio;
pub mod config;
pub mod error;
pub mod library;
pub mod source;
pub mod track;
