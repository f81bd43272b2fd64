//! The track aggregate and its value types.
//!
//! A [`Track`] owns the metadata of one audio file together with its beat
//! grid and cue points. All state sits behind one lock; change events are
//! published only after that lock has been released, so event handlers may
//! call back into the track.

mod beats;
mod cue;
mod events;
mod export;
mod import;
mod key;
mod metadata;
mod model;
mod record;

pub use beats::*;
pub use cue::*;
pub use events::*;
pub use export::*;
pub use import::*;
pub use key::*;
pub use metadata::*;
pub use model::{Track, TrackPointer, Waveform, WaveformPointer};
pub use record::*;
