//! Audio stream value types.
//!
//! Describes the properties of a decoded PCM stream (sample rate, channel
//! count, bitrate, duration) and converts between frame, sample and time
//! offsets. Everything in here is stateless.

mod signal;
mod stream;

pub use signal::*;
pub use stream::*;
