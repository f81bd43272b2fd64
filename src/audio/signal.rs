use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Number of frames per second of a PCM stream.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleRate(pub u32);

impl SampleRate {
    pub const fn new(hz: u32) -> Self {
        Self(hz)
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    pub fn hz(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Number of interleaved samples per frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelCount(pub u16);

impl ChannelCount {
    pub const fn new(channels: u16) -> Self {
        Self(channels)
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    pub fn count(self) -> u16 {
        self.0
    }
}

/// Average bitrate of the encoded stream in kbit/s.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitrate(pub u32);

impl Bitrate {
    pub const fn new(kbps: u32) -> Self {
        Self(kbps)
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    pub fn kbps(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps", self.0)
    }
}

/// A (fractional) frame offset from the start of a stream.
///
/// Invalid positions are represented as `Option<FramePos>::None` by callers;
/// the constructor rejects non-finite values.
#[derive(Debug, Default, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FramePos(f64);

impl FramePos {
    /// The default start position of every track.
    pub const START: FramePos = FramePos(0.0);

    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Add<f64> for FramePos {
    type Output = FramePos;

    fn add(self, frames: f64) -> FramePos {
        FramePos(self.0 + frames)
    }
}

impl Sub for FramePos {
    type Output = f64;

    fn sub(self, other: FramePos) -> f64 {
        self.0 - other.0
    }
}

/// Properties that characterize an uncompressed PCM signal.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub channel_count: ChannelCount,
    pub sample_rate: SampleRate,
}

impl SignalInfo {
    pub fn new(channel_count: ChannelCount, sample_rate: SampleRate) -> Self {
        Self {
            channel_count,
            sample_rate,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.channel_count.is_valid() && self.sample_rate.is_valid()
    }

    /// Sample offsets must lie on frame boundaries.
    pub fn samples_to_frames(&self, samples: u64) -> u64 {
        debug_assert!(self.channel_count.is_valid());
        samples / u64::from(self.channel_count.0)
    }

    pub fn frames_to_samples(&self, frames: u64) -> u64 {
        debug_assert!(self.channel_count.is_valid());
        frames * u64::from(self.channel_count.0)
    }

    pub fn frames_to_secs(&self, frames: f64) -> f64 {
        debug_assert!(self.sample_rate.is_valid());
        frames / f64::from(self.sample_rate.0)
    }

    pub fn secs_to_frames(&self, seconds: f64) -> f64 {
        debug_assert!(self.sample_rate.is_valid());
        seconds * f64::from(self.sample_rate.0)
    }

    pub fn frames_to_millis(&self, frames: f64) -> f64 {
        self.frames_to_secs(frames) * 1000.0
    }

    pub fn millis_to_frames(&self, milliseconds: f64) -> f64 {
        self.secs_to_frames(milliseconds / 1000.0)
    }
}

impl fmt::Display for SignalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ch @ {}", self.channel_count.0, self.sample_rate)
    }
}
