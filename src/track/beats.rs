//! Constant-tempo beat grids.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::{FramePos, SampleRate};

use super::metadata::Bpm;

pub type BeatsPointer = Arc<Beats>;

/// A beat grid with a fixed tempo, anchored at the position of one beat.
///
/// Grids are immutable; every modification returns a new grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beats {
    sample_rate: SampleRate,
    first_beat: FramePos,
    bpm: Bpm,
}

impl Beats {
    pub fn from_const_tempo(
        sample_rate: SampleRate,
        first_beat: FramePos,
        bpm: Bpm,
    ) -> BeatsPointer {
        Arc::new(Self {
            sample_rate,
            first_beat,
            bpm,
        })
    }

    /// Fit a grid to detected or imported beat positions. The tempo is
    /// derived from the mean beat interval; a single position needs a tempo
    /// hint.
    pub fn from_beat_positions(
        sample_rate: SampleRate,
        positions: &[FramePos],
        bpm_hint: Option<Bpm>,
    ) -> Option<BeatsPointer> {
        let first = *positions.first()?;
        let bpm = match positions {
            [_] => bpm_hint?,
            [.., last] => {
                let mean_interval = (*last - first) / (positions.len() - 1) as f64;
                if mean_interval <= 0.0 || !sample_rate.is_valid() {
                    bpm_hint?
                } else {
                    Bpm::new(60.0 * f64::from(sample_rate.hz()) / mean_interval).or(bpm_hint)?
                }
            }
            [] => return None,
        };
        Some(Self::from_const_tempo(sample_rate, first, bpm))
    }

    pub fn bpm(&self) -> Bpm {
        self.bpm
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn first_beat(&self) -> FramePos {
        self.first_beat
    }

    /// Same anchor, different tempo.
    pub fn with_bpm(&self, bpm: Bpm) -> BeatsPointer {
        Self::from_const_tempo(self.sample_rate, self.first_beat, bpm)
    }

    pub fn translate(&self, frames: f64) -> BeatsPointer {
        Self::from_const_tempo(self.sample_rate, self.first_beat + frames, self.bpm)
    }

    pub fn beat_length_frames(&self) -> f64 {
        f64::from(self.sample_rate.hz()) * 60.0 / self.bpm.value()
    }

    /// Position of the `n`-th beat relative to the anchor (may be negative).
    pub fn nth_beat(&self, n: i64) -> FramePos {
        self.first_beat + n as f64 * self.beat_length_frames()
    }

    /// The first beat at or after `position`.
    pub fn find_next_beat(&self, position: FramePos) -> Option<FramePos> {
        let length = self.beat_length_frames();
        if length <= 0.0 {
            return None;
        }
        let n = ((position - self.first_beat) / length).ceil();
        Some(self.first_beat + n * length)
    }

    /// The last beat at or before `position`.
    pub fn find_prev_beat(&self, position: FramePos) -> Option<FramePos> {
        let length = self.beat_length_frames();
        if length <= 0.0 {
            return None;
        }
        let n = ((position - self.first_beat) / length).floor();
        Some(self.first_beat + n * length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(v: f64) -> FramePos {
        FramePos::new(v).unwrap()
    }

    #[test]
    fn const_tempo_grid_lays_out_beats() {
        let beats = Beats::from_const_tempo(
            SampleRate::new(48_000),
            pos(1000.0),
            Bpm::new(120.0).unwrap(),
        );
        assert_eq!(beats.beat_length_frames(), 24_000.0);
        assert_eq!(beats.nth_beat(2), pos(49_000.0));
        assert_eq!(beats.nth_beat(-1), pos(-23_000.0));
        assert_eq!(beats.find_next_beat(pos(1001.0)), Some(pos(25_000.0)));
        assert_eq!(beats.find_prev_beat(pos(24_999.0)), Some(pos(1000.0)));
        assert_eq!(beats.find_next_beat(pos(1000.0)), Some(pos(1000.0)));
    }

    #[test]
    fn with_bpm_keeps_the_anchor() {
        let beats = Beats::from_const_tempo(
            SampleRate::new(44_100),
            pos(500.0),
            Bpm::new(128.0).unwrap(),
        );
        let retempoed = beats.with_bpm(Bpm::new(130.0).unwrap());
        assert_eq!(retempoed.first_beat(), pos(500.0));
        assert_eq!(retempoed.bpm().value(), 130.0);
        assert_eq!(beats.bpm().value(), 128.0);
    }

    #[test]
    fn from_beat_positions_uses_mean_interval() {
        let positions: Vec<FramePos> = (0..5).map(|i| pos(100.0 + i as f64 * 22_050.0)).collect();
        let beats = Beats::from_beat_positions(SampleRate::new(44_100), &positions, None).unwrap();
        assert_eq!(beats.bpm().value(), 120.0);
        assert_eq!(beats.first_beat(), pos(100.0));
    }

    #[test]
    fn from_beat_positions_needs_hint_for_single_beat() {
        let sr = SampleRate::new(44_100);
        assert!(Beats::from_beat_positions(sr, &[pos(0.0)], None).is_none());
        assert!(Beats::from_beat_positions(sr, &[], Bpm::new(120.0)).is_none());
        let beats = Beats::from_beat_positions(sr, &[pos(10.0)], Bpm::new(125.0)).unwrap();
        assert_eq!(beats.bpm().value(), 125.0);
    }
}
