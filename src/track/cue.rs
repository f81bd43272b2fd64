//! Cue markers.
//!
//! A `Cue` is shared between the owning track and anyone who asked for it.
//! Holders may move or relabel it; the owning track is told through the
//! callback it attached and marks itself dirty. Type and hot cue index are
//! only ever changed by the owner.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::audio::{FramePos, SignalInfo};

use super::metadata::RgbColor;

/// Lowest valid hot cue slot.
pub const FIRST_HOT_CUE_INDEX: i32 = 0;

pub type CuePointer = Arc<Cue>;

/// Invoked after a holder modified a cue. Never invoked for modifications made
/// by the owner itself.
pub type CueUpdateCallback = Arc<dyn Fn(&Cue) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CueType {
    HotCue,
    MainCue,
    Beat,
    Loop,
    Jump,
    Intro,
    Outro,
    AudibleSound,
}

/// Position information of a cue in milliseconds, independent of any sample
/// rate. This is what tag formats store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueInfo {
    pub cue_type: CueType,
    pub start_position_millis: Option<f64>,
    pub end_position_millis: Option<f64>,
    #[serde(default)]
    pub hot_cue_index: Option<i32>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub color: Option<RgbColor>,
}

impl CueInfo {
    pub fn new(cue_type: CueType, start_position_millis: Option<f64>) -> Self {
        Self {
            cue_type,
            start_position_millis,
            end_position_millis: None,
            hot_cue_index: None,
            label: String::new(),
            color: None,
        }
    }

    pub fn with_hot_cue_index(mut self, index: i32) -> Self {
        self.hot_cue_index = Some(index);
        self
    }

    pub fn with_end_position_millis(mut self, millis: f64) -> Self {
        self.end_position_millis = Some(millis);
        self
    }
}

#[derive(Debug, Clone)]
struct CueState {
    id: Option<i64>,
    cue_type: CueType,
    hot_cue_index: Option<i32>,
    start_position: Option<FramePos>,
    end_position: Option<FramePos>,
    label: String,
    color: Option<RgbColor>,
}

pub struct Cue {
    state: Mutex<CueState>,
    on_update: Mutex<Option<CueUpdateCallback>>,
}

impl fmt::Debug for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cue")
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Cue {
    /// Only valid argument combinations reach this constructor; see
    /// `Track::create_and_add_cue`.
    pub(crate) fn new(
        cue_type: CueType,
        hot_cue_index: Option<i32>,
        start_position: Option<FramePos>,
        end_position: Option<FramePos>,
    ) -> CuePointer {
        Arc::new(Self {
            state: Mutex::new(CueState {
                id: None,
                cue_type,
                hot_cue_index,
                start_position,
                end_position,
                label: String::new(),
                color: None,
            }),
            on_update: Mutex::new(None),
        })
    }

    /// Build a cue from imported position info.
    pub fn from_cue_info(info: &CueInfo, signal: &SignalInfo) -> CuePointer {
        let to_frames =
            |millis: Option<f64>| millis.and_then(|ms| FramePos::new(signal.millis_to_frames(ms)));
        let hot_cue_index = info.hot_cue_index.filter(|i| *i >= FIRST_HOT_CUE_INDEX);
        let cue = Self::new(
            info.cue_type,
            hot_cue_index,
            to_frames(info.start_position_millis),
            to_frames(info.end_position_millis),
        );
        {
            let mut state = cue.state.lock();
            state.label = info.label.trim().to_string();
            state.color = info.color;
        }
        cue
    }

    pub fn to_cue_info(&self, signal: &SignalInfo) -> CueInfo {
        let state = self.state.lock();
        let to_millis = |pos: Option<FramePos>| pos.map(|p| signal.frames_to_millis(p.value()));
        CueInfo {
            cue_type: state.cue_type,
            start_position_millis: to_millis(state.start_position),
            end_position_millis: to_millis(state.end_position),
            hot_cue_index: state.hot_cue_index,
            label: state.label.clone(),
            color: state.color,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.state.lock().id
    }

    /// Assigned by the persistence layer; does not count as a modification.
    pub fn set_id(&self, id: Option<i64>) {
        self.state.lock().id = id;
    }

    pub fn cue_type(&self) -> CueType {
        self.state.lock().cue_type
    }

    pub fn hot_cue_index(&self) -> Option<i32> {
        self.state.lock().hot_cue_index
    }

    pub fn position(&self) -> Option<FramePos> {
        self.state.lock().start_position
    }

    pub fn end_position(&self) -> Option<FramePos> {
        self.state.lock().end_position
    }

    pub fn length_frames(&self) -> Option<f64> {
        let state = self.state.lock();
        match (state.start_position, state.end_position) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        self.state.lock().label.clone()
    }

    pub fn color(&self) -> Option<RgbColor> {
        self.state.lock().color
    }

    pub fn set_start_position(&self, position: Option<FramePos>) {
        if self.set_start_position_silently(position) {
            self.notify_owner();
        }
    }

    pub fn set_end_position(&self, position: Option<FramePos>) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.end_position != position;
            state.end_position = position;
            changed
        };
        if changed {
            self.notify_owner();
        }
    }

    pub fn set_label(&self, label: &str) {
        let changed = {
            let mut state = self.state.lock();
            let label = label.trim();
            let changed = state.label != label;
            if changed {
                state.label = label.to_string();
            }
            changed
        };
        if changed {
            self.notify_owner();
        }
    }

    pub fn set_color(&self, color: Option<RgbColor>) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.color != color;
            state.color = color;
            changed
        };
        if changed {
            self.notify_owner();
        }
    }

    pub fn shift_position_frames(&self, frames: f64) {
        if self.shift_position_frames_silently(frames) {
            self.notify_owner();
        }
    }

    // Owner-side mutators. The owner calls these while holding its own lock,
    // so they must not call back into it.

    pub(crate) fn set_start_position_silently(&self, position: Option<FramePos>) -> bool {
        let mut state = self.state.lock();
        let changed = state.start_position != position;
        state.start_position = position;
        changed
    }

    pub(crate) fn shift_position_frames_silently(&self, frames: f64) -> bool {
        if frames == 0.0 {
            return false;
        }
        let mut state = self.state.lock();
        state.start_position = state.start_position.map(|p| p + frames);
        state.end_position = state.end_position.map(|p| p + frames);
        true
    }

    pub(crate) fn attach(&self, callback: CueUpdateCallback) {
        *self.on_update.lock() = Some(callback);
    }

    pub(crate) fn detach(&self) {
        *self.on_update.lock() = None;
    }

    fn notify_owner(&self) {
        // Clone first so the callback runs without any cue lock held.
        let callback = self.on_update.lock().clone();
        if let Some(callback) = callback {
            callback(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ChannelCount, SampleRate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signal() -> SignalInfo {
        SignalInfo::new(ChannelCount::new(2), SampleRate::new(44_100))
    }

    #[test]
    fn cue_info_converts_millis_to_frames_and_back() {
        let info = CueInfo::new(CueType::HotCue, Some(1000.0))
            .with_hot_cue_index(3)
            .with_end_position_millis(2000.0);
        let cue = Cue::from_cue_info(&info, &signal());
        assert_eq!(cue.position(), FramePos::new(44_100.0));
        assert_eq!(cue.end_position(), FramePos::new(88_200.0));
        assert_eq!(cue.hot_cue_index(), Some(3));
        assert_eq!(cue.length_frames(), Some(44_100.0));
        assert_eq!(cue.to_cue_info(&signal()), info);
    }

    #[test]
    fn holder_updates_notify_the_owner_once_per_change() {
        let cue = Cue::new(CueType::HotCue, Some(0), FramePos::new(10.0), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        cue.attach(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        cue.set_start_position(FramePos::new(20.0));
        cue.set_start_position(FramePos::new(20.0));
        cue.set_label("  Drop ");
        assert_eq!(cue.label(), "Drop");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cue.detach();
        cue.set_start_position(FramePos::new(30.0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn silent_mutators_skip_the_owner_callback() {
        let cue = Cue::new(
            CueType::Loop,
            None,
            FramePos::new(100.0),
            FramePos::new(200.0),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        cue.attach(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(cue.shift_position_frames_silently(50.0));
        assert_eq!(cue.position(), FramePos::new(150.0));
        assert_eq!(cue.end_position(), FramePos::new(250.0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
