use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::signal::{Bitrate, SignalInfo};

/// Properties of an encoded audio stream as reported by a decoder or by file
/// tags.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub signal: SignalInfo,
    pub bitrate: Bitrate,
    pub duration: Duration,
}

impl StreamInfo {
    pub fn new(signal: SignalInfo, bitrate: Bitrate, duration: Duration) -> Self {
        Self {
            signal,
            bitrate,
            duration,
        }
    }

    pub fn has_duration(&self) -> bool {
        !self.duration.is_zero()
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {:.3}s",
            self.signal,
            self.bitrate,
            self.duration.as_secs_f64()
        )
    }
}

/// Format a duration as `m:ss` or `h:mm:ss`, optionally with centiseconds.
pub fn format_duration(duration: Duration, with_centis: bool) -> String {
    let total = duration.as_secs();
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    let mut text = if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    };
    if with_centis {
        text.push_str(&format!(".{:02}", duration.subsec_millis() / 10));
    }
    text
}
