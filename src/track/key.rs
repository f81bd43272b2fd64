//! Musical keys.
//!
//! Keys are stored as a pitch class plus mode. Text is accepted in
//! traditional notation (`C#m`, `Bb`, `F minor`) and in the numeric wheel
//! notation used by DJ software (`8A` = A minor, `8B` = C major).

use std::fmt;

use serde::{Deserialize, Serialize};

const PITCH_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyMode {
    Major,
    Minor,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChromaticKey {
    pitch_class: u8,
    mode: KeyMode,
}

impl ChromaticKey {
    pub fn new(pitch_class: u8, mode: KeyMode) -> Self {
        Self {
            pitch_class: pitch_class % 12,
            mode,
        }
    }

    pub fn pitch_class(self) -> u8 {
        self.pitch_class
    }

    pub fn mode(self) -> KeyMode {
        self.mode
    }

    /// Position on the key wheel, e.g. `(8, 'A')` for A minor.
    pub fn wheel_position(self) -> (u8, char) {
        // Walking the circle of fifths: +7 semitones per step, 7 * 7 = 49 = 1 mod 12.
        let (tonic, letter) = match self.mode {
            KeyMode::Major => (self.pitch_class, 'B'),
            KeyMode::Minor => ((self.pitch_class + 3) % 12, 'A'),
        };
        let steps = (u32::from(tonic) * 7) % 12;
        (((steps + 7) % 12 + 1) as u8, letter)
    }

    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Self::parse_wheel(text).or_else(|| Self::parse_traditional(text))
    }

    fn parse_wheel(text: &str) -> Option<Self> {
        let letter = text.chars().last()?.to_ascii_uppercase();
        let mode = match letter {
            'A' => KeyMode::Minor,
            'B' => KeyMode::Major,
            _ => return None,
        };
        let number: u32 = text[..text.len() - 1].parse().ok()?;
        if !(1..=12).contains(&number) {
            return None;
        }
        // 8B is C major; each step clockwise adds a fifth.
        let major_tonic = ((number + 12 - 8) * 7 % 12) as u8;
        let pitch_class = match mode {
            KeyMode::Major => major_tonic,
            KeyMode::Minor => (major_tonic + 9) % 12,
        };
        Some(Self::new(pitch_class, mode))
    }

    fn parse_traditional(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let base = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let mut rest = chars.as_str();
        let mut pitch: i32 = base;
        if let Some(r) = rest.strip_prefix(['#', '♯']) {
            pitch += 1;
            rest = r;
        } else if let Some(r) = rest.strip_prefix(['b', '♭']) {
            pitch -= 1;
            rest = r;
        }
        let mode = match rest.trim().to_ascii_lowercase().as_str() {
            "" | "maj" | "major" => KeyMode::Major,
            "m" | "min" | "minor" => KeyMode::Minor,
            _ => return None,
        };
        Some(Self::new(pitch.rem_euclid(12) as u8, mode))
    }
}

impl fmt::Display for ChromaticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = PITCH_NAMES[usize::from(self.pitch_class)];
        match self.mode {
            KeyMode::Major => write!(f, "{name}"),
            KeyMode::Minor => write!(f, "{name}m"),
        }
    }
}

/// Where the global key value came from.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySource {
    #[default]
    Unknown,
    FileMetadata,
    User,
    Analyzer,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keys {
    pub global: Option<ChromaticKey>,
    pub source: KeySource,
}

impl Keys {
    pub fn new(global: ChromaticKey, source: KeySource) -> Self {
        Self {
            global: Some(global),
            source,
        }
    }

    pub fn text(&self) -> String {
        self.global.map(|k| k.to_string()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pitch: u8, mode: KeyMode) -> Option<ChromaticKey> {
        Some(ChromaticKey::new(pitch, mode))
    }

    #[test]
    fn parse_traditional_notation() {
        assert_eq!(ChromaticKey::parse("C"), key(0, KeyMode::Major));
        assert_eq!(ChromaticKey::parse("C#m"), key(1, KeyMode::Minor));
        assert_eq!(ChromaticKey::parse("Bb"), key(10, KeyMode::Major));
        assert_eq!(ChromaticKey::parse(" f minor "), key(5, KeyMode::Minor));
        assert_eq!(ChromaticKey::parse("Cb"), key(11, KeyMode::Major));
        assert_eq!(ChromaticKey::parse("H"), None);
        assert_eq!(ChromaticKey::parse("Cx"), None);
        assert_eq!(ChromaticKey::parse(""), None);
    }

    #[test]
    fn parse_wheel_notation() {
        assert_eq!(ChromaticKey::parse("8B"), key(0, KeyMode::Major));
        assert_eq!(ChromaticKey::parse("8A"), key(9, KeyMode::Minor));
        assert_eq!(ChromaticKey::parse("9B"), key(7, KeyMode::Major));
        assert_eq!(ChromaticKey::parse("12a"), key(1, KeyMode::Minor));
        assert_eq!(ChromaticKey::parse("13A"), None);
    }

    #[test]
    fn wheel_position_round_trips_through_parse() {
        for pitch in 0..12 {
            for mode in [KeyMode::Major, KeyMode::Minor] {
                let key = ChromaticKey::new(pitch, mode);
                let (number, letter) = key.wheel_position();
                assert_eq!(ChromaticKey::parse(&format!("{number}{letter}")), Some(key));
            }
        }
    }

    #[test]
    fn display_uses_traditional_notation() {
        assert_eq!(ChromaticKey::new(1, KeyMode::Minor).to_string(), "Dbm");
        assert_eq!(Keys::default().text(), "");
    }
}
