//! Note names
//!
//! Pitch classes, scientific pitch notation (`C#5`, `Db5`, `H4`) and the
//! equal-tempered frequency of each pitch (A4 = 440 Hz).

use std::{fmt::Display, str::FromStr};
use thiserror::Error;

const SEMITONES: u8 = 12;

/// Errors when parsing a note name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotationError {
    /// The text is not of the form `<letter>[accidental]<octave>`.
    #[error("invalid note name `{0}`")]
    InvalidName(String),

    /// The octave puts the pitch outside the MIDI range.
    #[error("note `{0}` is outside the MIDI range 0..=127")]
    OutOfRange(String),
}

/// Twelve chromatic pitch classes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    /// C
    C,
    /// C sharp / D flat
    Cs,
    /// D
    D,
    /// D sharp / E flat
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    Fs,
    /// G
    G,
    /// G sharp / A flat
    Gs,
    /// A
    A,
    /// A sharp / B flat
    As,
    /// B
    B,
}

impl PitchClass {
    const ALL: [PitchClass; SEMITONES as usize] = [
        PitchClass::C,
        PitchClass::Cs,
        PitchClass::D,
        PitchClass::Ds,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Fs,
        PitchClass::G,
        PitchClass::Gs,
        PitchClass::A,
        PitchClass::As,
        PitchClass::B,
    ];

    /// Pitch class for a semitone offset above C (taken modulo 12).
    pub const fn from_semitone(idx: u8) -> PitchClass {
        Self::ALL[(idx % SEMITONES) as usize]
    }

    /// Semitones above C.
    pub const fn semitone(self) -> u8 {
        self as u8
    }

    /// Sharp spelling, e.g. `C#`.
    pub const fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }
}

impl Display for PitchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete pitch, stored as its MIDI note number.
///
/// Enharmonic spellings parse to the same value, so `"Db5" == "C#5"`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pitch(u8);

impl Pitch {
    /// Pitch from a MIDI note number (`None` above 127).
    pub const fn from_midi(midi: u8) -> Option<Pitch> {
        if midi > 127 {
            None
        } else {
            Some(Pitch(midi))
        }
    }

    /// Pitch from class and octave in scientific notation (C4 = MIDI 60).
    pub fn new(class: PitchClass, octave: i8) -> Option<Pitch> {
        let midi = (octave as i16 + 1) * SEMITONES as i16 + class.semitone() as i16;
        u8::try_from(midi).ok().and_then(Pitch::from_midi)
    }

    /// MIDI note number.
    pub const fn midi(self) -> u8 {
        self.0
    }

    /// Pitch class.
    pub const fn class(self) -> PitchClass {
        PitchClass::from_semitone(self.0)
    }

    /// Octave in scientific notation.
    pub const fn octave(self) -> i8 {
        (self.0 / SEMITONES) as i8 - 1
    }

    /// Equal-tempered frequency with A4 = 440 Hz.
    pub fn frequency(self) -> f32 {
        440.0 * 2f32.powf((self.0 as f32 - 69.0) / 12.0)
    }
}

impl Display for Pitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.class(), self.octave())
    }
}

impl FromStr for Pitch {
    type Err = NotationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || NotationError::InvalidName(raw.to_string());
        let text = raw.trim();
        let mut chars = text.chars();

        let base = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') | Some('H') => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str().trim_start();
        let mut accidental = rest.chars();
        let (shift, octave_text) = match accidental.next() {
            Some('#' | '♯') => (1i16, accidental.as_str()),
            Some('b' | '♭') => (-1i16, accidental.as_str()),
            _ => (0i16, rest),
        };

        let octave: i16 = octave_text.trim().parse().map_err(|_| invalid())?;
        octave
            .checked_add(1)
            .and_then(|o| o.checked_mul(SEMITONES as i16))
            .and_then(|m| m.checked_add(base + shift))
            .and_then(|midi| u8::try_from(midi).ok())
            .and_then(Pitch::from_midi)
            .ok_or_else(|| NotationError::OutOfRange(raw.to_string()))
    }
}
