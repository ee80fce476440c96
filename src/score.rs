//! Expected melody
//!
//! Score events, duration classes and the lookup resolving a duration class to
//! its nominal length.

use std::{fmt::Display, str::FromStr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    classifier::{NoteId, ReferenceNoteSet},
    notation::{NotationError, Pitch},
};

/// Errors when building a score.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// A duration name is not recognised.
    #[error("unknown duration class `{0}`")]
    UnknownDuration(String),

    /// A score event expects silence, which cannot be matched.
    #[error("score event {0} expects the silence label")]
    SilentEvent(usize),

    /// A pitch has no counterpart in the reference set.
    #[error("pitch {pitch} at score position {index} is not in the reference set")]
    UnknownPitch {
        /// Zero-based position in the score.
        index: usize,
        /// The unresolved pitch.
        pitch: Pitch,
    },

    /// A score line could not be parsed.
    #[error("line {line}: {msg}")]
    Syntax {
        /// One-based line number.
        line: usize,
        /// What went wrong.
        msg: String,
    },

    /// A note name could not be parsed.
    #[error(transparent)]
    Notation(#[from] NotationError),
}

/// Notated length of a score event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    /// 1/16
    Sixteenth,
    /// 1/8
    Eighth,
    /// 1/4
    Quarter,
    /// 1/2
    Half,
    /// 1/1
    Whole,
}

impl Display for DurationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DurationClass::Sixteenth => "16th",
            DurationClass::Eighth => "eighth",
            DurationClass::Quarter => "quarter",
            DurationClass::Half => "half",
            DurationClass::Whole => "whole",
        };
        f.write_str(name)
    }
}

impl FromStr for DurationClass {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "16th" | "sixteenth" => Ok(DurationClass::Sixteenth),
            "eighth" | "8th" => Ok(DurationClass::Eighth),
            "quarter" | "4th" => Ok(DurationClass::Quarter),
            "half" | "2nd" => Ok(DurationClass::Half),
            "whole" => Ok(DurationClass::Whole),
            _ => Err(ScoreError::UnknownDuration(s.to_string())),
        }
    }
}

/// Nominal duration of each class, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationTable {
    /// Sixteenth note.
    pub sixteenth_ms: u32,
    /// Eighth note.
    pub eighth_ms: u32,
    /// Quarter note.
    pub quarter_ms: u32,
    /// Half note.
    pub half_ms: u32,
    /// Whole note.
    pub whole_ms: u32,
}

impl DurationTable {
    /// Nominal length of `class`.
    pub fn nominal_ms(&self, class: DurationClass) -> u32 {
        match class {
            DurationClass::Sixteenth => self.sixteenth_ms,
            DurationClass::Eighth => self.eighth_ms,
            DurationClass::Quarter => self.quarter_ms,
            DurationClass::Half => self.half_ms,
            DurationClass::Whole => self.whole_ms,
        }
    }
}

impl Default for DurationTable {
    fn default() -> Self {
        DurationTable {
            sixteenth_ms: 120,
            eighth_ms: 240,
            quarter_ms: 450,
            half_ms: 900,
            whole_ms: 1800,
        }
    }
}

/// One expected note of the melody.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScoreEvent {
    /// Expected reference note.
    pub note: NoteId,
    /// Notated duration.
    pub duration: DurationClass,
}

/// The expected melody, consumed strictly left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    events: Vec<ScoreEvent>,
}

impl Score {
    /// Wrap an ordered list of events; silence cannot be an expected note.
    pub fn new(events: Vec<ScoreEvent>) -> Result<Self, ScoreError> {
        if let Some(index) = events.iter().position(|e| e.note.is_silence()) {
            return Err(ScoreError::SilentEvent(index));
        }
        Ok(Score { events })
    }

    /// Resolve `(pitch, duration)` pairs through the labels of `references`.
    pub fn from_pitches(
        references: &ReferenceNoteSet,
        notes: &[(Pitch, DurationClass)],
    ) -> Result<Self, ScoreError> {
        let events = notes
            .iter()
            .enumerate()
            .map(|(index, &(pitch, duration))| {
                references
                    .id_for_pitch(pitch)
                    .map(|note| ScoreEvent { note, duration })
                    .ok_or(ScoreError::UnknownPitch { index, pitch })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Score::new(events)
    }

    /// Parse one `<pitch> [duration]` pair per line; `#` starts a comment and
    /// the duration defaults to a quarter.
    pub fn parse_pitches(text: &str) -> Result<Vec<(Pitch, DurationClass)>, ScoreError> {
        let mut notes = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let syntax = |msg: String| ScoreError::Syntax { line: idx + 1, msg };
            let mut fields = line.split_whitespace();
            let pitch: Pitch = match fields.next() {
                Some(name) => name.parse().map_err(|e: NotationError| syntax(e.to_string()))?,
                None => continue,
            };
            let duration = match fields.next() {
                Some(d) => d.parse().map_err(|e: ScoreError| syntax(e.to_string()))?,
                None => DurationClass::Quarter,
            };
            if let Some(extra) = fields.next() {
                return Err(syntax(format!("unexpected `{extra}`")));
            }
            notes.push((pitch, duration));
        }
        Ok(notes)
    }

    /// The events in order.
    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` for an empty score.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event at `index`.
    pub fn get(&self, index: usize) -> Option<&ScoreEvent> {
        self.events.get(index)
    }
}

/// Cut a trailing `#` comment; a `#` inside a note name such as `C#5` is kept.
fn strip_comment(line: &str) -> &str {
    let mut after_space = true;
    for (i, c) in line.char_indices() {
        if c == '#' && after_space {
            return &line[..i];
        }
        after_space = c.is_whitespace();
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_score() {
        let notes = Score::parse_pitches("# intro\nC#5 quarter\nD5 eighth # pickup\n\nEb5\n").unwrap();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].0.to_string(), "C#5");
        assert_eq!(notes[1].1, DurationClass::Eighth);
        assert_eq!(notes[2], ("D#5".parse().unwrap(), DurationClass::Quarter));
    }

    #[test]
    fn reports_line_numbers() {
        let err = Score::parse_pitches("C5 quarter\nC5 quaver\n").unwrap_err();
        assert!(matches!(err, ScoreError::Syntax { line: 2, .. }));
        let err = Score::parse_pitches("C5 half extra\n").unwrap_err();
        assert!(matches!(err, ScoreError::Syntax { line: 1, .. }));
    }

    #[test]
    fn resolves_against_reference_set() {
        let set = ReferenceNoteSet::equal_tempered("C4".parse().unwrap(), "B6".parse().unwrap()).unwrap();
        let notes = Score::parse_pitches("A4 half\nC7 half\n").unwrap();
        assert!(matches!(
            Score::from_pitches(&set, &notes),
            Err(ScoreError::UnknownPitch { index: 1, .. })
        ));
        let score = Score::from_pitches(&set, &notes[..1]).unwrap();
        assert_eq!(score.events()[0], ScoreEvent { note: NoteId(10), duration: DurationClass::Half });
    }

    #[test]
    fn silence_is_not_a_score_event() {
        let events = vec![ScoreEvent { note: NoteId::SILENCE, duration: DurationClass::Quarter }];
        assert!(matches!(Score::new(events), Err(ScoreError::SilentEvent(0))));
    }

    #[test]
    fn default_durations() {
        let table = DurationTable::default();
        assert_eq!(table.nominal_ms(DurationClass::Eighth), 240);
        assert_eq!(table.nominal_ms(DurationClass::Quarter), 450);
        assert_eq!(table.nominal_ms(DurationClass::Half), 900);
    }
}
