//! TOML settings
//!
//! Every section is optional; missing sections and keys fall back to the
//! component defaults.
//!
//! ```toml
//! [spectral]
//! frame_size = 4096
//! hop_size = 1024
//! silence = { mode = "adaptive", percentile = 0.2, scale = 1.35, floor = 0.004 }
//!
//! [segment]
//! radius = 2
//! min_duration_secs = 0.12
//!
//! [follow.hold]
//! floor_ms = 110
//! fraction = 0.45
//! ```

use std::path::Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    classifier::{ClassifierError, ReferenceNoteSet},
    follower::FollowConfig,
    notation::{NotationError, Pitch},
    segment::SegmentConfig,
    spectral::SpectralConfig,
};

/// Errors from loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// The settings are not valid TOML for [`Settings`].
    #[error("invalid settings: {0}")]
    Toml(#[from] toml::de::Error),

    /// A pitch in the reference range does not parse.
    #[error(transparent)]
    Notation(#[from] NotationError),

    /// The reference range produced no notes.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// How the reference note set is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Loudest voiced frames kept per reference recording (at least this many).
    pub min_kept_frames: usize,
    /// Lowest note of the equal-tempered fallback set.
    pub low: String,
    /// Highest note of the equal-tempered fallback set.
    pub high: String,
}

impl ReferenceConfig {
    /// Equal-tempered reference set spanning `low..=high`.
    pub fn equal_tempered(&self) -> Result<ReferenceNoteSet, ConfigError> {
        let low: Pitch = self.low.parse()?;
        let high: Pitch = self.high.parse()?;
        Ok(ReferenceNoteSet::equal_tempered(low, high)?)
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        ReferenceConfig {
            min_kept_frames: 10,
            low: "C4".to_string(),
            high: "B6".to_string(),
        }
    }
}

/// All tunables of the recognizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Spectral frame analysis.
    pub spectral: SpectralConfig,
    /// Smoothing and segmentation.
    pub segment: SegmentConfig,
    /// Reference set construction.
    pub reference: ReferenceConfig,
    /// Score following.
    pub follow: FollowConfig,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML settings file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&text)?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SilenceGate;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [spectral]
            hop_size = 512
            silence = { mode = "adaptive", percentile = 0.2, scale = 1.35, floor = 0.004 }

            [follow.hold]
            floor_ms = 90
            "#,
        )
        .unwrap();
        assert_eq!(settings.spectral.frame_size, 4096);
        assert_eq!(settings.spectral.hop_size, 512);
        assert_eq!(settings.spectral.silence, SilenceGate::adaptive());
        assert_eq!(settings.follow.hold.floor_ms, 90);
        assert_eq!(settings.follow.hold.fraction, 0.45);
        assert_eq!(settings.follow.frame_size, 1024);
        assert_eq!(settings.segment, SegmentConfig::default());
    }

    #[test]
    fn rejects_bad_types() {
        assert!(matches!(
            Settings::from_toml_str("[segment]\nradius = \"wide\"\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn reference_range() {
        let set = ReferenceConfig::default().equal_tempered().unwrap();
        assert_eq!(set.len(), 36);
        let bad = ReferenceConfig {
            low: "X9".to_string(),
            ..ReferenceConfig::default()
        };
        assert!(matches!(bad.equal_tempered(), Err(ConfigError::Notation(_))));
    }
}
