//! Spectral Frame Analyzer
//!
//! Per-frame energy gating and dominant-bin pitch estimation on top of the
//! [`TransformEngine`](crate::transform::TransformEngine).

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    classifier::PitchEstimate,
    signal::{Frame, SampleBuffer},
    transform::{TransformCache, TransformEngine, TransformError},
};

/// Errors returned by the spectral analyzer.
#[derive(Debug, Error)]
pub enum SpectralError {
    /// The transform could not be built or run.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The hop must be between 1 and the frame size.
    #[error("hop size {hop_size} must be in 1..={frame_size}")]
    InvalidHop {
        /// Configured hop.
        hop_size: usize,
        /// Configured frame size.
        frame_size: usize,
    },

    /// The recording is shorter than a single frame.
    #[error("recording of {available} samples is shorter than one {frame_size}-sample frame")]
    BufferTooShort {
        /// Configured frame size.
        frame_size: usize,
        /// Samples in the recording.
        available: usize,
    },

    /// The silence gate parameters are out of range.
    #[error("invalid silence gate: {0}")]
    InvalidGate(String),
}

/// How the energy threshold separating silence from pitched frames is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SilenceGate {
    /// A constant RMS threshold.
    Fixed {
        /// Frames with RMS below this value are silent.
        threshold: f32,
    },
    /// A threshold derived from the quiet end of the recording's RMS distribution.
    Adaptive {
        /// Fraction (0..=1) selecting the noise-floor RMS among sorted frame RMS values.
        percentile: f32,
        /// Multiplier applied to the noise floor.
        scale: f32,
        /// Lower bound for the resulting threshold.
        floor: f32,
    },
}

impl SilenceGate {
    /// Adaptive gate with percentile 0.2, scale 1.35 and floor 0.004.
    pub fn adaptive() -> Self {
        SilenceGate::Adaptive {
            percentile: 0.2,
            scale: 1.35,
            floor: 0.004,
        }
    }

    /// Resolve the threshold for a recording whose frame RMS values are `rms`.
    pub fn threshold(&self, rms: &[f32]) -> f32 {
        match *self {
            SilenceGate::Fixed { threshold } => threshold,
            SilenceGate::Adaptive {
                percentile,
                scale,
                floor,
            } => {
                if rms.is_empty() {
                    return floor;
                }
                let mut sorted = rms.to_vec();
                sorted.sort_by(f32::total_cmp);
                let rank = ((sorted.len() as f32 * percentile) as usize).saturating_sub(1);
                let noise_floor = sorted[rank.min(sorted.len() - 1)];
                (noise_floor * scale).max(floor)
            }
        }
    }

    fn validate(&self) -> Result<(), SpectralError> {
        match *self {
            SilenceGate::Fixed { threshold } if !(threshold >= 0.0 && threshold.is_finite()) => Err(
                SpectralError::InvalidGate(format!("threshold {threshold} must be finite and >= 0")),
            ),
            SilenceGate::Adaptive { percentile, .. } if !(0.0..=1.0).contains(&percentile) => Err(
                SpectralError::InvalidGate(format!("percentile {percentile} must be in 0..=1")),
            ),
            SilenceGate::Adaptive { scale, floor, .. }
                if !(scale >= 0.0 && floor >= 0.0 && scale.is_finite() && floor.is_finite()) =>
            {
                Err(SpectralError::InvalidGate(format!(
                    "scale {scale} and floor {floor} must be finite and >= 0"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Default for SilenceGate {
    fn default() -> Self {
        SilenceGate::Fixed { threshold: 0.01 }
    }
}

/// Frame geometry and gating for spectral analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Samples per frame; must be a power of two.
    pub frame_size: usize,
    /// Samples between consecutive frame starts.
    pub hop_size: usize,
    /// Silence gate.
    pub silence: SilenceGate,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        SpectralConfig {
            frame_size: 4096,
            hop_size: 1024,
            silence: SilenceGate::default(),
        }
    }
}

/// The strongest non-DC bin of a frame's spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Bin index in `1..frame_size/2`.
    pub bin: usize,
    /// `bin * sample_rate / frame_size`, in Hz.
    pub frequency: f32,
    /// Magnitude of the bin.
    pub magnitude: f32,
}

/// Result of analysing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAnalysis {
    /// Frame index.
    pub index: usize,
    /// RMS of the raw samples.
    pub rms: f32,
    /// Dominant peak, or `None` for a gated (silent) frame.
    pub peak: Option<SpectralPeak>,
}

impl FrameAnalysis {
    /// The frame's pitch estimate for classification.
    pub fn estimate(&self) -> PitchEstimate {
        match self.peak {
            Some(peak) => PitchEstimate::Bin {
                bin: peak.bin,
                frequency: peak.frequency,
            },
            None => PitchEstimate::Silent,
        }
    }
}

/// Output of a whole-recording pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralAnalysis {
    /// Resolved silence threshold.
    pub threshold: f32,
    /// One entry per frame, in order.
    pub frames: Vec<FrameAnalysis>,
}

/// Builder for a [`SpectralAnalyzer`].
pub struct SpectralAnalyzerBuilder {
    config: SpectralConfig,
}

impl SpectralAnalyzerBuilder {
    /// Start with defaults: frame_size = 4096, hop_size = 1024, fixed gate 0.01.
    pub fn new() -> Self {
        SpectralAnalyzerBuilder {
            config: SpectralConfig::default(),
        }
    }

    /// Replace every parameter at once.
    pub fn config(mut self, config: SpectralConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the frame size (power of two).
    pub fn frame_size(mut self, size: usize) -> Self {
        self.config.frame_size = size;
        self
    }

    /// Set the hop between frames.
    pub fn hop_size(mut self, hop: usize) -> Self {
        self.config.hop_size = hop;
        self
    }

    /// Set the silence gate.
    pub fn silence_gate(mut self, gate: SilenceGate) -> Self {
        self.config.silence = gate;
        self
    }

    /// Finalize with freshly built transform tables.
    pub fn build(self) -> Result<SpectralAnalyzer, SpectralError> {
        self.build_with_cache(&mut TransformCache::new())
    }

    /// Finalize, reusing tables from `cache` when the frame size is already known.
    pub fn build_with_cache(self, cache: &mut TransformCache) -> Result<SpectralAnalyzer, SpectralError> {
        let config = self.config;
        if config.hop_size == 0 || config.hop_size > config.frame_size {
            return Err(SpectralError::InvalidHop {
                hop_size: config.hop_size,
                frame_size: config.frame_size,
            });
        }
        config.silence.validate()?;
        let engine = cache.get_or_build(config.frame_size)?;
        Ok(SpectralAnalyzer { config, engine })
    }
}

impl Default for SpectralAnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Energy-gated dominant-frequency estimator.
#[derive(Debug, Clone)]
pub struct SpectralAnalyzer {
    config: SpectralConfig,
    engine: Arc<TransformEngine>,
}

impl SpectralAnalyzer {
    /// Start customizing with a builder.
    pub fn builder() -> SpectralAnalyzerBuilder {
        SpectralAnalyzerBuilder::new()
    }

    /// The analyzer's parameters.
    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Analyse one frame against an already resolved silence `threshold`.
    ///
    /// Silent frames never reach the transform.
    pub fn analyze_frame(
        &self,
        frame: &Frame<'_>,
        sample_rate: u32,
        threshold: f32,
    ) -> Result<FrameAnalysis, SpectralError> {
        let rms = frame.rms();
        let peak = if is_silent(rms, threshold) {
            None
        } else {
            self.dominant_peak(frame.samples, sample_rate)?
        };
        Ok(FrameAnalysis {
            index: frame.index,
            rms,
            peak,
        })
    }

    /// Strongest bin in `[1, frame_size/2)`, first one on equal magnitudes.
    pub fn dominant_peak(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Option<SpectralPeak>, SpectralError> {
        let magnitudes = self.engine.spectrum(samples)?;
        let mut best: Option<(usize, f32)> = None;
        for (bin, &mag) in magnitudes.iter().enumerate().skip(1) {
            match best {
                Some((_, best_mag)) if mag <= best_mag => {}
                _ => best = Some((bin, mag)),
            }
        }
        let size = self.config.frame_size as f32;
        Ok(best.map(|(bin, magnitude)| SpectralPeak {
            bin,
            frequency: bin as f32 * sample_rate as f32 / size,
            magnitude,
        }))
    }

    /// Analyse every frame of `buffer`.
    ///
    /// Frame energies are measured first so an adaptive gate can see the whole
    /// recording before any frame is classified.
    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<SpectralAnalysis, SpectralError> {
        let SpectralConfig {
            frame_size,
            hop_size,
            ..
        } = self.config;
        if buffer.len() < frame_size {
            return Err(SpectralError::BufferTooShort {
                frame_size,
                available: buffer.len(),
            });
        }

        let rms: Vec<f32> = buffer.frames(frame_size, hop_size).map(|f| f.rms()).collect();
        let threshold = self.config.silence.threshold(&rms);

        let frames = buffer
            .frames(frame_size, hop_size)
            .map(|frame| self.analyze_frame(&frame, buffer.sample_rate(), threshold))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "spectral pass: {} frames, silence threshold {:.5}, {} gated",
            frames.len(),
            threshold,
            frames.iter().filter(|f| f.peak.is_none()).count()
        );

        Ok(SpectralAnalysis { threshold, frames })
    }
}

/// A frame with no energy is silent under every threshold.
#[inline]
fn is_silent(rms: f32, threshold: f32) -> bool {
    rms <= 0.0 || rms < threshold
}
