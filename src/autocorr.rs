//! Autocorrelation Pitch Estimator
//!
//! Time-domain fundamental estimate from the normalized autocorrelation of a
//! raw frame. Slower than the dominant-bin method (O(N * max_lag)) but much less
//! fooled by strong low partials, which is why the score follower uses it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned when configuring the estimator.
#[derive(Debug, Error)]
pub enum AutocorrError {
    /// The frequency search range is empty or not positive.
    #[error("frequency range {min}..={max} Hz is invalid")]
    InvalidRange {
        /// Lower bound in Hz.
        min: f32,
        /// Upper bound in Hz.
        max: f32,
    },

    /// The correlation threshold must lie in `(0, 1)`.
    #[error("correlation threshold {0} must be in (0, 1)")]
    InvalidThreshold(f32),
}

/// Parameters of the autocorrelation search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutocorrConfig {
    /// Frames shorter than this are rejected.
    pub min_frame_len: usize,
    /// Minimum zero-mean RMS for a frame to be considered pitched.
    pub min_rms: f32,
    /// Lowest accepted fundamental in Hz.
    pub min_frequency: f32,
    /// Highest accepted fundamental in Hz.
    pub max_frequency: f32,
    /// Normalized correlation a peak must exceed.
    pub correlation_threshold: f32,
}

impl Default for AutocorrConfig {
    fn default() -> Self {
        AutocorrConfig {
            min_frame_len: 64,
            min_rms: 250.0 / 32768.0,
            min_frequency: 120.0,
            max_frequency: 2600.0,
            correlation_threshold: 0.55,
        }
    }
}

/// Normalized-autocorrelation pitch estimator.
#[derive(Debug, Clone)]
pub struct AutocorrEstimator {
    config: AutocorrConfig,
    centered: Vec<f32>,
    correlation: Vec<f32>,
}

impl AutocorrEstimator {
    /// Validate `config` and create an estimator.
    pub fn new(config: AutocorrConfig) -> Result<Self, AutocorrError> {
        let AutocorrConfig {
            min_frequency: min,
            max_frequency: max,
            correlation_threshold,
            ..
        } = config;
        if !(min > 0.0 && max > min && max.is_finite()) {
            return Err(AutocorrError::InvalidRange { min, max });
        }
        if !(correlation_threshold > 0.0 && correlation_threshold < 1.0) {
            return Err(AutocorrError::InvalidThreshold(correlation_threshold));
        }
        Ok(AutocorrEstimator {
            config,
            centered: Vec::new(),
            correlation: Vec::new(),
        })
    }

    /// The estimator's parameters.
    pub fn config(&self) -> &AutocorrConfig {
        &self.config
    }

    /// Lag search bounds `(min_lag, max_lag)` for a frame of `len` samples.
    pub fn lag_bounds(&self, len: usize, sample_rate: u32) -> (usize, usize) {
        let rate = sample_rate as f32;
        let min_lag = ((rate / self.config.max_frequency) as usize).max(4);
        let max_lag = (len / 2).min((rate / self.config.min_frequency) as usize);
        (min_lag, max_lag)
    }

    /// Fundamental frequency of `frame` in Hz, or `None` when no pitch is found.
    ///
    /// Returns the first lag (ascending) whose normalized correlation exceeds
    /// the threshold and is strictly greater than both neighbouring lags.
    pub fn estimate(&mut self, frame: &[f32], sample_rate: u32) -> Option<f32> {
        let len = frame.len();
        if len < self.config.min_frame_len || len == 0 {
            return None;
        }

        let mean = frame.iter().map(|&s| s as f64).sum::<f64>() / len as f64;
        self.centered.clear();
        self.centered.extend(frame.iter().map(|&s| (s as f64 - mean) as f32));

        let energy: f64 = self.centered.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (energy / len as f64).sqrt() as f32;
        if rms < self.config.min_rms || rms <= 0.0 {
            return None;
        }

        let (min_lag, max_lag) = self.lag_bounds(len, sample_rate);
        if max_lag <= min_lag {
            return None;
        }

        self.correlation.clear();
        self.correlation.resize(max_lag + 1, 0.0);
        for lag in min_lag..=max_lag {
            self.correlation[lag] = normalized_correlation(&self.centered, lag);
        }

        let threshold = self.config.correlation_threshold;
        for lag in (min_lag + 1)..max_lag {
            let c = self.correlation[lag];
            if c <= threshold {
                continue;
            }
            if c > self.correlation[lag - 1] && c > self.correlation[lag + 1] {
                let hz = sample_rate as f32 / lag as f32;
                if hz >= self.config.min_frequency && hz <= self.config.max_frequency {
                    return Some(hz);
                }
            }
        }
        None
    }
}

/// `sum(a*b) / sqrt(sum(a^2) * sum(b^2))` over the overlap of `x` and `x` delayed by `lag`.
fn normalized_correlation(x: &[f32], lag: usize) -> f32 {
    let mut cross = 0.0f64;
    let mut e1 = 0.0f64;
    let mut e2 = 0.0f64;
    for (&a, &b) in x.iter().zip(&x[lag..]) {
        let (a, b) = (a as f64, b as f64);
        cross += a * b;
        e1 += a * a;
        e2 += b * b;
    }
    if e1 > 0.0 && e2 > 0.0 {
        (cross / (e1 * e2).sqrt()) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(hz: f32, rate: u32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * PI * hz * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn lag_bounds_follow_frequency_range() {
        let est = AutocorrEstimator::new(AutocorrConfig::default()).unwrap();
        // 22050 / 2600 = 8.48, 22050 / 120 = 183.75
        assert_eq!(est.lag_bounds(1024, 22_050), (8, 183));
        assert_eq!(est.lag_bounds(256, 22_050), (8, 128));
    }

    #[test]
    fn finds_pure_tone() {
        let mut est = AutocorrEstimator::new(AutocorrConfig::default()).unwrap();
        let frame = sine(441.0, 22_050, 1024, 0.4);
        let hz = est.estimate(&frame, 22_050).unwrap();
        assert!((hz - 441.0).abs() < 1.0, "got {hz}");
    }

    #[test]
    fn rejects_quiet_and_short_frames() {
        let mut est = AutocorrEstimator::new(AutocorrConfig::default()).unwrap();
        assert_eq!(est.estimate(&sine(440.0, 22_050, 1024, 0.001), 22_050), None);
        assert_eq!(est.estimate(&sine(440.0, 22_050, 32, 0.5), 22_050), None);
        assert_eq!(est.estimate(&[0.3; 1024], 22_050), None);
    }

    #[test]
    fn correlation_of_periodic_signal() {
        let x = sine(100.0, 1000, 200, 1.0);
        assert!((normalized_correlation(&x, 10) - 1.0).abs() < 1e-4);
        assert!((normalized_correlation(&x, 5) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn invalid_configuration() {
        let bad_range = AutocorrConfig {
            min_frequency: 500.0,
            max_frequency: 100.0,
            ..AutocorrConfig::default()
        };
        assert!(matches!(AutocorrEstimator::new(bad_range), Err(AutocorrError::InvalidRange { .. })));
        let bad_threshold = AutocorrConfig {
            correlation_threshold: 1.5,
            ..AutocorrConfig::default()
        };
        assert!(matches!(AutocorrEstimator::new(bad_threshold), Err(AutocorrError::InvalidThreshold(_))));
    }
}
