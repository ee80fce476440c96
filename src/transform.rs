//! Transform Engine
//!
//! Fixed-size radix-2 FFT over real frames with every table precomputed once
//! per frame size: bit-reversal permutation, per-stage twiddle factors and a
//! Hann window. Engines are immutable after construction and can be shared
//! across analyses (and threads) through [`TransformCache`].

use std::{
    collections::HashMap,
    f64::consts::PI,
    sync::Arc,
};
use rustfft::num_complex::Complex;
use thiserror::Error;

/// Errors returned by the Transform Engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The requested transform size is not a power of two (or is below 2).
    #[error("transform size {0} is not a power of two")]
    NotPowerOfTwo(usize),

    /// A frame of the wrong length was handed to the engine.
    #[error("expected frame of length {expected}, got {got}")]
    FrameLength {
        /// The engine's transform size.
        expected: usize,
        /// The length of the frame received.
        got: usize,
    },

    /// The requested frame reaches past the end of the sample buffer.
    #[error("frame of {frame_size} samples at offset {offset} exceeds buffer of {available}")]
    OutOfBounds {
        /// Requested start offset.
        offset: usize,
        /// The engine's transform size.
        frame_size: usize,
        /// Number of samples in the buffer.
        available: usize,
    },
}

/// Precomputed radix-2 transform for one frame size.
#[derive(Debug)]
pub struct TransformEngine {
    size: usize,
    bit_reverse: Vec<usize>,
    /// Twiddles for stage sizes 2, 4, ..., `size`; stage `s` holds `2^s / 2` factors.
    twiddles: Vec<Vec<Complex<f64>>>,
    window: Vec<f64>,
}

impl TransformEngine {
    /// Build the tables for transforms of `size` samples.
    pub fn new(size: usize) -> Result<Self, TransformError> {
        if size < 2 || !size.is_power_of_two() {
            return Err(TransformError::NotPowerOfTwo(size));
        }
        let bits = size.trailing_zeros();

        let bit_reverse: Vec<usize> = (0..size).map(|i| reverse_bits(i, bits)).collect();

        let mut twiddles: Vec<Vec<Complex<f64>>> = Vec::with_capacity(bits as usize);
        let mut stage = 2;
        while stage <= size {
            let half = stage / 2;
            let step = -2.0 * PI / stage as f64;
            twiddles.push(
                (0..half)
                    .map(|j| {
                        let angle = j as f64 * step;
                        Complex::new(angle.cos(), angle.sin())
                    })
                    .collect(),
            );
            stage <<= 1;
        }

        let denom = (size - 1) as f64;
        let window: Vec<f64> = (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos())
            .collect();

        Ok(TransformEngine {
            size,
            bit_reverse,
            twiddles,
            window,
        })
    }

    /// Transform size N.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of magnitude bins produced per frame (N/2).
    pub fn bins(&self) -> usize {
        self.size / 2
    }

    /// The Hann window applied before the transform.
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Magnitudes of bins `0..N/2` for a frame of exactly N raw samples.
    pub fn spectrum(&self, frame: &[f32]) -> Result<Vec<f32>, TransformError> {
        if frame.len() != self.size {
            return Err(TransformError::FrameLength {
                expected: self.size,
                got: frame.len(),
            });
        }

        let mut buffer: Vec<Complex<f64>> = self
            .bit_reverse
            .iter()
            .map(|&src| Complex::new(frame[src] as f64 * self.window[src], 0.0))
            .collect();

        for (stage, table) in self.twiddles.iter().enumerate() {
            let half = 1usize << stage;
            let block = half << 1;
            for base in (0..self.size).step_by(block) {
                for (j, tw) in table.iter().enumerate() {
                    let even = base + j;
                    let odd = even + half;
                    let t = *tw * buffer[odd];
                    buffer[odd] = buffer[even] - t;
                    buffer[even] += t;
                }
            }
        }

        Ok(buffer[..self.bins()].iter().map(|c| c.norm() as f32).collect())
    }

    /// Magnitudes for the frame of N samples starting at `offset` in `samples`.
    pub fn spectrum_at(&self, samples: &[f32], offset: usize) -> Result<Vec<f32>, TransformError> {
        let end = offset.checked_add(self.size);
        match end {
            Some(end) if end <= samples.len() => self.spectrum(&samples[offset..end]),
            _ => Err(TransformError::OutOfBounds {
                offset,
                frame_size: self.size,
                available: samples.len(),
            }),
        }
    }
}

/// Owned cache of transform engines keyed by frame size.
#[derive(Debug, Default)]
pub struct TransformCache {
    engines: HashMap<usize, Arc<TransformEngine>>,
}

impl TransformCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the engine for `size`, building its tables on first use.
    pub fn get_or_build(&mut self, size: usize) -> Result<Arc<TransformEngine>, TransformError> {
        if let Some(engine) = self.engines.get(&size) {
            return Ok(Arc::clone(engine));
        }
        let engine = Arc::new(TransformEngine::new(size)?);
        log::debug!("built transform tables for size {size}");
        self.engines.insert(size, Arc::clone(&engine));
        Ok(engine)
    }

    /// Number of distinct sizes cached.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// `true` if nothing has been built yet.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[inline]
fn reverse_bits(mut value: usize, bits: u32) -> usize {
    let mut reversed = 0;
    for _ in 0..bits {
        reversed = (reversed << 1) | (value & 1);
        value >>= 1;
    }
    reversed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_reversal_table() {
        let engine = TransformEngine::new(8).unwrap();
        assert_eq!(engine.bit_reverse, vec![0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn twiddle_stages() {
        let engine = TransformEngine::new(16).unwrap();
        let lens: Vec<usize> = engine.twiddles.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![1, 2, 4, 8]);
        let quarter = engine.twiddles[1][1];
        assert!(quarter.re.abs() < 1e-12);
        assert!((quarter.im + 1.0).abs() < 1e-12);
    }

    #[test]
    fn hann_window_endpoints() {
        let engine = TransformEngine::new(64).unwrap();
        assert!(engine.window()[0].abs() < 1e-12);
        assert!(engine.window()[63].abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_sizes() {
        assert_eq!(TransformEngine::new(0).unwrap_err(), TransformError::NotPowerOfTwo(0));
        assert_eq!(TransformEngine::new(1).unwrap_err(), TransformError::NotPowerOfTwo(1));
        assert_eq!(TransformEngine::new(1000).unwrap_err(), TransformError::NotPowerOfTwo(1000));
    }

    #[test]
    fn cache_reuses_tables() {
        let mut cache = TransformCache::new();
        let a = cache.get_or_build(256).unwrap();
        let b = cache.get_or_build(256).unwrap();
        let c = cache.get_or_build(512).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(c.size(), 512);
        assert_eq!(cache.len(), 2);
    }
}
