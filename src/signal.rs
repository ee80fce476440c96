//! Sample buffers and overlapping frames.

use thiserror::Error;

/// Errors raised when constructing a [`SampleBuffer`].
#[derive(Debug, Error)]
pub enum SignalError {
    /// The sample rate was zero.
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,
}

/// A loaded mono recording: normalized samples in `[-1.0, 1.0]` and their rate.
///
/// The buffer is immutable once built; analysis passes only ever borrow it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap already-normalized mono samples.
    ///
    /// Values outside `[-1.0, 1.0]` are clamped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Result<Self, SignalError> {
        if sample_rate == 0 {
            return Err(SignalError::ZeroSampleRate);
        }
        for s in samples.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
        Ok(SampleBuffer {
            samples,
            sample_rate,
        })
    }

    /// The normalized samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// `true` if the recording holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the recording in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Number of complete frames of `frame_size` samples advancing by `hop_size`.
    pub fn frame_count(&self, frame_size: usize, hop_size: usize) -> usize {
        if frame_size == 0 || hop_size == 0 || self.samples.len() < frame_size {
            return 0;
        }
        (self.samples.len() - frame_size) / hop_size + 1
    }

    /// Iterate over complete, overlapping frames in temporal order.
    pub fn frames(&self, frame_size: usize, hop_size: usize) -> Frames<'_> {
        Frames {
            samples: &self.samples,
            frame_size,
            hop_size,
            index: 0,
            count: self.frame_count(frame_size, hop_size),
        }
    }
}

/// One window of consecutive samples.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Position of the frame in the frame sequence.
    pub index: usize,
    /// Offset of the first sample in the recording.
    pub start: usize,
    /// The raw, unwindowed samples.
    pub samples: &'a [f32],
}

impl Frame<'_> {
    /// Start time of the frame in seconds.
    pub fn start_secs(&self, sample_rate: u32) -> f64 {
        self.start as f64 / sample_rate as f64
    }

    /// End time of the frame in seconds.
    pub fn end_secs(&self, sample_rate: u32) -> f64 {
        (self.start + self.samples.len()) as f64 / sample_rate as f64
    }

    /// Start time of the frame in whole milliseconds.
    pub fn start_ms(&self, sample_rate: u32) -> u64 {
        self.start as u64 * 1000 / sample_rate as u64
    }

    /// Root-mean-square amplitude of the raw samples.
    pub fn rms(&self) -> f32 {
        rms(self.samples)
    }
}

/// Iterator over the frames of a [`SampleBuffer`].
pub struct Frames<'a> {
    samples: &'a [f32],
    frame_size: usize,
    hop_size: usize,
    index: usize,
    count: usize,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Frame<'a>> {
        if self.index >= self.count {
            return None;
        }
        let start = self.index * self.hop_size;
        let frame = Frame {
            index: self.index,
            start,
            samples: &self.samples[start..start + self.frame_size],
        };
        self.index += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Frames<'_> {}

/// Root-mean-square amplitude of `samples`; zero for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cover_only_complete_windows() {
        let buffer = SampleBuffer::new(vec![0.0; 10], 8).unwrap();
        let starts: Vec<usize> = buffer.frames(4, 2).map(|f| f.start).collect();
        assert_eq!(starts, vec![0, 2, 4, 6]);
        assert_eq!(buffer.frame_count(16, 2), 0);
    }

    #[test]
    fn samples_are_clamped() {
        let buffer = SampleBuffer::new(vec![2.0, -3.0, 0.5], 100).unwrap();
        assert_eq!(buffer.samples(), &[1.0, -1.0, 0.5]);
    }

    #[test]
    fn frame_times_follow_hop() {
        let buffer = SampleBuffer::new(vec![0.0; 4000], 1000).unwrap();
        let frame = buffer.frames(1024, 512).nth(2).unwrap();
        assert_eq!(frame.start_ms(1000), 1024);
        assert!((frame.end_secs(1000) - 2.048).abs() < 1e-9);
    }
}
