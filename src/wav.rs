//! WAV input
//!
//! Minimal RIFF/WAVE reader producing a mono [`SampleBuffer`]. Only 16-bit
//! integer PCM and 32-bit IEEE float are accepted; anything else is rejected
//! rather than converted.

use std::{fs::File, io::Read, path::Path};
use thiserror::Error;

use crate::signal::{SampleBuffer, SignalError};

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Errors returned while reading a WAV container.
#[derive(Debug, Error)]
pub enum WavError {
    /// The stream does not start with a `RIFF` header.
    #[error("missing RIFF header")]
    NotRiff,

    /// The RIFF form type is not `WAVE`.
    #[error("RIFF form type is not WAVE")]
    NotWave,

    /// A required chunk was never found.
    #[error("missing `{0}` chunk")]
    MissingChunk(&'static str),

    /// A chunk declares more bytes than the stream holds.
    #[error("chunk `{id}` declares {declared} bytes but only {available} remain")]
    TruncatedChunk {
        /// Four-character chunk id.
        id: String,
        /// Size written in the chunk header.
        declared: usize,
        /// Bytes actually left in the stream.
        available: usize,
    },

    /// The format chunk is too short to describe the encoding.
    #[error("format chunk is {0} bytes, expected at least 16")]
    ShortFormatChunk(usize),

    /// Only single-channel audio is supported.
    #[error("unsupported channel count {0}, expected mono")]
    UnsupportedChannels(u16),

    /// The sample encoding is neither 16-bit PCM nor 32-bit float.
    #[error("unsupported sample encoding: format tag {format_tag}, {bits_per_sample} bits")]
    UnsupportedEncoding {
        /// WAVE format tag (1 = PCM, 3 = IEEE float).
        format_tag: u16,
        /// Declared bits per sample.
        bits_per_sample: u16,
    },

    /// The format chunk declares a zero sample rate.
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,

    /// Reading from the underlying source failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SignalError> for WavError {
    fn from(err: SignalError) -> Self {
        match err {
            SignalError::ZeroSampleRate => WavError::ZeroSampleRate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FormatChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Open and decode a WAV file from disk.
pub fn open_wav<P: AsRef<Path>>(path: P) -> Result<SampleBuffer, WavError> {
    let file = File::open(path.as_ref())?;
    read_wav(file)
}

/// Decode a WAV stream.
pub fn read_wav<R: Read>(mut reader: R) -> Result<SampleBuffer, WavError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    parse_wav(&bytes)
}

/// Decode an in-memory WAV image.
///
/// The `fmt ` and `data` chunks may appear in either order; odd-sized chunks
/// are followed by one pad byte.
pub fn parse_wav(bytes: &[u8]) -> Result<SampleBuffer, WavError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" {
        return Err(WavError::NotRiff);
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotWave);
    }

    let mut format: Option<FormatChunk> = None;
    let mut payload: Option<&[u8]> = None;

    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body_start = offset + 8;
        let available = bytes.len() - body_start;
        if size > available {
            return Err(WavError::TruncatedChunk {
                id: String::from_utf8_lossy(id).into_owned(),
                declared: size,
                available,
            });
        }
        let body = &bytes[body_start..body_start + size];

        match id {
            b"fmt " if format.is_none() => format = Some(parse_format(body)?),
            b"data" if payload.is_none() => payload = Some(body),
            _ => {}
        }

        offset = body_start + size + (size % 2);
    }

    let format = format.ok_or(WavError::MissingChunk("fmt "))?;
    let payload = payload.ok_or(WavError::MissingChunk("data"))?;

    if format.channels != 1 {
        return Err(WavError::UnsupportedChannels(format.channels));
    }
    if format.sample_rate == 0 {
        return Err(WavError::ZeroSampleRate);
    }

    let samples = match (format.format_tag, format.bits_per_sample) {
        (FORMAT_PCM, 16) => payload
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect::<Vec<f32>>(),
        (FORMAT_IEEE_FLOAT, 32) => payload
            .chunks_exact(4)
            .map(|b| {
                let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                if v.is_finite() {
                    v.clamp(-1.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect::<Vec<f32>>(),
        (format_tag, bits_per_sample) => {
            return Err(WavError::UnsupportedEncoding {
                format_tag,
                bits_per_sample,
            })
        }
    };

    log::debug!(
        "decoded wav: {} samples at {} Hz (format tag {}, {} bits)",
        samples.len(),
        format.sample_rate,
        format.format_tag,
        format.bits_per_sample
    );

    Ok(SampleBuffer::new(samples, format.sample_rate)?)
}

fn parse_format(body: &[u8]) -> Result<FormatChunk, WavError> {
    if body.len() < 16 {
        return Err(WavError::ShortFormatChunk(body.len()));
    }
    let mut format_tag = read_u16(body, 0);
    // WAVE_FORMAT_EXTENSIBLE keeps the real tag in the first two bytes of the sub-format GUID.
    if format_tag == FORMAT_EXTENSIBLE && body.len() >= 26 {
        format_tag = read_u16(body, 24);
    }
    Ok(FormatChunk {
        format_tag,
        channels: read_u16(body, 2),
        sample_rate: read_u32(body, 4),
        bits_per_sample: read_u16(body, 14),
    })
}

#[inline]
fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
