//! Grow-only PCM collection buffer for a session.
//!
//! The ingest side appends decoded samples, the search side takes
//! snapshot copies up to a watermark. The stored length only ever grows
//! for the life of the buffer.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{MusicError, MusicResult};

/// Wire format of the PCM a session ingests. Fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    F32Le,
    S16Le,
}

impl SampleType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "f32le" => Some(Self::F32Le),
            "s16le" => Some(Self::S16Le),
            _ => None,
        }
    }

    pub fn byte_width(self) -> usize {
        match self {
            Self::F32Le => 4,
            Self::S16Le => 2,
        }
    }
}

/// Append-only f32 PCM store at a fixed sample rate.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            sample_rate,
        }
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Guarantee capacity for at least `total` samples, preserving data.
    pub fn ensure(&mut self, total: usize) {
        if total > self.samples.capacity() {
            self.samples.reserve(total - self.samples.len());
        }
    }

    /// Decode little-endian PCM bytes and append them.
    ///
    /// Returns the number of samples appended. The byte length must be a
    /// multiple of the sample width.
    pub fn append_from(&mut self, bytes: &[u8], sample_type: SampleType) -> MusicResult<usize> {
        let width = sample_type.byte_width();
        if bytes.len() % width != 0 {
            return Err(MusicError::MalformedSamples {
                length: bytes.len(),
                width,
            });
        }

        let count = bytes.len() / width;
        self.ensure(self.samples.len() + count);

        match sample_type {
            SampleType::F32Le => {
                for chunk in bytes.chunks_exact(4) {
                    self.samples.push(LittleEndian::read_f32(chunk));
                }
            }
            SampleType::S16Le => {
                for chunk in bytes.chunks_exact(2) {
                    self.samples.push(LittleEndian::read_i16(chunk) as f32 / 32768.0);
                }
            }
        }

        Ok(count)
    }

    pub fn data_length(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Independent copy of the first `length` samples at `target_rate`.
    ///
    /// A plain copy when the rates already match, a linear resample
    /// otherwise.
    pub fn snapshot_resampled_to(&self, length: usize, target_rate: u32) -> SampleBuffer {
        let length = length.min(self.samples.len());
        let window = &self.samples[..length];

        let samples = if self.sample_rate == target_rate {
            window.to_vec()
        } else {
            resample_linear(window, self.sample_rate, target_rate)
        };

        SampleBuffer::from_samples(samples, target_rate)
    }
}

/// Resample audio between rates using linear interpolation
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = src_pos - src_idx as f64;

        let sample = if src_idx + 1 < samples.len() {
            let s0 = samples[src_idx] as f64;
            let s1 = samples[src_idx + 1] as f64;
            (s0 + (s1 - s0) * frac) as f32
        } else if src_idx < samples.len() {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}
