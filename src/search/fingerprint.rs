//! Spectral peak extraction.
//!
//! A window is sliced into overlapping chunks; each chunk goes through a
//! Hann-windowed FFT and the magnitude spectrum is split into equal
//! frequency bands. A band counts as a peak when its strongest bin is
//! within the cutoff threshold of the loudest bin of the chunk.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::config::MusicSettings;

/// One salient time-frequency atom of a fingerprinted window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDescription {
    pub band_index: u16,
    pub chunk_index: u32,
    pub peak_cutoff_db: f32,
}

/// Stateful peak picker. `generate` replaces the collection of the
/// previous call; peaks are then read back with `peaks_collection`.
pub trait Fingerprinter {
    fn generate(&mut self, samples: &[f32], sample_rate: u32);
    fn peaks_collection(&self) -> &[PeakDescription];
}

pub struct SpectralFingerprinter {
    settings: MusicSettings,
    planner: FftPlanner<f32>,
    peaks: Vec<PeakDescription>,
}

impl SpectralFingerprinter {
    pub fn new(settings: MusicSettings) -> Self {
        Self {
            settings,
            planner: FftPlanner::new(),
            peaks: Vec::new(),
        }
    }
}

impl Fingerprinter for SpectralFingerprinter {
    fn generate(&mut self, samples: &[f32], sample_rate: u32) {
        self.peaks.clear();

        let slice_len = self.settings.slice_samples(sample_rate);
        let stride = self.settings.chunk_stride_samples(sample_rate);
        if slice_len == 0 || stride == 0 || samples.len() < slice_len {
            return;
        }

        let fft = self.planner.plan_fft_forward(slice_len);
        let mut spectrum = vec![Complex::new(0.0f32, 0.0); slice_len];
        let mut magnitudes = vec![0.0f32; slice_len / 2];

        let bands = self.settings.frequency_points as usize;
        let band_width = (magnitudes.len() / bands.max(1)).max(1);

        for (chunk, start) in (0..=samples.len() - slice_len).step_by(stride).enumerate() {
            for (i, &sample) in samples[start..start + slice_len].iter().enumerate() {
                spectrum[i] = Complex::new(sample * hann_window(i, slice_len), 0.0);
            }
            fft.process(&mut spectrum);

            let mut chunk_max = 0.0f32;
            for (bin, value) in spectrum.iter().take(magnitudes.len()).enumerate() {
                let magnitude = value.norm();
                magnitudes[bin] = magnitude;
                if magnitude > chunk_max {
                    chunk_max = magnitude;
                }
            }

            // A silent chunk has no reference level and no peaks
            if chunk_max <= 0.0 {
                continue;
            }

            for band in 0..bands {
                let lo = band * band_width;
                let hi = ((band + 1) * band_width).min(magnitudes.len());
                if lo >= hi {
                    break;
                }

                let band_max = magnitudes[lo..hi].iter().cloned().fold(0.0f32, f32::max);
                if band_max <= 0.0 {
                    continue;
                }

                let level_db = 20.0 * (band_max / chunk_max).log10();
                if level_db >= self.settings.peak_cutoff_threshold_db {
                    self.peaks.push(PeakDescription {
                        band_index: band as u16,
                        chunk_index: chunk as u32,
                        peak_cutoff_db: self.settings.peak_cutoff_threshold_db,
                    });
                }
            }
        }
    }

    fn peaks_collection(&self) -> &[PeakDescription] {
        &self.peaks
    }
}

fn hann_window(i: usize, n: usize) -> f32 {
    0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()
}
