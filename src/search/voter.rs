//! Robust fingerprint extraction by multi-offset voting.
//!
//! A raw peak picker is noisy against sub-chunk phase: shifting the
//! window by a fraction of a chunk moves peaks across cell boundaries.
//! Running it over many phase-shifted sub-windows and keeping only the
//! cells confirmed by a strict majority of observations yields peaks
//! that are stable under small temporal misalignment.

use crate::config::MusicSettings;
use crate::search::buffer::SampleBuffer;
use crate::search::fingerprint::{Fingerprinter, PeakDescription};

/// Sub-window shift per observation, relatively prime to the chunk
/// stride for broad phase coverage
const OFFSET_STRIDE_SAMPLES: usize = 757;
/// Sub-window shifts cover offsets below this bound
const OFFSET_RANGE_SAMPLES: usize = 20000;
/// Windows longer than this get their first second treated as warm-up
const INITIAL_SKIP_THRESHOLD_SECONDS: f64 = 5.0;

/// Fingerprint `window`, voting peaks across phase-shifted observations.
pub fn generate_fingerprint(
    fingerprinter: &mut dyn Fingerprinter,
    window: &SampleBuffer,
    settings: &MusicSettings,
) -> Vec<PeakDescription> {
    let chunk_stride = settings.chunk_stride_seconds() as f64;
    if chunk_stride <= 0.0 {
        return Vec::new();
    }

    let chunks_count = (window.duration_seconds() / chunk_stride) as usize;
    if chunks_count == 0 {
        return Vec::new();
    }

    let bands = settings.frequency_points as usize;
    let mut votes = vec![vec![0u32; chunks_count]; bands];

    let sample_rate = window.sample_rate();
    let initial_offset = if window.duration_seconds() > INITIAL_SKIP_THRESHOLD_SECONDS {
        sample_rate as usize
    } else {
        0
    };

    let mut steps = 0usize;
    let mut offset = 0usize;
    while offset < OFFSET_RANGE_SAMPLES {
        let start = initial_offset + offset;
        if start >= window.data_length() {
            break;
        }

        fingerprinter.generate(&window.samples()[start..], sample_rate);

        let chunk_offset = (offset as f64 / sample_rate as f64 / chunk_stride) as usize;
        for peak in fingerprinter.peaks_collection() {
            let band = peak.band_index as usize;
            let cell = peak.chunk_index as usize + chunk_offset;
            if band < bands && cell < chunks_count {
                votes[band][cell] += 1;
            }
        }

        steps += 1;
        offset += OFFSET_STRIDE_SAMPLES;
    }

    let majority = (steps / 2) as u32;
    let mut result = Vec::new();
    for (band, cells) in votes.iter().enumerate() {
        for (chunk, &count) in cells.iter().enumerate() {
            if count > majority {
                result.push(PeakDescription {
                    band_index: band as u16,
                    chunk_index: chunk as u32,
                    peak_cutoff_db: settings.peak_cutoff_threshold_db,
                });
            }
        }
    }

    result
}
