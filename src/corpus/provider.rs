//! Reference corpus loaded from a directory of WAV files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::MusicSettings;
use crate::corpus::index::PeakIndex;
use crate::corpus::CoreInstance;
use crate::search::buffer::{resample_linear, SampleBuffer};
use crate::search::fingerprint::{Fingerprinter, SpectralFingerprinter};
use crate::search::grouping::{group_peaks, DEFAULT_GROUP_RADIUS};

pub struct DirectoryCorpus {
    file_names: Vec<String>,
    index: Arc<PeakIndex>,
    dump_dir: PathBuf,
}

impl DirectoryCorpus {
    /// A corpus with no tracks; searches match nothing but sessions
    /// still run end to end.
    pub fn empty(dump_dir: PathBuf) -> Self {
        Self {
            file_names: Vec::new(),
            index: Arc::new(PeakIndex::new()),
            dump_dir,
        }
    }

    /// Scan `corpus_dir` for WAV files and index every track.
    ///
    /// Files are ordered by name so track indices are stable across
    /// restarts. Undecodable files are skipped with a warning.
    pub fn load(
        corpus_dir: &Path,
        dump_dir: PathBuf,
        settings: &MusicSettings,
    ) -> anyhow::Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(corpus_dir)
            .with_context(|| format!("Failed to read corpus directory {corpus_dir:?}"))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut fingerprinter = SpectralFingerprinter::new(settings.clone());
        let mut index = PeakIndex::new();
        let mut file_names = Vec::new();

        for path in paths {
            let samples = match decode_track(&path, settings.target_sample_rate) {
                Ok(samples) => samples,
                Err(err) => {
                    warn!("Skipping corpus file {:?}: {err}", path);
                    continue;
                }
            };

            let track_index = file_names.len() as u32;
            fingerprinter.generate(&samples, settings.target_sample_rate);
            let groups = group_peaks(fingerprinter.peaks_collection(), DEFAULT_GROUP_RADIUS);
            index.index_track(track_index, &groups);

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!(
                "Indexed track {track_index} '{name}': {} samples, {} peak groups",
                samples.len(),
                groups.len()
            );
            file_names.push(name);
        }

        Ok(Self {
            file_names,
            index: Arc::new(index),
            dump_dir,
        })
    }

    fn write_dump(&self, buffer: &SampleBuffer, log: &[String]) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dump_dir)?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let base = self.dump_dir.join(format!("session_{stamp}"));

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: buffer.sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(base.with_extension("wav"), spec)?;
        for &sample in buffer.samples() {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;

        fs::write(base.with_extension("log"), log.join("\n"))?;

        info!("Stored session dump at {:?}", base);
        Ok(())
    }
}

impl CoreInstance for DirectoryCorpus {
    fn track_count(&self) -> usize {
        self.file_names.len()
    }

    fn file_name(&self, track_index: u32) -> String {
        self.file_names
            .get(track_index as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn peak_index(&self) -> Arc<PeakIndex> {
        Arc::clone(&self.index)
    }

    fn dump_session_data(&self, buffer: &SampleBuffer, log: &[String], should_store: bool) {
        if !should_store {
            return;
        }
        if let Err(err) = self.write_dump(buffer, log) {
            error!("Failed to store session dump: {err}");
        }
    }
}

/// Decode a WAV file to normalized mono f32 at `target_rate`.
fn decode_track(path: &Path, target_rate: u32) -> anyhow::Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|s| s as f32 / 32768.0))
                .collect::<Result<_, _>>()?,
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / (1 << 23) as f32))
                .collect::<Result<_, _>>()?,
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / i32::MAX as f32))
                .collect::<Result<_, _>>()?,
            other => anyhow::bail!("Unsupported bit depth: {other}"),
        },
    };

    let mono: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tone_wav(path: &Path, freq: f32, seconds: f32, sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (seconds * sample_rate as f32) as usize;
        for i in 0..frames {
            let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32;
            let sample = (phase.sin() * 0.8 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_indexes_tracks_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_tone_wav(&dir.path().join("b.wav"), 1125.0, 1.0, 16000, 1);
        write_tone_wav(&dir.path().join("a.wav"), 500.0, 1.0, 16000, 1);

        let corpus =
            DirectoryCorpus::load(dir.path(), dir.path().join("dumps"), &MusicSettings::default())
                .unwrap();

        assert_eq!(corpus.track_count(), 2);
        assert_eq!(corpus.file_name(0), "a.wav");
        assert_eq!(corpus.file_name(1), "b.wav");
        assert!(!corpus.peak_index().is_empty());
    }

    #[test]
    fn test_decode_downmixes_and_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_tone_wav(&path, 440.0, 1.0, 8000, 2);

        let samples = decode_track(&path, 16000).unwrap();
        // One second of stereo 8 kHz becomes one second of mono 16 kHz
        assert_eq!(samples.len(), 16000);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_unknown_file_name_is_blank() {
        let corpus = DirectoryCorpus::empty(PathBuf::from("dumps"));
        assert_eq!(corpus.file_name(7), "");
    }

    #[test]
    fn test_dump_respects_store_flag() {
        let dir = tempfile::tempdir().unwrap();
        let dump_dir = dir.path().join("dumps");
        let corpus = DirectoryCorpus::empty(dump_dir.clone());

        let buffer = SampleBuffer::from_samples(vec![0.5; 256], 16000);
        let log = vec!["line one".to_string()];

        corpus.dump_session_data(&buffer, &log, false);
        assert!(!dump_dir.exists());

        corpus.dump_session_data(&buffer, &log, true);
        let entries: Vec<_> = fs::read_dir(&dump_dir).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }
}
