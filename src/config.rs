//! Service configuration, loaded from the environment.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context as _;

/// What to do when the regression line predicts zero catches for a rank.
///
/// The ratio `catches / predicted` is undefined there; the policy decides
/// whether the term is dropped or the denominator is clamped to an epsilon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroDivisionPolicy {
    Skip,
    Clamp,
}

impl ZeroDivisionPolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "skip" => Some(Self::Skip),
            "clamp" => Some(Self::Clamp),
            _ => None,
        }
    }
}

/// Tuning parameters for the fingerprint engine and session scheduling.
#[derive(Debug, Clone)]
pub struct MusicSettings {
    /// Sample rate every session buffer and corpus track is held at (Hz)
    pub target_sample_rate: u32,
    /// Number of frequency bands a chunk spectrum is split into
    pub frequency_points: u16,
    /// Length of one analysis slice in seconds
    pub slice_duration_seconds: f32,
    /// Overlap between consecutive slices in seconds
    pub slice_overlap_seconds: f32,
    /// Band level relative to the loudest bin of a chunk to count as a peak (dB)
    pub peak_cutoff_threshold_db: f32,
    /// Behavior when the fitted catches curve predicts zero
    pub zero_division_policy: ZeroDivisionPolicy,
    /// Consumer wait tick
    pub thread_tick: Duration,
    /// Idle time after which a session terminates itself
    pub session_timeout: Duration,
    /// Result list is truncated to this many tracks
    pub max_tracks_in_result: usize,
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            frequency_points: 32,
            slice_duration_seconds: 0.256,
            slice_overlap_seconds: 0.128,
            peak_cutoff_threshold_db: -40.0,
            zero_division_policy: ZeroDivisionPolicy::Skip,
            thread_tick: Duration::from_millis(50),
            session_timeout: Duration::from_secs(30),
            max_tracks_in_result: 20,
        }
    }
}

impl MusicSettings {
    /// Temporal distance between consecutive chunks, in seconds
    pub fn chunk_stride_seconds(&self) -> f32 {
        self.slice_duration_seconds - self.slice_overlap_seconds
    }

    /// Chunk stride in samples at the given rate
    pub fn chunk_stride_samples(&self, sample_rate: u32) -> usize {
        (self.chunk_stride_seconds() * sample_rate as f32) as usize
    }

    /// Slice length in samples at the given rate
    pub fn slice_samples(&self, sample_rate: u32) -> usize {
        (self.slice_duration_seconds * sample_rate as f32) as usize
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_port: u16,
    /// URI prefix every endpoint is mounted under; always ends with '/'
    pub base_path: String,
    /// Directory of reference WAV files; no corpus is loaded when unset
    pub corpus_dir: Option<PathBuf>,
    /// Where session dumps are written
    pub dump_dir: PathBuf,
    /// Search worker pool size
    pub search_workers: usize,
    pub music: MusicSettings,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_port = match std::env::var("LISTEN_PORT") {
            Ok(value) => value.parse().context("Invalid LISTEN_PORT")?,
            Err(_) => 8080,
        };

        let base_path = normalize_base_path(
            &std::env::var("API_BASE_PATH").unwrap_or_else(|_| "/api/v1/".into()),
        );

        let corpus_dir = std::env::var("CORPUS_DIR").ok().map(PathBuf::from);
        let dump_dir = std::env::var("SESSION_DUMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("dumps"));

        let search_workers = match std::env::var("SEARCH_WORKERS") {
            Ok(value) => value.parse().context("Invalid SEARCH_WORKERS")?,
            Err(_) => thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        };

        let mut music = MusicSettings::default();
        if let Ok(value) = std::env::var("TARGET_SAMPLE_RATE") {
            music.target_sample_rate = value.parse().context("Invalid TARGET_SAMPLE_RATE")?;
        }
        if let Ok(value) = std::env::var("FREQUENCY_POINTS") {
            music.frequency_points = value.parse().context("Invalid FREQUENCY_POINTS")?;
        }
        if let Ok(value) = std::env::var("SLICE_DURATION_SECONDS") {
            music.slice_duration_seconds = value.parse().context("Invalid SLICE_DURATION_SECONDS")?;
        }
        if let Ok(value) = std::env::var("SLICE_OVERLAP_SECONDS") {
            music.slice_overlap_seconds = value.parse().context("Invalid SLICE_OVERLAP_SECONDS")?;
        }
        if let Ok(value) = std::env::var("PEAK_CUTOFF_THRESHOLD_DB") {
            music.peak_cutoff_threshold_db = value.parse().context("Invalid PEAK_CUTOFF_THRESHOLD_DB")?;
        }
        if let Ok(value) = std::env::var("REGRESSION_ZERO_POLICY") {
            music.zero_division_policy = ZeroDivisionPolicy::parse(&value)
                .with_context(|| format!("Invalid REGRESSION_ZERO_POLICY: {value}"))?;
        }
        if let Ok(value) = std::env::var("SESSION_TIMEOUT_SECONDS") {
            let seconds: u64 = value.parse().context("Invalid SESSION_TIMEOUT_SECONDS")?;
            music.session_timeout = Duration::from_secs(seconds);
        }

        Ok(Self {
            listen_port,
            base_path,
            corpus_dir,
            dump_dir,
            search_workers,
            music,
        })
    }
}

/// Enforce a leading and trailing '/' on the API base path
pub fn normalize_base_path(path: &str) -> String {
    let mut normalized = String::from(path);
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
