pub mod buffer;
pub mod fingerprint;
pub mod grouping;
pub mod score;
pub mod voter;
pub mod workers;

pub use buffer::{SampleBuffer, SampleType};
pub use fingerprint::{Fingerprinter, PeakDescription, SpectralFingerprinter};
pub use grouping::{group_peaks, PeakGroup, DEFAULT_GROUP_RADIUS};
pub use score::{estimate_approximation, ScoreEstimate};
pub use voter::generate_fingerprint;
pub use workers::{LutResult, PendingSearch, SearchWorkerPool};
