//! Reference corpus: track naming, the shared peak index and the
//! session persistence hook.

pub mod index;
pub mod provider;

pub use index::{PeakIndex, PeakOccurrence};
pub use provider::DirectoryCorpus;

use std::sync::Arc;

use crate::search::buffer::SampleBuffer;

/// Host services every session depends on. Immutable after load and
/// shared by reference across all sessions.
pub trait CoreInstance: Send + Sync {
    fn track_count(&self) -> usize;

    fn file_name(&self, track_index: u32) -> String;

    /// Lookup table the search workers probe
    fn peak_index(&self) -> Arc<PeakIndex>;

    /// Called once at session teardown, before the consumer is stopped,
    /// so the dumped state reflects a quiescent buffer
    fn dump_session_data(&self, buffer: &SampleBuffer, log: &[String], should_store: bool);
}
