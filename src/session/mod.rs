pub mod model;
pub mod registry;

pub use model::{Lifecycle, ResultTrack, Session};
pub use registry::SessionRegistry;

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for session tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::MusicSettings;
    use crate::corpus::{CoreInstance, PeakIndex};
    use crate::search::buffer::SampleBuffer;
    use crate::search::workers::SearchWorkerPool;

    /// Trackless corpus that counts persistence-hook invocations.
    pub struct NullCorpus {
        index: Arc<PeakIndex>,
        pub dumps: AtomicUsize,
        pub stored: AtomicUsize,
    }

    impl NullCorpus {
        pub fn new() -> Self {
            Self {
                index: Arc::new(PeakIndex::new()),
                dumps: AtomicUsize::new(0),
                stored: AtomicUsize::new(0),
            }
        }
    }

    impl CoreInstance for NullCorpus {
        fn track_count(&self) -> usize {
            0
        }

        fn file_name(&self, _track_index: u32) -> String {
            String::new()
        }

        fn peak_index(&self) -> Arc<PeakIndex> {
            Arc::clone(&self.index)
        }

        fn dump_session_data(&self, _buffer: &SampleBuffer, _log: &[String], should_store: bool) {
            self.dumps.fetch_add(1, Ordering::SeqCst);
            if should_store {
                self.stored.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Settings with sub-second scheduling for fast tests
    pub fn fast_settings() -> MusicSettings {
        MusicSettings {
            thread_tick: Duration::from_millis(10),
            session_timeout: Duration::from_millis(200),
            ..MusicSettings::default()
        }
    }

    pub fn null_pool() -> Arc<SearchWorkerPool> {
        Arc::new(SearchWorkerPool::allocate(2, Arc::new(PeakIndex::new()), 0))
    }
}
