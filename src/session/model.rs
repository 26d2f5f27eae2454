//! Per-session streaming search engine.
//!
//! Three actors touch a session: HTTP workers pushing samples, HTTP
//! workers reading the published result, and one dedicated consumer
//! thread recomputing the search. The session mutex guards the buffer,
//! the watermark queue and the published result; publishing is a single
//! critical section so readers always observe a consistent
//! `(results, deltas, version)` triple. A separate condition mutex
//! pairs with the update condition variable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::MusicSettings;
use crate::corpus::CoreInstance;
use crate::error::{MusicError, MusicResult};
use crate::search::buffer::{SampleBuffer, SampleType};
use crate::search::fingerprint::SpectralFingerprinter;
use crate::search::grouping::{group_peaks, DEFAULT_GROUP_RADIUS};
use crate::search::score::estimate_approximation;
use crate::search::voter::generate_fingerprint;
use crate::search::workers::{LutResult, SearchWorkerPool};

/// The collection buffer starts out sized for this much audio
const PREALLOCATED_BUFFER_SECONDS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Terminating,
    Terminated,
}

/// One matched track as it appears on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultTrack {
    pub file_index: u32,
    pub file_name: String,
    pub file_position_seconds: f64,
    pub similarity: u32,
}

struct SessionState {
    buffer: SampleBuffer,
    request_queue: VecDeque<usize>,
    search_result: Vec<LutResult>,
    result_version: u64,
    max_result_delta: f32,
    sq_average_delta: f32,
    log: Vec<String>,
    last_log_at: Option<DateTime<Utc>>,
    lifecycle: Lifecycle,
}

pub struct Session {
    token: String,
    sample_type: SampleType,
    store_session_data: bool,
    settings: MusicSettings,
    corpus: Arc<dyn CoreInstance>,
    pool: Arc<SearchWorkerPool>,
    state: Mutex<SessionState>,
    update_flag: Mutex<bool>,
    update_cond: Condvar,
    interrupted: AtomicBool,
    dumped: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Construct the session and start its consumer thread.
    ///
    /// `on_expire` runs on the consumer thread when the idle timeout
    /// fires, after the session has detached itself.
    pub fn spawn(
        token: String,
        sample_type: SampleType,
        store_session_data: bool,
        settings: MusicSettings,
        corpus: Arc<dyn CoreInstance>,
        pool: Arc<SearchWorkerPool>,
        on_expire: Box<dyn FnOnce() + Send>,
    ) -> Arc<Self> {
        let buffer = SampleBuffer::with_capacity(
            settings.target_sample_rate,
            (settings.target_sample_rate * PREALLOCATED_BUFFER_SECONDS) as usize,
        );

        let session = Arc::new(Self {
            token,
            sample_type,
            store_session_data,
            settings,
            corpus,
            pool,
            state: Mutex::new(SessionState {
                buffer,
                request_queue: VecDeque::new(),
                search_result: Vec::new(),
                result_version: 0,
                max_result_delta: 0.0,
                sq_average_delta: 0.0,
                log: Vec::new(),
                last_log_at: None,
                lifecycle: Lifecycle::Running,
            }),
            update_flag: Mutex::new(false),
            update_cond: Condvar::new(),
            interrupted: AtomicBool::new(false),
            dumped: AtomicBool::new(false),
            consumer: Mutex::new(None),
        });

        let consumer_session = Arc::clone(&session);
        let handle = thread::spawn(move || consumer_loop(consumer_session, on_expire));
        *session.lock_consumer() = Some(handle);

        session
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decode and append a sample batch, then wake the consumer.
    pub fn push_samples(&self, bytes: &[u8]) -> MusicResult<Value> {
        let (pushed, collected) = {
            let mut state = self.lock_state();
            if state.lifecycle != Lifecycle::Running {
                return Err(MusicError::NotFound(format!(
                    "Unable to push samples to the session - token was not found: {}",
                    self.token
                )));
            }

            let pushed = state.buffer.append_from(bytes, self.sample_type)?;
            let collected = state.buffer.data_length();
            state.request_queue.push_back(collected);
            (pushed, collected)
        };

        self.signal_update();

        Ok(json!({
            "samplesPushed": pushed,
            "samplesCollected": collected,
            "result": "ok",
        }))
    }

    /// Project the latest published result into the API shape.
    pub fn get_information(&self) -> Value {
        let (results, version, max_delta, sq_delta) = {
            let state = self.lock_state();
            (
                state.search_result.clone(),
                state.result_version,
                state.max_result_delta,
                state.sq_average_delta,
            )
        };

        let stride = self.settings.chunk_stride_seconds() as f64;
        let tracks: Vec<ResultTrack> = results
            .iter()
            .map(|result| ResultTrack {
                file_index: result.track_index,
                file_name: self.corpus.file_name(result.track_index),
                file_position_seconds: result.chunk_index as f64 * stride,
                similarity: result.catches,
            })
            .collect();

        json!({
            "resultVersion": version,
            "resultTracks": tracks,
            "maxResultDelta": max_delta,
            "squareAverageDelta": sq_delta,
            "result": "ok",
        })
    }

    /// Stop the session: persist first so the dump sees the quiescent
    /// buffer, then interrupt the consumer and join it.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            if state.lifecycle == Lifecycle::Running {
                state.lifecycle = Lifecycle::Terminating;
            }
        }

        self.dump();
        self.interrupted.store(true, Ordering::Release);
        self.signal_update();

        let handle = self.lock_consumer().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        self.lock_state().lifecycle = Lifecycle::Terminated;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock_state().lifecycle
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_consumer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal_update(&self) {
        let mut updated = self
            .update_flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *updated = true;
        self.update_cond.notify_all();
    }

    /// Wait one tick for an update signal. Returns whether one arrived.
    fn wait_for_update(&self) -> bool {
        let updated = self
            .update_flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut updated, _timeout) = self
            .update_cond
            .wait_timeout_while(updated, self.settings.thread_tick, |updated| !*updated)
            .unwrap_or_else(PoisonError::into_inner);

        let woke = *updated;
        *updated = false;
        woke
    }

    fn pop_watermark(&self) -> Option<usize> {
        self.lock_state().request_queue.pop_front()
    }

    /// Run one full search pass for the given watermark and publish the
    /// outcome as the next result version.
    fn process_watermark(
        &self,
        watermark: usize,
        fingerprinter: &mut SpectralFingerprinter,
        track_count: usize,
    ) -> MusicResult<()> {
        let snapshot = {
            let state = self.lock_state();
            state
                .buffer
                .snapshot_resampled_to(watermark, self.settings.target_sample_rate)
        };

        self.log(format!(
            "1. Generating fingerprint for fragment {} ms",
            watermark * 1000 / self.settings.target_sample_rate as usize
        ));

        let peaks = generate_fingerprint(fingerprinter, &snapshot, &self.settings);

        self.log("2. Collecting fingerprint hashes.");
        let grouped = group_peaks(&peaks, DEFAULT_GROUP_RADIUS);

        self.log(format!(
            "3. Tracks to compare to: {track_count}, peaks to compare: {}",
            peaks.len()
        ));

        let track_mask = Arc::new(vec![1u8; track_count]);
        let pending = self.pool.compare_peaks(Arc::new(grouped), track_mask);
        let shards = pending.wait_all()?;
        let ranked = SearchWorkerPool::aggregate_result_tracks(
            shards,
            false,
            self.settings.max_tracks_in_result,
        );

        self.log("4. Calculate approximation.");
        let estimate = estimate_approximation(&ranked, self.settings.zero_division_policy);
        self.log(format!("5. Max delta: {}", estimate.max_delta));

        let top_track = ranked.first().map(|result| result.track_index);
        {
            let mut state = self.lock_state();
            state.search_result = ranked;
            state.max_result_delta = estimate.max_delta;
            state.sq_average_delta = estimate.sq_average_delta;
            state.result_version += 1;
        }

        if let Some(track_index) = top_track {
            self.log(format!("6. Top track: {}", self.corpus.file_name(track_index)));
        }

        Ok(())
    }

    /// Append a timestamped line to the session log.
    ///
    /// Takes the state lock itself, so it must never be called with the
    /// lock already held.
    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        let now = Utc::now();

        let mut state = self.lock_state();
        let delta_ms = state
            .last_log_at
            .map(|previous| (now - previous).num_milliseconds())
            .unwrap_or(0);
        state.last_log_at = Some(now);

        let line = format!(
            "[{} +{} msec] {}",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            delta_ms,
            message
        );
        debug!("Session {}: {}", self.token, message);
        state.log.push(line);
    }

    /// Idle-timeout teardown, on the consumer thread itself: persist,
    /// mark terminated and detach the join handle so a later drop does
    /// not try to join the current thread.
    fn expire(&self) {
        self.dump();
        self.lock_state().lifecycle = Lifecycle::Terminated;
        let _ = self.lock_consumer().take();
    }

    fn dump(&self) {
        if self.dumped.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = self.lock_state();
        self.corpus
            .dump_session_data(&state.buffer, &state.log, self.store_session_data);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn consumer_loop(session: Arc<Session>, on_expire: Box<dyn FnOnce() + Send>) {
    info!("Session {} consumer started", session.token);

    let mut fingerprinter = SpectralFingerprinter::new(session.settings.clone());
    let track_count = session.corpus.track_count();
    let mut idle = Duration::ZERO;

    while !session.interrupted.load(Ordering::Acquire) {
        if !session.wait_for_update() {
            idle += session.settings.thread_tick;
            if idle >= session.settings.session_timeout {
                info!(
                    "Session {} idle for {:?}, terminating",
                    session.token, idle
                );
                session.expire();
                on_expire();
                return;
            }
            continue;
        }
        idle = Duration::ZERO;

        while let Some(watermark) = session.pop_watermark() {
            if let Err(err) = session.process_watermark(watermark, &mut fingerprinter, track_count)
            {
                session.log(format!("Exception in search thread: {err}"));
                warn!("Session {} search pass failed: {err}", session.token);
            }
        }
    }

    info!("Session {} consumer finished", session.token);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{fast_settings, null_pool, NullCorpus};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn spawn_session(store: bool) -> (Arc<Session>, Arc<NullCorpus>, Arc<AtomicUsize>) {
        let corpus = Arc::new(NullCorpus::new());
        let expirations = Arc::new(AtomicUsize::new(0));
        let on_expire = {
            let expirations = Arc::clone(&expirations);
            Box::new(move || {
                expirations.fetch_add(1, Ordering::SeqCst);
            })
        };

        let session = Session::spawn(
            "test-token".into(),
            SampleType::S16Le,
            store,
            fast_settings(),
            corpus.clone() as Arc<dyn CoreInstance>,
            null_pool(),
            on_expire,
        );
        (session, corpus, expirations)
    }

    fn wait_for_version(session: &Session, minimum: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        loop {
            let info = session.get_information();
            let version = info["resultVersion"].as_u64().unwrap();
            if version >= minimum || Instant::now() >= deadline {
                return version;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_fresh_session_has_version_zero() {
        let (session, _, _) = spawn_session(false);

        let info = session.get_information();
        assert_eq!(info["resultVersion"], 0);
        assert_eq!(info["resultTracks"].as_array().unwrap().len(), 0);
        assert_eq!(info["result"], "ok");

        session.shutdown();
    }

    #[test]
    fn test_push_publishes_a_new_version() {
        let (session, _, _) = spawn_session(false);

        let response = session.push_samples(&[0u8; 32000]).unwrap();
        assert_eq!(response["samplesPushed"], 16000);
        assert_eq!(response["samplesCollected"], 16000);
        assert_eq!(response["result"], "ok");

        let version = wait_for_version(&session, 1, Duration::from_secs(5));
        assert!(version >= 1);

        session.shutdown();
    }

    #[test]
    fn test_watermarks_process_in_push_order() {
        let (session, _, _) = spawn_session(false);

        let first = session.push_samples(&[0u8; 16000]).unwrap();
        assert_eq!(first["samplesCollected"], 8000);
        let second = session.push_samples(&[0u8; 32000]).unwrap();
        assert_eq!(second["samplesCollected"], 24000);

        let version = wait_for_version(&session, 2, Duration::from_secs(5));
        assert!(version >= 2);

        session.shutdown();
    }

    #[test]
    fn test_malformed_push_leaves_session_intact() {
        let (session, _, _) = spawn_session(false);

        let err = session.push_samples(&[0u8; 3]).unwrap_err();
        assert!(matches!(err, MusicError::MalformedSamples { .. }));

        let ok = session.push_samples(&[0u8; 4]).unwrap();
        assert_eq!(ok["samplesCollected"], 2);

        session.shutdown();
    }

    #[test]
    fn test_shutdown_dumps_once_with_store_flag() {
        let (session, corpus, _) = spawn_session(true);

        session.shutdown();
        session.shutdown();

        assert_eq!(corpus.dumps.load(Ordering::SeqCst), 1);
        assert_eq!(corpus.stored.load(Ordering::SeqCst), 1);
        assert_eq!(session.lifecycle(), Lifecycle::Terminated);
    }

    #[test]
    fn test_shutdown_without_store_flag_skips_storage() {
        let (session, corpus, _) = spawn_session(false);

        session.shutdown();
        assert_eq!(corpus.dumps.load(Ordering::SeqCst), 1);
        assert_eq!(corpus.stored.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_idle_session_expires() {
        let (session, corpus, expirations) = spawn_session(false);

        let deadline = Instant::now() + Duration::from_secs(5);
        while expirations.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(expirations.load(Ordering::SeqCst), 1);
        assert_eq!(session.lifecycle(), Lifecycle::Terminated);
        assert_eq!(corpus.dumps.load(Ordering::SeqCst), 1);

        // Pushing into the expired session is refused
        let err = session.push_samples(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, MusicError::NotFound(_)));
    }
}
