//! Parallel peak search over a sharded corpus index.
//!
//! One process-wide pool serves every session. Each worker thread owns a
//! disjoint contiguous range of track indices; a query is dispatched to
//! all workers at once and each one counts hits only inside its shard,
//! so no two workers ever write the same track. Sessions enqueue a job
//! and block on the collected shard results.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::corpus::PeakIndex;
use crate::error::{MusicError, MusicResult};
use crate::search::grouping::PeakGroup;

/// One candidate alignment of the query against a reference track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutResult {
    pub track_index: u32,
    /// Modal chunk offset of the track's hits
    pub chunk_index: u32,
    /// Number of grouped query peaks matched at this alignment
    pub catches: u32,
}

struct SearchJob {
    groups: Arc<Vec<PeakGroup>>,
    track_mask: Arc<Vec<u8>>,
    reply: Sender<ShardHits>,
}

#[derive(Default)]
struct TrackHits {
    catches: u32,
    /// Alignment offset -> observation count
    offsets: HashMap<i64, u32>,
}

/// Hits one worker collected for its shard of the corpus.
pub struct ShardHits {
    tracks: HashMap<u32, TrackHits>,
}

struct Worker {
    jobs: Sender<SearchJob>,
    handle: JoinHandle<()>,
}

pub struct SearchWorkerPool {
    workers: Vec<Worker>,
}

impl SearchWorkerPool {
    /// Spawn `worker_count` workers over disjoint shards of
    /// `track_count` tracks; the last shard absorbs the remainder.
    pub fn allocate(worker_count: usize, index: Arc<PeakIndex>, track_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shard_size = track_count / worker_count;

        let mut workers = Vec::with_capacity(worker_count);
        for n in 0..worker_count {
            let shard_start = n * shard_size;
            let shard_end = if n + 1 == worker_count {
                track_count
            } else {
                shard_start + shard_size
            };

            let (jobs_tx, jobs_rx) = channel();
            let index = Arc::clone(&index);
            let handle = thread::spawn(move || {
                worker_loop(index, shard_start as u32, shard_end as u32, jobs_rx);
            });

            workers.push(Worker { jobs: jobs_tx, handle });
        }

        info!(
            "Allocated {} search workers over {} tracks",
            worker_count, track_count
        );
        Self { workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Dispatch one query to every worker. The returned handle collects
    /// the shard results.
    pub fn compare_peaks(
        &self,
        groups: Arc<Vec<PeakGroup>>,
        track_mask: Arc<Vec<u8>>,
    ) -> PendingSearch {
        let (reply_tx, reply_rx) = channel();

        let mut dispatch_failed = false;
        for worker in &self.workers {
            let job = SearchJob {
                groups: Arc::clone(&groups),
                track_mask: Arc::clone(&track_mask),
                reply: reply_tx.clone(),
            };
            if worker.jobs.send(job).is_err() {
                dispatch_failed = true;
            }
        }

        PendingSearch {
            replies: reply_rx,
            expected: self.workers.len(),
            dispatch_failed,
        }
    }

    /// Merge per-worker shard hits into a ranked result list.
    ///
    /// Shards are disjoint by construction, so the merge is a plain
    /// union. Results sort by catches descending, then track index
    /// ascending, and truncate to `max_tracks` unless `keep_all`.
    pub fn aggregate_result_tracks(
        shards: Vec<ShardHits>,
        keep_all: bool,
        max_tracks: usize,
    ) -> Vec<LutResult> {
        let mut results = Vec::new();

        for shard in shards {
            for (track_index, hits) in shard.tracks {
                if hits.catches == 0 {
                    continue;
                }

                let modal_offset = hits
                    .offsets
                    .iter()
                    .max_by_key(|&(&offset, &count)| (count, std::cmp::Reverse(offset)))
                    .map(|(&offset, _)| offset)
                    .unwrap_or(0);

                results.push(LutResult {
                    track_index,
                    chunk_index: modal_offset.max(0) as u32,
                    catches: hits.catches,
                });
            }
        }

        results.sort_by(|a, b| {
            b.catches
                .cmp(&a.catches)
                .then(a.track_index.cmp(&b.track_index))
        });

        if !keep_all {
            results.truncate(max_tracks);
        }

        results
    }
}

impl Drop for SearchWorkerPool {
    fn drop(&mut self) {
        for worker in self.workers.drain(..) {
            // Closing the job channel ends the worker loop
            drop(worker.jobs);
            let _ = worker.handle.join();
        }
    }
}

/// Blocks until every worker answered the dispatched query.
pub struct PendingSearch {
    replies: Receiver<ShardHits>,
    expected: usize,
    dispatch_failed: bool,
}

impl PendingSearch {
    pub fn wait_all(self) -> MusicResult<Vec<ShardHits>> {
        if self.dispatch_failed {
            return Err(MusicError::SearchFailed(
                "a search worker rejected the query".into(),
            ));
        }

        let mut shards = Vec::with_capacity(self.expected);
        for _ in 0..self.expected {
            let shard = self.replies.recv().map_err(|_| {
                MusicError::SearchFailed("a search worker disappeared mid-query".into())
            })?;
            shards.push(shard);
        }
        Ok(shards)
    }
}

fn worker_loop(index: Arc<PeakIndex>, shard_start: u32, shard_end: u32, jobs: Receiver<SearchJob>) {
    debug!("Search worker started for tracks {shard_start}..{shard_end}");

    while let Ok(job) = jobs.recv() {
        let mut tracks: HashMap<u32, TrackHits> = HashMap::new();

        for group in job.groups.iter() {
            for occurrence in index.lookup(group.key()) {
                let track = occurrence.track_index;
                if track < shard_start || track >= shard_end {
                    continue;
                }
                if job.track_mask.get(track as usize).copied().unwrap_or(0) == 0 {
                    continue;
                }

                let hits = tracks.entry(track).or_default();
                hits.catches += 1;
                let offset = occurrence.chunk_index as i64 - group.chunk_index as i64;
                *hits.offsets.entry(offset).or_insert(0) += 1;
            }
        }

        // The caller may have given up waiting; nothing to do then
        let _ = job.reply.send(ShardHits { tracks });
    }

    debug!("Search worker for tracks {shard_start}..{shard_end} finished");
}
