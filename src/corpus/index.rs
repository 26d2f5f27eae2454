//! In-memory lookup table from peak-group keys to track occurrences.

use std::collections::HashMap;

use crate::search::grouping::PeakGroup;

/// One place a peak group occurs in the reference corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakOccurrence {
    pub track_index: u32,
    pub chunk_index: u32,
}

#[derive(Debug, Default)]
pub struct PeakIndex {
    entries: HashMap<u64, Vec<PeakOccurrence>>,
}

impl PeakIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: u64, occurrence: PeakOccurrence) {
        self.entries.entry(key).or_default().push(occurrence);
    }

    /// Record every group of one reference track.
    pub fn index_track(&mut self, track_index: u32, groups: &[PeakGroup]) {
        for group in groups {
            self.insert(
                group.key(),
                PeakOccurrence {
                    track_index,
                    chunk_index: group.chunk_index,
                },
            );
        }
    }

    pub fn lookup(&self, key: u64) -> &[PeakOccurrence] {
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unknown_key_is_empty() {
        let index = PeakIndex::new();
        assert!(index.lookup(42).is_empty());
    }

    #[test]
    fn test_index_track_records_all_groups() {
        let groups = vec![
            PeakGroup { chunk_index: 0, bands: vec![1, 2] },
            PeakGroup { chunk_index: 9, bands: vec![5] },
        ];

        let mut index = PeakIndex::new();
        index.index_track(3, &groups);

        assert_eq!(index.key_count(), 2);
        let hits = index.lookup(groups[0].key());
        assert_eq!(hits, &[PeakOccurrence { track_index: 3, chunk_index: 0 }]);
    }

    #[test]
    fn test_same_key_accumulates_occurrences() {
        let group = PeakGroup { chunk_index: 4, bands: vec![1] };

        let mut index = PeakIndex::new();
        index.insert(group.key(), PeakOccurrence { track_index: 0, chunk_index: 4 });
        index.insert(group.key(), PeakOccurrence { track_index: 1, chunk_index: 7 });

        assert_eq!(index.lookup(group.key()).len(), 2);
    }
}
