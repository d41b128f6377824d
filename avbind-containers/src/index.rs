//! Per-stream seek index.
//!
//! Entries are kept sorted by timestamp. Once the index grows past its cap it
//! is halved by merging neighbouring entries, preferring key frames, so
//! memory stays bounded on long streams while seek points stay spread across
//! the whole timeline.

use crate::traits::SeekFlags;
use avbind_core::{Error, Result, NO_PTS};
use bitflags::bitflags;

/// Default maximum number of entries per stream.
pub const DEFAULT_INDEX_CAP: usize = 65_536;

bitflags! {
    /// Index entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndexFlags: u32 {
        /// Entry starts at a key frame.
        const KEYFRAME = 0x0001;
    }
}

/// One seek point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Timestamp in the stream time base.
    pub timestamp: i64,
    /// Byte position in the container.
    pub position: i64,
    pub size: u32,
    /// Minimum distance from this entry to the previous key frame, in the
    /// stream time base.
    pub min_distance: i64,
    pub flags: IndexFlags,
}

impl IndexEntry {
    pub fn new(
        timestamp: i64,
        position: i64,
        size: u32,
        min_distance: i64,
        flags: IndexFlags,
    ) -> Self {
        Self {
            timestamp,
            position,
            size,
            min_distance,
            flags,
        }
    }

    /// Key-frame entry with no distance information.
    pub fn key(timestamp: i64, position: i64) -> Self {
        Self::new(timestamp, position, 0, 0, IndexFlags::KEYFRAME)
    }

    pub fn is_key(&self) -> bool {
        self.flags.contains(IndexFlags::KEYFRAME)
    }
}

/// Timestamp-sorted index of seek points.
#[derive(Debug, Clone)]
pub struct StreamIndex {
    entries: Vec<IndexEntry>,
    cap: usize,
}

impl Default for StreamIndex {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_CAP)
    }
}

impl StreamIndex {
    /// Create an index that compacts above `cap` entries.
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap: cap.max(2),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Insert an entry, replacing any entry with the same timestamp.
    pub fn add(&mut self, entry: IndexEntry) -> Result<()> {
        if entry.timestamp == NO_PTS {
            return Err(Error::invalid_arg("index entry needs a timestamp"));
        }
        match self
            .entries
            .binary_search_by_key(&entry.timestamp, |e| e.timestamp)
        {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
        if self.entries.len() > self.cap {
            self.compact();
        }
        Ok(())
    }

    /// Halve the index by merging neighbouring pairs.
    fn compact(&mut self) {
        let before = self.entries.len();
        self.entries = self
            .entries
            .chunks(2)
            .map(|pair| *pair.iter().find(|e| e.is_key()).unwrap_or(&pair[0]))
            .collect();
        tracing::trace!(before, after = self.entries.len(), "compacted stream index");
    }

    /// Position of the entry nearest `target`.
    ///
    /// With [`SeekFlags::BACKWARDS`] the nearest entry at or before the
    /// target, otherwise the nearest at or after it. Without
    /// [`SeekFlags::ANY`] only key-frame entries qualify.
    pub fn search(&self, target: i64, flags: SeekFlags) -> Option<usize> {
        let qualifies = |e: &IndexEntry| flags.contains(SeekFlags::ANY) || e.is_key();
        if flags.contains(SeekFlags::BACKWARDS) {
            let end = self.entries.partition_point(|e| e.timestamp <= target);
            (0..end).rev().find(|&i| qualifies(&self.entries[i]))
        } else {
            let start = self.entries.partition_point(|e| e.timestamp < target);
            (start..self.entries.len()).find(|&i| qualifies(&self.entries[i]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(timestamps: &[i64]) -> StreamIndex {
        let mut index = StreamIndex::default();
        for (i, &ts) in timestamps.iter().enumerate() {
            index.add(IndexEntry::key(ts, i as i64 * 100)).unwrap();
        }
        index
    }

    #[test]
    fn test_search_directions() {
        let index = index_of(&[10, 20, 30]);
        let ts = |pos: Option<usize>| pos.map(|p| index.get(p).unwrap().timestamp);
        assert_eq!(ts(index.search(22, SeekFlags::BACKWARDS)), Some(20));
        assert_eq!(ts(index.search(22, SeekFlags::empty())), Some(30));
        assert_eq!(ts(index.search(5, SeekFlags::empty())), Some(10));
        assert_eq!(ts(index.search(20, SeekFlags::BACKWARDS)), Some(20));
        assert_eq!(index.search(5, SeekFlags::BACKWARDS), None);
        assert_eq!(index.search(31, SeekFlags::empty()), None);
    }

    #[test]
    fn test_non_key_entries_need_any() {
        let mut index = StreamIndex::default();
        index.add(IndexEntry::key(0, 0)).unwrap();
        index
            .add(IndexEntry::new(10, 50, 5, 10, IndexFlags::empty()))
            .unwrap();
        assert_eq!(index.search(10, SeekFlags::BACKWARDS), Some(0));
        assert_eq!(index.search(10, SeekFlags::BACKWARDS | SeekFlags::ANY), Some(1));
        assert_eq!(index.search(5, SeekFlags::empty()), None);
    }

    #[test]
    fn test_equal_timestamp_replaces() {
        let mut index = index_of(&[30, 10, 20]);
        index.add(IndexEntry::key(20, 999)).unwrap();
        let positions: Vec<i64> = index.iter().map(|e| e.position).collect();
        assert_eq!(index.len(), 3);
        assert_eq!(positions, vec![100, 999, 0]);
    }

    #[test]
    fn test_compaction_keeps_key_entries() {
        let mut index = StreamIndex::new(4);
        for ts in 0..5 {
            let flags = if ts % 2 == 1 {
                IndexFlags::KEYFRAME
            } else {
                IndexFlags::empty()
            };
            index.add(IndexEntry::new(ts, ts, 0, 0, flags)).unwrap();
        }
        let kept: Vec<i64> = index.iter().map(|e| e.timestamp).collect();
        assert_eq!(kept, vec![1, 3, 4]);
    }

    #[test]
    fn test_rejects_missing_timestamp() {
        let mut index = StreamIndex::default();
        assert!(index.add(IndexEntry::key(NO_PTS, 0)).is_err());
    }
}
