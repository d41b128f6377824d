//! Timestamp reconstruction for codecs that emit units out of display order.

use avbind_core::NO_PTS;
use std::collections::VecDeque;

/// Sorted window of the last `delay + 1` emitted pts values.
///
/// For an engine that reports pts but no dts, feeding each emitted pts in
/// decode order yields a dts that is non-decreasing and never above the pts.
/// Before the window fills, missing slots are synthesized one frame duration
/// apart ending just before the first pts.
#[derive(Debug, Clone)]
pub struct PtsRing {
    slots: Vec<i64>,
}

impl PtsRing {
    /// Create a ring for the given reorder delay.
    pub fn new(delay: usize) -> Self {
        Self {
            slots: vec![NO_PTS; delay + 1],
        }
    }

    /// Number of slots (`delay + 1`).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn delay(&self) -> usize {
        self.slots.len() - 1
    }

    /// Record an emitted pts and return the dts to give it.
    pub fn next_dts(&mut self, pts: i64, duration: i64) -> i64 {
        let delay = self.delay();
        self.slots[0] = pts;
        let mut i = 1;
        while i <= delay && self.slots[i] == NO_PTS {
            self.slots[i] = pts.saturating_add((i as i64 - delay as i64 - 1) * duration);
            i += 1;
        }
        let mut i = 0;
        while i < delay && self.slots[i] > self.slots[i + 1] {
            self.slots.swap(i, i + 1);
            i += 1;
        }
        self.slots[0]
    }

    pub fn reset(&mut self) {
        self.slots.fill(NO_PTS);
    }
}

/// Pts values submitted to an engine and not yet seen on output.
///
/// Bounded to `delay + 1` entries; the oldest entry is evicted when full.
#[derive(Debug, Clone)]
pub struct PendingPts {
    entries: VecDeque<i64>,
    capacity: usize,
}

impl PendingPts {
    pub fn new(delay: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(delay + 1),
            capacity: delay + 1,
        }
    }

    /// Remember a submitted pts, returning the entry evicted to make room.
    pub fn push(&mut self, pts: i64) -> Option<i64> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(pts);
        evicted
    }

    /// Remove and return the entry equal to `ts`.
    pub fn take(&mut self, ts: i64) -> Option<i64> {
        let pos = self.entries.iter().position(|&p| p == ts)?;
        self.entries.remove(pos)
    }

    /// Remove and return the oldest entry.
    pub fn take_oldest(&mut self) -> Option<i64> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_capacity() {
        assert_eq!(PtsRing::new(0).capacity(), 1);
        assert_eq!(PtsRing::new(2).capacity(), 3);
    }

    #[test]
    fn test_zero_delay_dts_equals_pts() {
        let mut ring = PtsRing::new(0);
        for pts in [0, 1, 2, 5] {
            assert_eq!(ring.next_dts(pts, 1), pts);
        }
    }

    #[test]
    fn test_one_b_frame() {
        // Decode order I0 P2 B1 P4 B3 P5.
        let mut ring = PtsRing::new(1);
        let dts: Vec<i64> = [0, 2, 1, 4, 3, 5]
            .into_iter()
            .map(|pts| ring.next_dts(pts, 1))
            .collect();
        assert_eq!(dts, vec![-1, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_two_b_frames() {
        // Decode order I0 P3 B1 B2 P6 B4 B5.
        let mut ring = PtsRing::new(2);
        let order = [0, 3, 1, 2, 6, 4, 5];
        let dts: Vec<i64> = order.iter().map(|&pts| ring.next_dts(pts * 10, 10)).collect();
        assert!(dts.windows(2).all(|w| w[0] < w[1]), "{dts:?}");
        for (pts, dts) in order.iter().zip(&dts) {
            assert!(*dts <= pts * 10);
        }
    }

    #[test]
    fn test_pending_eviction_and_take() {
        let mut pending = PendingPts::new(1);
        assert_eq!(pending.push(10), None);
        assert_eq!(pending.push(20), None);
        assert_eq!(pending.push(30), Some(10));
        assert_eq!(pending.take(30), Some(30));
        assert_eq!(pending.take(99), None);
        assert_eq!(pending.take_oldest(), Some(20));
        assert!(pending.is_empty());
    }
}
