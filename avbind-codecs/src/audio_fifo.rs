//! Audio reassembly buffer.
//!
//! Callers hand the encoder audio in whatever chunk sizes they have; codecs
//! want fixed frames. The FIFO accumulates interleaved samples and slices off
//! whole codec frames, tracking the timestamp of the first buffered sample.

use avbind_core::{TimeBase, NO_PTS};
use std::collections::VecDeque;

/// One codec frame taken from the FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Interleaved sample bytes, zero-padded when `valid_samples` is short.
    pub data: Vec<u8>,
    /// Samples in `data` that came from the caller.
    pub valid_samples: usize,
    /// Timestamp of the first sample, in the FIFO's time base.
    pub pts: i64,
}

/// Accumulates interleaved audio and emits fixed-size frames.
#[derive(Debug, Clone)]
pub struct AudioFifo {
    buffer: VecDeque<u8>,
    bytes_per_frame: usize,
    sample_rate: u32,
    time_base: TimeBase,
    /// Timestamp of the first sample that went in after the FIFO was last empty.
    anchor_pts: i64,
    /// Samples consumed since `anchor_pts`.
    consumed_since_anchor: usize,
}

impl AudioFifo {
    /// Create a FIFO for `bytes_per_frame`-byte samples, stamping output in
    /// `time_base`.
    pub fn new(bytes_per_frame: usize, sample_rate: u32, time_base: TimeBase) -> Self {
        Self {
            buffer: VecDeque::new(),
            bytes_per_frame: bytes_per_frame.max(1),
            sample_rate,
            time_base,
            anchor_pts: NO_PTS,
            consumed_since_anchor: 0,
        }
    }

    /// Number of buffered samples.
    pub fn samples_available(&self) -> usize {
        self.buffer.len() / self.bytes_per_frame
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Timestamp of the next sample to leave the FIFO.
    pub fn next_pts(&self) -> i64 {
        if self.anchor_pts == NO_PTS {
            return NO_PTS;
        }
        self.anchor_pts
            .saturating_add(self.samples_to_ticks(self.consumed_since_anchor))
    }

    fn samples_to_ticks(&self, samples: usize) -> i64 {
        match TimeBase::from_sample_rate(self.sample_rate) {
            Ok(sample_tb) => sample_tb.rescale(samples as i64, self.time_base),
            Err(_) => 0,
        }
    }

    /// Append interleaved samples.
    ///
    /// `pts` is only recorded when the FIFO is empty; otherwise the buffered
    /// timeline continues. A trailing partial sample is ignored.
    pub fn push(&mut self, data: &[u8], pts: i64) {
        let whole = data.len() - data.len() % self.bytes_per_frame;
        if whole == 0 {
            return;
        }
        if self.buffer.is_empty() && pts != NO_PTS {
            self.anchor_pts = pts;
            self.consumed_since_anchor = 0;
        }
        self.buffer.extend(&data[..whole]);
    }

    /// Copy out the next full frame of `frame_samples` samples without
    /// consuming it.
    pub fn peek_frame(&self, frame_samples: usize) -> Option<AudioChunk> {
        if frame_samples == 0 || self.samples_available() < frame_samples {
            return None;
        }
        let bytes = frame_samples * self.bytes_per_frame;
        Some(AudioChunk {
            data: self.buffer.range(..bytes).copied().collect(),
            valid_samples: frame_samples,
            pts: self.next_pts(),
        })
    }

    /// Discard up to `samples` buffered samples, advancing the timeline.
    pub fn consume(&mut self, samples: usize) {
        let samples = samples.min(self.samples_available());
        self.buffer.drain(..samples * self.bytes_per_frame);
        self.consumed_since_anchor += samples;
    }

    /// Take one full frame of `frame_samples` samples, if buffered.
    pub fn pop_frame(&mut self, frame_samples: usize) -> Option<AudioChunk> {
        let chunk = self.peek_frame(frame_samples)?;
        self.consume(frame_samples);
        Some(chunk)
    }

    /// Take whatever is left as one zero-padded frame of `frame_samples`.
    pub fn take_partial(&mut self, frame_samples: usize) -> Option<AudioChunk> {
        let valid = self.samples_available();
        if valid == 0 {
            return None;
        }
        let size = frame_samples.max(valid) * self.bytes_per_frame;
        let pts = self.next_pts();
        let mut data = Vec::from(std::mem::take(&mut self.buffer));
        data.resize(size, 0);
        self.consumed_since_anchor += valid;
        Some(AudioChunk {
            data,
            valid_samples: valid,
            pts,
        })
    }

    /// Drop buffered samples and forget the timeline.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.anchor_pts = NO_PTS;
        self.consumed_since_anchor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fifo() -> AudioFifo {
        // Mono s16 at 1 kHz, stamped in milliseconds.
        AudioFifo::new(2, 1000, TimeBase::MILLISECONDS)
    }

    #[test]
    fn test_frames_are_sliced_in_order() {
        let mut f = fifo();
        f.push(&[1, 0, 2, 0, 3, 0], 100);
        assert!(f.pop_frame(4).is_none());
        f.push(&[4, 0, 5, 0], 999);

        let chunk = f.pop_frame(4).unwrap();
        assert_eq!(chunk.data, vec![1, 0, 2, 0, 3, 0, 4, 0]);
        assert_eq!(chunk.pts, 100);
        assert_eq!(f.samples_available(), 1);
        assert_eq!(f.next_pts(), 104);
    }

    #[test]
    fn test_timestamp_only_tagged_when_empty() {
        let mut f = fifo();
        f.push(&[0; 4], 10);
        f.push(&[0; 4], 500);
        assert_eq!(f.pop_frame(1).unwrap().pts, 10);
        assert_eq!(f.pop_frame(3).unwrap().pts, 11);
        assert!(f.is_empty());
        f.push(&[0; 2], 500);
        assert_eq!(f.pop_frame(1).unwrap().pts, 500);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut f = fifo();
        f.push(&[1, 0, 2, 0], 0);
        assert_eq!(f.peek_frame(2).unwrap().pts, 0);
        assert_eq!(f.samples_available(), 2);
        f.consume(2);
        assert!(f.is_empty());
        assert_eq!(f.next_pts(), 2);
    }

    #[test]
    fn test_partial_is_zero_padded() {
        let mut f = fifo();
        f.push(&[7, 7, 8, 8], 0);
        let chunk = f.take_partial(4).unwrap();
        assert_eq!(chunk.valid_samples, 2);
        assert_eq!(chunk.data, vec![7, 7, 8, 8, 0, 0, 0, 0]);
        assert!(f.take_partial(4).is_none());
    }

    #[test]
    fn test_trailing_partial_sample_ignored() {
        let mut f = AudioFifo::new(4, 1000, TimeBase::MILLISECONDS);
        f.push(&[1, 2, 3, 4, 5], 0);
        assert_eq!(f.samples_available(), 1);
    }

    #[test]
    fn test_no_drift_at_fractional_tick() {
        // 44.1 kHz stamped in 1/1000: 441 samples per 10 ms.
        let mut f = AudioFifo::new(2, 44100, TimeBase::MILLISECONDS);
        f.push(&vec![0u8; 441 * 2 * 100], 0);
        let mut last = 0;
        while let Some(chunk) = f.pop_frame(441) {
            last = chunk.pts;
        }
        assert_eq!(last, 990);
    }

    #[test]
    fn test_large_push_drains_frame_by_frame() {
        let mut f = fifo();
        let data: Vec<u8> = (0..4000u32).flat_map(|i| [(i % 251) as u8, 0]).collect();
        f.push(&data, 0);
        let mut out = Vec::new();
        let mut frames = 0;
        while let Some(chunk) = f.pop_frame(160) {
            assert_eq!(chunk.pts, frames * 160);
            out.extend(chunk.data);
            frames += 1;
        }
        assert_eq!(frames, 25);
        assert_eq!(out, data);

        f.push(&[9, 0, 8, 0], NO_PTS);
        let tail = f.take_partial(4).unwrap();
        assert_eq!(tail.pts, 4000);
        assert_eq!(tail.data, vec![9, 0, 8, 0, 0, 0, 0, 0]);
    }
}
