//! Cross-stream packet interleaving for muxing.

use avbind_core::{ContainerError, Packet, Result, TimeBase, Timestamp, NO_PTS};
use std::collections::VecDeque;

/// Default span the queues may cover before packets are forced out, in
/// microseconds.
pub const DEFAULT_MAX_INTERLEAVE_DELTA: i64 = 10_000_000;

fn order_key(packet: &Packet) -> Timestamp {
    let value = if packet.dts() != NO_PTS {
        packet.dts()
    } else {
        packet.pts()
    };
    Timestamp::new(value, packet.time_base())
}

/// Per-stream packet queues released in dts order across streams.
///
/// A packet leaves once every stream has at least one packet queued, so no
/// earlier packet can still arrive, or once the queued span exceeds the
/// maximum delta.
#[derive(Debug)]
pub struct Interleaver {
    queues: Vec<VecDeque<Packet>>,
    max_delta: i64,
    queued: usize,
}

impl Default for Interleaver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTERLEAVE_DELTA)
    }
}

impl Interleaver {
    /// Create an interleaver; `max_delta` is in microseconds.
    pub fn new(max_delta: i64) -> Self {
        Self {
            queues: Vec::new(),
            max_delta,
            queued: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    /// Queue a packet on its stream. A negative stream index is rejected.
    pub fn push(&mut self, packet: Packet) -> Result<()> {
        let index = packet.stream_index();
        let pos = usize::try_from(index).map_err(|_| ContainerError::StreamNotFound { index })?;
        if self.queues.len() <= pos {
            self.queues.resize_with(pos + 1, VecDeque::new);
        }
        self.queues[pos].push_back(packet);
        self.queued += 1;
        Ok(())
    }

    /// Next packet that may be written, given `num_streams` streams.
    pub fn pop_ready(&mut self, num_streams: usize) -> Option<Packet> {
        if self.queued == 0 {
            return None;
        }
        if self.queues.len() < num_streams {
            self.queues.resize_with(num_streams, VecDeque::new);
        }
        let all_queued = self.queues[..num_streams]
            .iter()
            .all(|queue| !queue.is_empty());
        if all_queued || self.span_exceeded() {
            self.pop_earliest()
        } else {
            None
        }
    }

    /// Release everything in dts order.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut out = Vec::with_capacity(self.queued);
        while let Some(packet) = self.pop_earliest() {
            out.push(packet);
        }
        out
    }

    fn span_exceeded(&self) -> bool {
        let micros = |packet: &Packet| order_key(packet).rescale(TimeBase::MICROSECONDS).to_micros();
        let first = self
            .queues
            .iter()
            .filter_map(|queue| queue.front().and_then(micros))
            .min();
        let last = self
            .queues
            .iter()
            .filter_map(|queue| queue.back().and_then(micros))
            .max();
        match (first, last) {
            (Some(first), Some(last)) => last.saturating_sub(first) > self.max_delta,
            _ => false,
        }
    }

    /// Remove the earliest queued packet regardless of readiness.
    pub fn pop_earliest(&mut self) -> Option<Packet> {
        let mut best: Option<(usize, Timestamp)> = None;
        for (index, queue) in self.queues.iter().enumerate() {
            if let Some(head) = queue.front() {
                let key = order_key(head);
                if best.map_or(true, |(_, current)| key < current) {
                    best = Some((index, key));
                }
            }
        }
        let (index, _) = best?;
        let packet = self.queues[index].pop_front()?;
        self.queued -= 1;
        Some(packet)
    }
}
