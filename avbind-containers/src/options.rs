//! Container session options.

use crate::index::DEFAULT_INDEX_CAP;
use crate::interleave::DEFAULT_MAX_INTERLEAVE_DELTA;
use crate::traits::ContainerFlags;
use avbind_codecs::CodecRegistry;
use avbind_core::{Error, Interrupt, Result};

/// Default number of packets `query_stream_metadata` reads before giving up.
pub const DEFAULT_PROBE_PACKET_LIMIT: usize = 500;

/// Options for a container session, built with chained setters.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Retries of a transiently failing read. Negative retries forever.
    pub read_retry_count: i32,
    /// Span the interleave queues may cover, in microseconds.
    pub max_interleave_delta: i64,
    /// Packets read ahead while probing stream metadata.
    pub probe_packet_limit: usize,
    /// Maximum seek index entries per stream.
    pub index_cap: usize,
    pub flags: ContainerFlags,
    /// Cancels long operations.
    pub interrupt: Option<Interrupt>,
    /// Supplies decoder engines for streams found while reading.
    pub registry: Option<CodecRegistry>,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_retry_count: 1,
            max_interleave_delta: DEFAULT_MAX_INTERLEAVE_DELTA,
            probe_packet_limit: DEFAULT_PROBE_PACKET_LIMIT,
            index_cap: DEFAULT_INDEX_CAP,
            flags: ContainerFlags::empty(),
            interrupt: None,
            registry: None,
        }
    }

    #[must_use]
    pub fn read_retry_count(mut self, count: i32) -> Self {
        self.read_retry_count = count;
        self
    }

    /// Set the interleave span in microseconds.
    #[must_use]
    pub fn max_interleave_delta(mut self, micros: i64) -> Self {
        self.max_interleave_delta = micros;
        self
    }

    #[must_use]
    pub fn probe_packet_limit(mut self, limit: usize) -> Self {
        self.probe_packet_limit = limit;
        self
    }

    #[must_use]
    pub fn index_cap(mut self, cap: usize) -> Self {
        self.index_cap = cap;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: ContainerFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Check the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_interleave_delta < 0 {
            return Err(Error::invalid_config(format!(
                "interleave delta must not be negative, got {}",
                self.max_interleave_delta
            )));
        }
        if self.probe_packet_limit == 0 {
            return Err(Error::invalid_config("probe packet limit must be positive"));
        }
        if self.index_cap < 2 {
            return Err(Error::invalid_config(format!(
                "index cap must hold at least 2 entries, got {}",
                self.index_cap
            )));
        }
        Ok(())
    }

    /// Fail with `Interrupted` if cancellation was requested.
    pub(crate) fn check_interrupt(&self) -> Result<()> {
        match &self.interrupt {
            Some(interrupt) => interrupt.check(),
            None => Ok(()),
        }
    }
}
