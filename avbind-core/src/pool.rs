//! Buffer pool for storage reuse.
//!
//! Buffers handed out by a [`BufferPool`] return their storage to the pool
//! when the last holder drops them, so steady-state packet and frame traffic
//! stops hitting the allocator.

use crate::buffer::{allocate_storage, Buffer, Recycle};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Storages allocated fresh.
    pub allocated: usize,
    /// Acquisitions served from recycled storage.
    pub reused: usize,
    /// Storages returned by dropped buffers.
    pub recycled: usize,
    /// Buffers currently held by callers.
    pub outstanding: usize,
}

struct PoolState {
    available: Vec<Box<[u8]>>,
    stats: PoolStats,
}

struct PoolShared {
    buffer_size: usize,
    max_pooled: usize,
    max_outstanding: usize,
    state: Mutex<PoolState>,
}

impl Recycle for PoolShared {
    fn recycle(&self, storage: Box<[u8]>) {
        let mut state = self.state.lock();
        state.stats.outstanding = state.stats.outstanding.saturating_sub(1);
        state.stats.recycled += 1;
        if storage.len() == self.buffer_size && state.available.len() < self.max_pooled {
            state.available.push(storage);
        }
    }
}

/// A thread-safe pool of fixed-size owned buffers.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool of `buffer_size`-byte buffers keeping at most
    /// `max_pooled` idle storages.
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self::with_ceiling(buffer_size, max_pooled, usize::MAX)
    }

    /// Like [`BufferPool::new`], also limiting how many buffers may be held
    /// by callers at once.
    pub fn with_ceiling(buffer_size: usize, max_pooled: usize, max_outstanding: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                buffer_size,
                max_pooled,
                max_outstanding,
                state: Mutex::new(PoolState {
                    available: Vec::with_capacity(max_pooled.min(64)),
                    stats: PoolStats::default(),
                }),
            }),
        }
    }

    /// Acquire a zeroed buffer, reusing pooled storage when possible.
    pub fn acquire(&self) -> Result<Buffer> {
        let size = self.shared.buffer_size;
        let recycled = {
            let mut state = self.shared.state.lock();
            if state.stats.outstanding >= self.shared.max_outstanding {
                return Err(Error::OutOfMemory {
                    requested: size,
                    ceiling: self.shared.max_outstanding.saturating_mul(size),
                });
            }
            let storage = state.available.pop();
            if storage.is_some() {
                state.stats.reused += 1;
            }
            state.stats.outstanding += 1;
            storage
        };

        let storage = match recycled {
            Some(mut storage) => {
                storage.fill(0);
                storage
            }
            None => match allocate_storage(size) {
                Ok(storage) => {
                    self.shared.state.lock().stats.allocated += 1;
                    trace!(size, "pool allocated new storage");
                    storage
                }
                Err(e) => {
                    let mut state = self.shared.state.lock();
                    state.stats.outstanding = state.stats.outstanding.saturating_sub(1);
                    return Err(e);
                }
            },
        };

        let shared: Arc<PoolShared> = Arc::clone(&self.shared);
        let weak: Weak<dyn Recycle> = Arc::downgrade(&shared) as Weak<dyn Recycle>;
        Ok(Buffer::pooled(storage, weak))
    }

    /// Size of every buffer handed out.
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    /// Number of idle storages ready for reuse.
    pub fn available(&self) -> usize {
        self.shared.state.lock().available.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats
    }

    /// Drop all idle storages.
    pub fn clear(&self) {
        self.shared.state.lock().available.clear();
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.shared.buffer_size)
            .field("stats", &self.stats())
            .finish()
    }
}
