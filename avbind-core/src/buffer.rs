//! Reference-counted byte buffers.
//!
//! A [`Buffer`] either owns storage it allocated itself or views memory that
//! belongs to someone else. Holders share it through an atomic reference
//! count; it is only writable while a single holder remains, and only when it
//! owns its storage.

use crate::error::{Error, Result};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Default process-wide ceiling for a single allocation (1 GiB).
pub const DEFAULT_ALLOCATION_CEILING: usize = 1 << 30;

static ALLOCATION_CEILING: AtomicUsize = AtomicUsize::new(DEFAULT_ALLOCATION_CEILING);

/// Set the largest allocation [`Buffer::allocate`] will attempt.
pub fn set_allocation_ceiling(bytes: usize) {
    ALLOCATION_CEILING.store(bytes, Ordering::Relaxed);
}

/// Current allocation ceiling in bytes.
pub fn allocation_ceiling() -> usize {
    ALLOCATION_CEILING.load(Ordering::Relaxed)
}

/// Who is responsible for the memory behind a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferOwnership {
    /// Allocated by the buffer and released (or recycled) with the last holder.
    Owned,
    /// Caller memory; never freed by the buffer.
    Borrowed,
}

/// Receives owned storage back when the last holder drops a pooled buffer.
pub(crate) trait Recycle: Send + Sync {
    fn recycle(&self, storage: Box<[u8]>);
}

struct RawRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// The creator of a raw region promises the memory stays valid and unmodified
// for as long as any holder exists.
unsafe impl Send for RawRegion {}
unsafe impl Sync for RawRegion {}

enum Storage {
    Owned(Box<[u8]>),
    Wrapped(Box<dyn AsRef<[u8]> + Send + Sync>),
    Raw(RawRegion),
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(data) => data,
            Storage::Wrapped(owner) => (**owner).as_ref(),
            // SAFETY: guaranteed by the contract of `Buffer::from_raw_parts`.
            Storage::Raw(region) => unsafe {
                std::slice::from_raw_parts(region.ptr.as_ptr(), region.len)
            },
        }
    }
}

struct Inner {
    storage: Storage,
    len: usize,
    recycler: Option<Weak<dyn Recycle>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let (Storage::Owned(data), Some(recycler)) = (&mut self.storage, &self.recycler) {
            if let Some(pool) = recycler.upgrade() {
                pool.recycle(std::mem::take(data));
            }
        }
    }
}

/// A shared, immutable-once-shared byte region.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<Inner>,
}

impl Buffer {
    /// Allocate `len` zeroed bytes owned by the buffer.
    pub fn allocate(len: usize) -> Result<Self> {
        let data = allocate_storage(len)?;
        Ok(Self::from_storage(Storage::Owned(data), len, None))
    }

    /// Take ownership of an existing vector without copying.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self::from_storage(Storage::Owned(data.into_boxed_slice()), len, None)
    }

    /// View memory held by `owner` without copying.
    ///
    /// The owner is kept alive by the buffer and dropped with the last holder.
    pub fn wrap<T>(owner: T) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        let len = owner.as_ref().len();
        Self::from_storage(Storage::Wrapped(Box::new(owner)), len, None)
    }

    /// View engine-managed memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes, and the memory must stay
    /// valid and unmodified until every clone of the returned buffer is gone.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self::from_storage(Storage::Raw(RawRegion { ptr, len }), len, None)
    }

    pub(crate) fn pooled(data: Box<[u8]>, recycler: Weak<dyn Recycle>) -> Self {
        let len = data.len();
        Self::from_storage(Storage::Owned(data), len, Some(recycler))
    }

    fn from_storage(storage: Storage, len: usize, recycler: Option<Weak<dyn Recycle>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                len,
                recycler,
            }),
        }
    }

    /// Explicit deep copy of the valid bytes into a new owned buffer.
    pub fn copy(&self) -> Result<Self> {
        let mut copy = Self::allocate(self.len())?;
        copy.data_mut()?.copy_from_slice(self.data());
        Ok(copy)
    }

    /// Drop this holder's reference.
    pub fn release(self) {
        drop(self);
    }

    /// Number of holders sharing the storage.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Check if this is the only holder.
    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }

    pub fn ownership(&self) -> BufferOwnership {
        match self.inner.storage {
            Storage::Owned(_) => BufferOwnership::Owned,
            Storage::Wrapped(_) | Storage::Raw(_) => BufferOwnership::Borrowed,
        }
    }

    /// Total bytes available in the underlying region.
    pub fn capacity(&self) -> usize {
        self.inner.storage.bytes().len()
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Change the number of valid bytes.
    ///
    /// Only allowed while this is the only holder, and never above capacity.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        let capacity = self.capacity();
        if len > capacity {
            return Err(Error::invalid_arg(format!(
                "length {len} exceeds buffer capacity {capacity}"
            )));
        }
        let inner = Arc::get_mut(&mut self.inner)
            .ok_or_else(|| Error::invalid_state("cannot resize a shared buffer"))?;
        inner.len = len;
        Ok(())
    }

    /// The valid bytes.
    pub fn data(&self) -> &[u8] {
        &self.inner.storage.bytes()[..self.inner.len]
    }

    /// Mutable access to the valid bytes.
    ///
    /// Fails with `InvalidState` when the buffer is shared or borrowed.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let inner = Arc::get_mut(&mut self.inner)
            .ok_or_else(|| Error::invalid_state("cannot write to a shared buffer"))?;
        let len = inner.len;
        match &mut inner.storage {
            Storage::Owned(data) => Ok(&mut data[..len]),
            _ => Err(Error::invalid_state("cannot write to borrowed memory")),
        }
    }

    /// Check if two handles share the same storage.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("ownership", &self.ownership())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Allocate zeroed storage, honouring the process-wide ceiling.
pub(crate) fn allocate_storage(len: usize) -> Result<Box<[u8]>> {
    let ceiling = allocation_ceiling();
    if len > ceiling {
        return Err(Error::OutOfMemory {
            requested: len,
            ceiling,
        });
    }
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
        requested: len,
        ceiling,
    })?;
    data.resize(len, 0);
    Ok(data.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_zeroed() {
        let buf = Buffer::allocate(64).unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(buf.capacity(), 64);
        assert!(buf.data().iter().all(|&b| b == 0));
        assert_eq!(buf.ownership(), BufferOwnership::Owned);
    }

    #[test]
    fn test_allocate_above_ceiling() {
        let err = Buffer::allocate(DEFAULT_ALLOCATION_CEILING + 1).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { .. }));
    }

    #[test]
    fn test_shared_buffer_is_read_only() {
        let mut a = Buffer::allocate(8).unwrap();
        a.data_mut().unwrap()[0] = 7;
        let b = a.clone();
        assert_eq!(a.ref_count(), 2);
        assert!(matches!(a.data_mut(), Err(Error::InvalidState(_))));
        assert!(a.set_len(4).is_err());
        b.release();
        assert_eq!(a.ref_count(), 1);
        a.set_len(4).unwrap();
        assert_eq!(a.data(), &[7, 0, 0, 0]);
    }

    #[test]
    fn test_set_len_bounds() {
        let mut a = Buffer::allocate(8).unwrap();
        assert!(matches!(a.set_len(9), Err(Error::InvalidArgument(_))));
        a.set_len(0).unwrap();
        assert!(a.is_empty());
        a.set_len(8).unwrap();
    }

    #[test]
    fn test_wrap_does_not_copy() {
        let owner: Arc<[u8]> = Arc::from(vec![1u8, 2, 3]);
        let buf = Buffer::wrap(Arc::clone(&owner));
        assert_eq!(buf.ownership(), BufferOwnership::Borrowed);
        assert_eq!(buf.data().as_ptr(), owner.as_ptr());
    }

    #[test]
    fn test_borrowed_is_not_writable() {
        let mut buf = Buffer::wrap(vec![1u8, 2, 3]);
        assert!(matches!(buf.data_mut(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_raw_parts() {
        let backing = vec![9u8; 16];
        let ptr = NonNull::new(backing.as_ptr() as *mut u8).unwrap();
        let buf = unsafe { Buffer::from_raw_parts(ptr, backing.len()) };
        assert_eq!(buf.data(), &backing[..]);
        assert_eq!(buf.ownership(), BufferOwnership::Borrowed);
        drop(buf);
        assert_eq!(backing[0], 9);
    }

    #[test]
    fn test_copy_is_independent() {
        let a = Buffer::wrap(b"hello".to_vec());
        let mut b = a.copy().unwrap();
        b.data_mut().unwrap()[0] = b'j';
        assert_eq!(a.data(), b"hello");
        assert_eq!(b.data(), b"jello");
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
