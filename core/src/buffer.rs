//! Pooled transient byte buffers with an explicit use count.
//!
//! # Design
//! A `BufferPool` hands out `Buffer`s whose owner holds one use. Code that
//! needs the contents for a bounded stretch takes a `Lease`, which adds a use
//! and gives it back when dropped. Release lives in `Drop`, so every exit path
//! (normal return, `?`, unwinding) balances the count without the leasing code
//! having to remember it. When the last use goes away the storage is cleared
//! and parked in the pool for the next request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};

const DEFAULT_CAPACITY: usize = 4 * 1024;
const DEFAULT_MAX_IDLE: usize = 32;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Source of reusable byte storage. Cloning shares the same pool.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    idle: Mutex<Vec<BytesMut>>,
    capacity: usize,
    max_idle: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_MAX_IDLE)
    }

    /// `capacity` is the initial size of freshly allocated storage;
    /// `max_idle` bounds how many released buffers are kept for reuse.
    pub fn with_limits(capacity: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                capacity,
                max_idle,
            }),
        }
    }

    /// Take an empty buffer with a use count of one.
    pub fn acquire(&self) -> Buffer {
        let bytes = lock(&self.inner.idle)
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.inner.capacity));
        Buffer {
            shared: Arc::new(Shared {
                bytes: Mutex::new(bytes),
                uses: AtomicUsize::new(1),
                pool: self.clone(),
            }),
        }
    }

    /// Take a buffer pre-filled with `src`.
    pub fn acquire_from(&self, src: &[u8]) -> Buffer {
        let buffer = self.acquire();
        lock(&buffer.shared.bytes).extend_from_slice(src);
        buffer
    }

    /// Number of released buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        lock(&self.inner.idle).len()
    }

    fn recycle(&self, mut bytes: BytesMut) {
        bytes.clear();
        let mut idle = lock(&self.inner.idle);
        if idle.len() < self.inner.max_idle {
            idle.push(bytes);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared {
    bytes: Mutex<BytesMut>,
    uses: AtomicUsize,
    pool: BufferPool,
}

impl Shared {
    fn retain(&self) {
        self.uses.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        let previous = self.uses.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "buffer released more often than retained");
        if previous == 1 {
            let bytes = std::mem::take(&mut *lock(&self.bytes));
            self.pool.recycle(bytes);
        }
    }
}

/// A pooled byte buffer. Dropping it releases the owner's use.
pub struct Buffer {
    shared: Arc<Shared>,
}

impl Buffer {
    /// Current number of outstanding uses, owner included.
    pub fn use_count(&self) -> usize {
        self.shared.uses.load(Ordering::Acquire)
    }

    /// Retain the buffer until the returned lease is dropped.
    pub fn lease(&self) -> Lease<'_> {
        self.shared.retain();
        Lease {
            shared: &self.shared,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.bytes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the contents out so the storage can go back to the pool.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&lock(&self.shared.bytes))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("uses", &self.use_count())
            .finish()
    }
}

/// A scoped use of a `Buffer`, released on drop.
pub struct Lease<'a> {
    shared: &'a Shared,
}

impl Lease<'_> {
    /// Access the contents. Hold the guard only for the duration of one
    /// read or write.
    pub fn bytes(&self) -> MutexGuard<'_, BytesMut> {
        lock(&self.shared.bytes)
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.shared.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn lease_is_released_on_drop() {
        let pool = BufferPool::new();
        let buffer = pool.acquire();
        assert_eq!(buffer.use_count(), 1);
        {
            let _lease = buffer.lease();
            assert_eq!(buffer.use_count(), 2);
        }
        assert_eq!(buffer.use_count(), 1);
    }

    #[test]
    fn lease_is_released_on_early_error_return() {
        fn fails(buffer: &Buffer) -> Result<(), String> {
            let lease = buffer.lease();
            lease.bytes().extend_from_slice(b"\xff\xfe");
            let bytes = lease.bytes();
            std::str::from_utf8(&bytes).map_err(|e| e.to_string())?;
            Ok(())
        }

        let pool = BufferPool::new();
        let buffer = pool.acquire();
        assert!(fails(&buffer).is_err());
        assert_eq!(buffer.use_count(), 1);
    }

    #[test]
    fn lease_is_released_when_unwinding() {
        let pool = BufferPool::new();
        let buffer = pool.acquire();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let lease = buffer.lease();
            let _guard = lease.bytes();
            panic!("serializer blew up");
        }));
        assert!(result.is_err());
        assert_eq!(buffer.use_count(), 1);
        // Poisoned storage stays readable.
        assert!(buffer.is_empty());
    }

    #[test]
    fn last_release_returns_storage_to_pool() {
        let pool = BufferPool::new();
        let buffer = pool.acquire_from(b"payload");
        assert_eq!(buffer.len(), 7);
        assert_eq!(pool.idle(), 0);
        drop(buffer);
        assert_eq!(pool.idle(), 1);

        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn pool_keeps_at_most_max_idle() {
        let pool = BufferPool::with_limits(16, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn to_bytes_copies_contents() {
        let pool = BufferPool::new();
        let buffer = pool.acquire_from(b"abc");
        let bytes = buffer.to_bytes();
        drop(buffer);
        assert_eq!(&bytes[..], b"abc");
    }
}
