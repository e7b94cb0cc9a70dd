// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Bucketed buffer pool for frame storage.
//!
//! Legacy filters allocate a fresh frame for nearly every output frame, almost
//! always with the same geometry. The pool keeps a bounded number of released
//! buffers per size bucket so steady-state rendering stops hitting the allocator.
//!
//! - buckets are fixed at construction and sorted by size
//! - a request is served from the smallest bucket that fits it
//! - [`PooledBuffer`] hands its storage back on drop, unless the bucket is full
//!   or the pool itself is gone

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Bucket sizes used by [`FramePool::plane_default`], in bytes.
///
/// Chosen around common luma plane sizes (SD, 720p, 1080p, UHD) plus a small
/// bucket for chroma planes and thumbnails.
pub const DEFAULT_PLANE_BUCKET_SIZES: &[usize] =
    &[64 * 1024, 512 * 1024, 1024 * 1024, 2304 * 1024, 8448 * 1024, 33_177_600];

/// Released buffers kept per bucket by [`FramePool::plane_default`].
pub const DEFAULT_BUFFERS_PER_BUCKET: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub buckets: Vec<BucketStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
    pub bucket_size: usize,
    pub available: usize,
    pub max_per_bucket: usize,
}

struct Bucket<T> {
    size: usize,
    free: Vec<Vec<T>>,
}

struct PoolInner<T> {
    buckets: Vec<Bucket<T>>,
    max_per_bucket: usize,
    hits: u64,
    misses: u64,
}

impl<T> PoolInner<T> {
    fn fitting_bucket(&self, min_len: usize) -> Option<usize> {
        self.buckets.iter().position(|b| b.size >= min_len)
    }
}

/// Thread-safe pool of `Vec<T>` buffers. Cloning yields another handle to the same pool.
pub struct FramePool<T> {
    inner: Arc<Mutex<PoolInner<T>>>,
}

impl<T> Clone for FramePool<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> std::fmt::Debug for FramePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool").field("stats", &self.stats()).finish()
    }
}

impl<T> FramePool<T> {
    /// Creates an empty pool. Buffers are allocated lazily and retained on release.
    pub fn with_buckets(mut bucket_sizes: Vec<usize>, max_per_bucket: usize) -> Self {
        bucket_sizes.sort_unstable();
        bucket_sizes.dedup();
        let buckets = bucket_sizes.into_iter().map(|size| Bucket { size, free: Vec::new() }).collect();
        Self {
            inner: Arc::new(Mutex::new(PoolInner { buckets, max_per_bucket, hits: 0, misses: 0 })),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        PoolStats {
            hits: guard.hits,
            misses: guard.misses,
            buckets: guard
                .buckets
                .iter()
                .map(|b| BucketStats {
                    bucket_size: b.size,
                    available: b.free.len(),
                    max_per_bucket: guard.max_per_bucket,
                })
                .collect(),
        }
    }
}

impl<T: Clone + Default> FramePool<T> {
    /// Returns a buffer of `len` elements, every one reset to `T::default()`.
    ///
    /// Requests larger than the biggest bucket get an unpooled buffer of exact size.
    pub fn get(&self, len: usize) -> PooledBuffer<T> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(idx) = guard.fitting_bucket(len) else {
            guard.misses += 1;
            return PooledBuffer::unpooled(vec![T::default(); len]);
        };

        let size = guard.buckets[idx].size;
        let recycled = guard.buckets[idx].free.pop();
        if recycled.is_some() {
            guard.hits += 1;
        } else {
            guard.misses += 1;
        }
        drop(guard);

        let mut data = recycled.unwrap_or_else(|| vec![T::default(); size]);
        data[..len].fill(T::default());
        PooledBuffer { data, len, home: Some((Arc::downgrade(&self.inner), idx)) }
    }
}

impl FramePool<u8> {
    /// A lazily populated byte pool sized for video planes.
    pub fn plane_default() -> Self {
        Self::with_buckets(DEFAULT_PLANE_BUCKET_SIZES.to_vec(), DEFAULT_BUFFERS_PER_BUCKET)
    }
}

/// A buffer borrowed from a [`FramePool`].
///
/// Derefs to the first `len()` elements; the backing storage may be larger.
pub struct PooledBuffer<T> {
    data: Vec<T>,
    len: usize,
    home: Option<(Weak<Mutex<PoolInner<T>>>, usize)>,
}

impl<T> PooledBuffer<T> {
    /// Wraps a plain vector. It is simply freed on drop.
    pub fn unpooled(data: Vec<T>) -> Self {
        let len = data.len();
        Self { data, len, home: None }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn storage_len(&self) -> usize {
        self.data.len()
    }

    pub const fn is_pooled(&self) -> bool {
        self.home.is_some()
    }
}

impl<T> Deref for PooledBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data[..self.len]
    }
}

impl<T> DerefMut for PooledBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }
}

impl<T> std::fmt::Debug for PooledBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .field("storage_len", &self.data.len())
            .field("pooled", &self.home.is_some())
            .finish()
    }
}

impl<T> Drop for PooledBuffer<T> {
    fn drop(&mut self) {
        let Some((pool, idx)) = self.home.take() else { return };
        let Some(inner) = pool.upgrade() else { return };
        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let max = guard.max_per_bucket;
        let Some(bucket) = guard.buckets.get_mut(idx) else { return };
        if bucket.size != self.data.len() || bucket.free.len() >= max {
            return;
        }
        bucket.free.push(std::mem::take(&mut self.data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_to_pool_on_drop() {
        let pool = FramePool::<u8>::with_buckets(vec![16], 1);
        assert_eq!(pool.stats().buckets[0].available, 0);

        {
            let mut buf = pool.get(10);
            assert_eq!(buf.len(), 10);
            assert_eq!(buf.storage_len(), 16);
            assert!(buf.is_pooled());
            buf.fill(7);
        }
        assert_eq!(pool.stats().buckets[0].available, 1);

        // Recycled storage comes back zeroed.
        let again = pool.get(10);
        assert!(again.iter().all(|&b| b == 0));
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().misses, 1);
    }

    #[test]
    fn oversized_requests_bypass_pool() {
        let pool = FramePool::<u8>::with_buckets(vec![8], 4);
        let big = pool.get(9);
        assert!(!big.is_pooled());
        assert_eq!(big.len(), 9);
        drop(big);
        assert_eq!(pool.stats().buckets[0].available, 0);
    }

    #[test]
    fn bucket_capacity_is_bounded() {
        let pool = FramePool::<u8>::with_buckets(vec![4], 1);
        let a = pool.get(4);
        let b = pool.get(4);
        drop(a);
        drop(b);
        assert_eq!(pool.stats().buckets[0].available, 1);
    }

    #[test]
    fn buffers_outlive_pool() {
        let pool = FramePool::<u8>::plane_default();
        let buf = pool.get(100);
        drop(pool);
        assert_eq!(buf.len(), 100);
    }
}
