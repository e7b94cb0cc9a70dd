// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-node frame cache with in-flight de-duplication.
//!
//! Every node owns one [`FrameCache`]. A slot is created the first time a frame
//! index is requested; concurrent requests for the same index share the slot and
//! the frame is produced exactly once. A failed production leaves the slot empty,
//! so the next request retries instead of replaying the error.
//!
//! Slots are kept in least-recently-used order. When the cache is over capacity the
//! oldest slot is dropped from the index; anyone still waiting on it keeps its own
//! handle and completes normally.

use crate::frame::Frame;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

pub type FrameSlot = Arc<OnceCell<Frame>>;

#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    slots: Mutex<IndexMap<i32, FrameSlot>>,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), slots: Mutex::new(IndexMap::new()) }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the slot for frame `n`, creating it if needed, and marks it most recently used.
    pub fn slot(&self, n: i32) -> FrameSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(idx) = slots.get_index_of(&n) {
            let last = slots.len() - 1;
            slots.move_index(idx, last);
            return Arc::clone(&slots[last]);
        }

        let slot = FrameSlot::default();
        slots.insert(n, Arc::clone(&slot));
        while slots.len() > self.capacity {
            if let Some((evicted, _)) = slots.shift_remove_index(0) {
                tracing::trace!(frame = evicted, "Evicted frame from cache");
            }
        }
        slot
    }

    /// The cached frame `n`, if it has been produced and not evicted.
    pub fn get(&self, n: i32) -> Option<Frame> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(&n).and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, n: i32) -> bool {
        self.get(n).is_some()
    }

    /// Number of slots, including ones whose frame is still being produced.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::format::PresetFormat;
    use crate::frame::FrameBuilder;

    fn frame() -> Frame {
        FrameBuilder::new(PresetFormat::Gray8.format(), 4, 4).freeze()
    }

    #[test]
    fn same_index_shares_slot() {
        let cache = FrameCache::new(4);
        let a = cache.slot(3);
        let b = cache.slot(3);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!cache.contains(3));

        a.set(frame()).unwrap();
        assert!(cache.contains(3));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = FrameCache::new(2);
        cache.slot(0).set(frame()).unwrap();
        cache.slot(1).set(frame()).unwrap();
        // Touch 0 so 1 becomes the oldest.
        let _ = cache.slot(0);
        cache.slot(2).set(frame()).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
    }

    #[tokio::test]
    async fn failed_init_is_not_cached() {
        let cache = FrameCache::new(2);
        let slot = cache.slot(5);
        let failed: Result<&Frame, &str> = slot.get_or_try_init(|| async { Err("boom") }).await;
        assert!(failed.is_err());
        assert!(!cache.contains(5));

        let slot = cache.slot(5);
        let ok: Result<&Frame, &str> = slot.get_or_try_init(|| async { Ok(frame()) }).await;
        assert!(ok.is_ok());
        assert!(cache.contains(5));
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let cache = FrameCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.slot(1);
        cache.slot(2);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
