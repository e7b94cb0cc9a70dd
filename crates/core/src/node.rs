// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Graph nodes and frame requests.
//!
//! This module defines the interface between the graph engine and anything that
//! produces frames:
//! - [`FrameSource`]: the trait a node implementation provides
//! - [`NodeRef`]: a cheap, cloneable handle the engine and other nodes hold
//! - [`FrameContext`]: the per-request token that collects upstream prefetches
//!
//! A request for frame `n` flows through [`NodeRef::get_frame`], which consults the
//! node's [`FrameCache`] and calls [`FrameSource::get_frame`] only if no other task
//! is already producing that frame. Sources that depend on upstream nodes issue
//! [`NodeRef::request_frame`] for every frame they will need, then await
//! [`FrameContext::wait_for_requests`] before doing their own work, so upstream
//! frames are produced in parallel on the runtime's workers.

use crate::cache::FrameCache;
use crate::error::{BridgeError, Result};
use crate::format::VideoInfo;
use crate::frame::Frame;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::RuntimeFlavor;
use tokio::task::JoinHandle;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REQUEST_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Something that can produce frames of a fixed [`VideoInfo`].
///
/// Implementations must be thread-safe: the engine may call `get_frame` for
/// different frame indices concurrently from any worker. The same index is never
/// requested twice at once through a [`NodeRef`].
#[async_trait]
pub trait FrameSource: Any + Send + Sync {
    fn video_info(&self) -> &VideoInfo;

    /// Produces frame `n`. `n` is always inside `0..num_frames`.
    async fn get_frame(&self, n: i32, ctx: &FrameContext) -> Result<Frame>;
}

struct NodeInner {
    id: u64,
    name: String,
    video_info: VideoInfo,
    source: Arc<dyn FrameSource>,
    cache: FrameCache,
}

/// Shared handle to a graph node.
#[derive(Clone)]
pub struct NodeRef {
    inner: Arc<NodeInner>,
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("video_info", &self.inner.video_info)
            .finish_non_exhaustive()
    }
}

impl NodeRef {
    /// Wraps `source` in a node with a cache of `cache_capacity` frames.
    pub fn new<S: FrameSource>(name: impl Into<String>, source: S, cache_capacity: usize) -> Self {
        Self::from_arc(name, Arc::new(source), cache_capacity)
    }

    pub fn from_arc(
        name: impl Into<String>,
        source: Arc<dyn FrameSource>,
        cache_capacity: usize,
    ) -> Self {
        let video_info = *source.video_info();
        Self {
            inner: Arc::new(NodeInner {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                video_info,
                source,
                cache: FrameCache::new(cache_capacity),
            }),
        }
    }

    /// Process-unique node identity.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn video_info(&self) -> &VideoInfo {
        &self.inner.video_info
    }

    /// Downcasts the node's source to a concrete type.
    pub fn source_as<T: FrameSource>(&self) -> Option<&T> {
        let source: &dyn Any = &*self.inner.source;
        source.downcast_ref::<T>()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn check_range(&self, n: i32) -> Result<()> {
        if self.inner.video_info.contains(n) {
            Ok(())
        } else {
            Err(BridgeError::FrameOutOfRange { n, num_frames: self.inner.video_info.num_frames })
        }
    }

    /// Returns frame `n`, producing it if it is not cached.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::FrameOutOfRange` for an invalid index, or whatever
    /// error the source reported. Errors are not cached.
    pub async fn get_frame(&self, n: i32) -> Result<Frame> {
        self.check_range(n)?;
        let slot = self.inner.cache.slot(n);
        let frame = slot
            .get_or_try_init(|| async {
                let ctx = FrameContext::new(&self.inner.name, n);
                tracing::trace!(node = %self.inner.name, frame = n, token = ctx.token(), "Producing frame");
                self.inner.source.get_frame(n, &ctx).await
            })
            .await?;
        Ok(frame.clone())
    }

    /// Blocks the current thread until frame `n` is available.
    ///
    /// On a multi-threaded runtime this may be called from a worker thread, which
    /// is handed off with `tokio::task::block_in_place` while it waits. On a
    /// current-thread runtime it must be called from a `spawn_blocking` worker.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Runtime` if no runtime is reachable from this thread,
    /// plus any error [`NodeRef::get_frame`] reports.
    pub fn get_frame_blocking(&self, n: i32) -> Result<Frame> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            BridgeError::Runtime(format!("no runtime available to fetch frame {n}: {e}"))
        })?;
        match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => handle.block_on(self.get_frame(n)),
            _ => tokio::task::block_in_place(|| handle.block_on(self.get_frame(n))),
        }
    }

    /// Starts producing frame `n` in the background on behalf of `ctx`.
    ///
    /// Frames that are already cached are not requested again.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::FrameOutOfRange` for an invalid index, or
    /// `BridgeError::Runtime` when called outside a runtime.
    pub fn request_frame(&self, n: i32, ctx: &FrameContext) -> Result<()> {
        self.check_range(n)?;
        if self.is_cached(n) {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            BridgeError::Runtime(format!("no runtime available to request frame {n}: {e}"))
        })?;
        let node = self.clone();
        let task = handle.spawn(async move { node.get_frame(n).await.map(drop) });
        ctx.push_request(self.name(), n, task);
        Ok(())
    }

    pub fn is_cached(&self, n: i32) -> bool {
        self.inner.cache.contains(n)
    }

    pub fn cache(&self) -> &FrameCache {
        &self.inner.cache
    }
}

struct PendingRequest {
    node: String,
    n: i32,
    task: JoinHandle<Result<()>>,
}

/// Token for one frame computation.
///
/// Carries the identity of the request plus every upstream request issued on its
/// behalf. Outstanding requests are aborted if the context is dropped before
/// they are awaited.
pub struct FrameContext {
    token: u64,
    node: String,
    n: i32,
    pending: Mutex<Vec<PendingRequest>>,
}

impl fmt::Debug for FrameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameContext")
            .field("token", &self.token)
            .field("node", &self.node)
            .field("n", &self.n)
            .field("pending", &self.pending_requests())
            .finish()
    }
}

impl FrameContext {
    pub fn new(node: &str, n: i32) -> Self {
        Self {
            token: NEXT_REQUEST_TOKEN.fetch_add(1, Ordering::Relaxed),
            node: node.to_string(),
            n,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub const fn token(&self) -> u64 {
        self.token
    }

    pub fn node_name(&self) -> &str {
        &self.node
    }

    pub const fn frame(&self) -> i32 {
        self.n
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn push_request(&self, node: &str, n: i32, task: JoinHandle<Result<()>>) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).push(PendingRequest {
            node: node.to_string(),
            n,
            task,
        });
    }

    /// Waits for every outstanding request.
    ///
    /// All requests are awaited even when one fails, so upstream work is never
    /// left half-finished.
    ///
    /// # Errors
    ///
    /// Returns the first upstream failure. A panicked request becomes `BridgeError::Runtime`.
    pub async fn wait_for_requests(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let mut first_error = None;
        for req in pending {
            let outcome = match req.task.await {
                Ok(result) => result,
                Err(e) => Err(BridgeError::Runtime(format!(
                    "request for frame {} of '{}' did not complete: {e}",
                    req.n, req.node
                ))),
            };
            if let Err(e) = outcome {
                tracing::debug!(node = %req.node, frame = req.n, error = %e, "Upstream request failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for FrameContext {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        for req in pending.drain(..) {
            req.task.abort();
        }
    }
}
