// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A constructed legacy filter as a host graph node.
//!
//! A frame request runs in three steps:
//! 1. request the upstream frames the prefetch mapping predicts and wait for them
//! 2. enter the environment's single-flight lock on a blocking worker
//! 3. pull the frame from the legacy filter and convert it to a host frame
//!
//! Only step 3 is serialized per filter; upstream work overlaps freely.

use crate::env::{CallContext, LegacyEnvironment};
use crate::frames::to_modern;
use crate::metrics::metrics;
use crate::prefetch::PrefetchInfo;
use framebridge_core::{
    async_trait, BridgeError, ErrorClass, Frame, FrameContext, FrameSource, NodeRef, Result, VideoInfo,
};
use framebridge_legacy_sdk::{LegacyVideoInfo, PClip};
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::debug;

/// Audio fields of a legacy filter's output, carried to downstream clip
/// adapters verbatim. Some filter families use them to pass side data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioPlaceholder {
    pub num_audio_samples: i64,
    pub nchannels: i32,
    pub sample_type: i32,
}

impl From<&LegacyVideoInfo> for AudioPlaceholder {
    fn from(vi: &LegacyVideoInfo) -> Self {
        Self { num_audio_samples: vi.num_audio_samples, nchannels: vi.nchannels, sample_type: vi.sample_type }
    }
}

/// The filter instance together with the environment it was built in.
///
/// Shared with blocking tasks so a frame computation keeps both alive.
struct FilterInstance {
    clip: Option<PClip>,
    env: Arc<LegacyEnvironment>,
}

impl FilterInstance {
    fn produce(&self, n: i32, call: CallContext, vi: &VideoInfo, alignment: usize) -> Result<Frame> {
        let clip = self
            .clip
            .as_ref()
            .ok_or_else(|| BridgeError::Runtime("legacy filter has been destroyed".into()))?;
        let _guard = self.env.enter(call)?;
        let legacy = clip.get_frame(n, &*self.env)?;
        to_modern(self.env.owned_frames(), &legacy, vi, alignment)
    }
}

impl Drop for FilterInstance {
    fn drop(&mut self) {
        // The filter may still hold frames and clips tied to the environment.
        self.clip.take();
    }
}

/// Errors raised while producing a frame are runtime errors, whatever their origin.
fn frame_error(e: BridgeError) -> BridgeError {
    match e.class() {
        ErrorClass::Construction => BridgeError::Runtime(e.to_string()),
        ErrorClass::Runtime | ErrorClass::Fatal => e,
    }
}

/// A legacy filter addressed by the host engine.
pub struct WrappedFilter {
    name: String,
    instance: Arc<FilterInstance>,
    prefetch_nodes: Vec<NodeRef>,
    prefetch: PrefetchInfo,
    prefetch_enabled: bool,
    video_info: VideoInfo,
    audio: AudioPlaceholder,
    alignment: usize,
}

impl WrappedFilter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: &str,
        clip: PClip,
        env: Arc<LegacyEnvironment>,
        prefetch_nodes: Vec<NodeRef>,
        prefetch: PrefetchInfo,
        prefetch_enabled: bool,
        video_info: VideoInfo,
        audio: AudioPlaceholder,
    ) -> Self {
        let alignment = env.alignment();
        Self {
            name: name.to_string(),
            instance: Arc::new(FilterInstance { clip: Some(clip), env }),
            prefetch_nodes,
            prefetch,
            prefetch_enabled,
            video_info,
            audio,
            alignment,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn audio(&self) -> AudioPlaceholder {
        self.audio
    }

    pub const fn prefetch(&self) -> PrefetchInfo {
        self.prefetch
    }

    /// Upstream nodes the filter was constructed with, without duplicates.
    pub fn upstream(&self) -> &[NodeRef] {
        &self.prefetch_nodes
    }

    pub fn env(&self) -> &Arc<LegacyEnvironment> {
        &self.instance.env
    }

    fn issue_prefetch(&self, n: i32, ctx: &FrameContext) -> Result<()> {
        for node in &self.prefetch_nodes {
            for idx in self.prefetch.indices(n, node.video_info().num_frames) {
                node.request_frame(idx, ctx)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for WrappedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedFilter")
            .field("name", &self.name)
            .field("upstream", &self.prefetch_nodes.len())
            .field("prefetch", &self.prefetch)
            .field("video_info", &self.video_info)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FrameSource for WrappedFilter {
    fn video_info(&self) -> &VideoInfo {
        &self.video_info
    }

    async fn get_frame(&self, n: i32, ctx: &FrameContext) -> Result<Frame> {
        if self.prefetch_enabled {
            self.issue_prefetch(n, ctx)?;
            ctx.wait_for_requests().await?;
        }

        let instance = Arc::clone(&self.instance);
        let call = CallContext::frame(n, ctx.token(), self.prefetch_nodes.clone());
        let vi = self.video_info;
        let alignment = self.alignment;
        let frame = tokio::task::spawn_blocking(move || instance.produce(n, call, &vi, alignment))
            .await
            .map_err(|e| BridgeError::Runtime(format!("legacy filter '{}' panicked on frame {n}: {e}", self.name)))?
            .map_err(|e| {
                debug!(filter = %self.name, frame = n, error = %e, "Legacy filter failed");
                frame_error(e)
            })?;

        metrics().frames_produced.add(1, &[KeyValue::new("filter", self.name.clone())]);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_errors_become_runtime_errors() {
        assert!(matches!(frame_error(BridgeError::Argument("x".into())), BridgeError::Runtime(_)));
        assert!(matches!(frame_error(BridgeError::ScopeUnderflow), BridgeError::ScopeUnderflow));
        assert!(matches!(
            frame_error(BridgeError::LockViolation("x".into())),
            BridgeError::LockViolation(_)
        ));
    }
}
