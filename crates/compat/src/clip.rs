// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Host nodes seen through the legacy [`Clip`] interface.

use crate::env::LegacyEnvironment;
use crate::frames::{colorspace_for, to_legacy};
use crate::metrics::metrics;
use crate::wrapped::WrappedFilter;
use framebridge_core::{BridgeError, NodeRef, Result};
use framebridge_legacy_sdk::{Clip, LegacyFrame, LegacyVideoInfo, ScriptEnvironment};
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, warn};

/// A host node exposed to a legacy filter as a synchronous clip.
///
/// Frames are fetched by blocking on the node, so [`Clip::get_frame`] may only
/// be called by the thread that holds the owning environment's lock. Every
/// frame the filter will need should already have been requested by the
/// wrapped filter's prefetch; anything else is served from the slow path.
pub struct LegacyClipAdapter {
    node: NodeRef,
    vi: LegacyVideoInfo,
    env: Weak<LegacyEnvironment>,
    slow_path_warnings: AtomicU32,
    max_slow_path_warnings: u32,
}

impl LegacyClipAdapter {
    /// # Errors
    ///
    /// Returns `BridgeError::UnsupportedFormat` if the node's format has no legacy
    /// colorspace, or `BridgeError::Construction` if its dimensions do not fit.
    pub fn new(node: NodeRef, env: &Arc<LegacyEnvironment>) -> Result<Self> {
        let info = *node.video_info();
        let Some(colorspace) = colorspace_for(&info.format) else {
            error!(node = %node.name(), format = %info.format, "Node format cannot be passed to legacy filters");
            return Err(BridgeError::UnsupportedFormat(format!(
                "{} (from node '{}')",
                info.format,
                node.name()
            )));
        };

        let width = i32::try_from(info.width)
            .map_err(|_| BridgeError::Construction(format!("width {} is too large", info.width)))?;
        let height = i32::try_from(info.height)
            .map_err(|_| BridgeError::Construction(format!("height {} is too large", info.height)))?;
        let fps_num = u32::try_from(info.fps_num.max(0)).unwrap_or(u32::MAX);
        let fps_den = u32::try_from(info.fps_den.max(0)).unwrap_or(u32::MAX);

        let mut vi = LegacyVideoInfo::new(width, height, colorspace, (fps_num, fps_den), info.num_frames);
        if let Some(wrapped) = node.source_as::<WrappedFilter>() {
            let audio = wrapped.audio();
            vi.num_audio_samples = audio.num_audio_samples;
            vi.nchannels = audio.nchannels;
            vi.sample_type = audio.sample_type;
        }

        Ok(Self {
            node,
            vi,
            env: Arc::downgrade(env),
            slow_path_warnings: AtomicU32::new(0),
            max_slow_path_warnings: env.max_slow_path_warnings(),
        })
    }

    pub const fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Frames served without a prefetch so far.
    pub fn slow_path_count(&self) -> u32 {
        self.slow_path_warnings.load(Ordering::Relaxed)
    }

    fn note_slow_path(&self, n: i32, env: &LegacyEnvironment) {
        let count = self.slow_path_warnings.fetch_add(1, Ordering::Relaxed) + 1;
        env.record_slow_path();
        metrics().slow_path_fetches.add(1, &[KeyValue::new("node", self.node.name().to_string())]);
        if count <= self.max_slow_path_warnings {
            let token = env.call_context().map_or(0, |ctx| ctx.token);
            warn!(
                node = %self.node.name(),
                frame = n,
                token,
                count,
                "Legacy filter requested a frame that was not prefetched"
            );
        }
    }
}

impl std::fmt::Debug for LegacyClipAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyClipAdapter")
            .field("node", &self.node.name())
            .field("vi", &self.vi)
            .field("slow_path_warnings", &self.slow_path_count())
            .finish_non_exhaustive()
    }
}

impl Clip for LegacyClipAdapter {
    fn get_frame(&self, n: i32, _env: &dyn ScriptEnvironment) -> Result<LegacyFrame> {
        if n < 0 || n >= self.vi.num_frames {
            return Err(BridgeError::FrameOutOfRange { n, num_frames: self.vi.num_frames });
        }
        let env = self
            .env
            .upgrade()
            .ok_or_else(|| BridgeError::Runtime(format!("environment of clip '{}' is gone", self.node.name())))?;
        if !env.holds_lock() {
            return Err(BridgeError::LockViolation(format!(
                "frame {n} of '{}' requested by a thread outside the legacy call",
                self.node.name()
            )));
        }

        if !self.node.is_cached(n) {
            self.note_slow_path(n, &env);
        }
        let frame = self.node.get_frame_blocking(n)?;
        to_legacy(env.owned_frames(), &frame)
    }

    fn get_parity(&self, _n: i32) -> bool {
        true
    }

    fn get_audio(&self, _buf: &mut [u8], _start: i64, _count: i64, _env: &dyn ScriptEnvironment) -> Result<()> {
        Ok(())
    }

    fn set_cache_hints(&self, _hints: i32, _frame_range: i32) -> i32 {
        0
    }

    fn video_info(&self) -> &LegacyVideoInfo {
        &self.vi
    }
}
