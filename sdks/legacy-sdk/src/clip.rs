// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The pull-model clip interface.

use crate::env::ScriptEnvironment;
use crate::frame::LegacyFrame;
use crate::types::LegacyVideoInfo;
use framebridge_core::Result;
use std::sync::Arc;

/// A source of frames that the caller pulls synchronously, one index at a time.
///
/// Filters implement this for their output and call it on their inputs. Calls
/// block until the frame is available.
pub trait Clip: Send + Sync {
    /// Returns frame `n`.
    ///
    /// # Errors
    ///
    /// Fails if `n` is out of range or the frame cannot be produced. Use
    /// [`ScriptEnvironment::throw_error`] to build errors that abort the computation.
    fn get_frame(&self, n: i32, env: &dyn ScriptEnvironment) -> Result<LegacyFrame>;

    /// Field parity of frame `n`; true for top field first.
    fn get_parity(&self, n: i32) -> bool;

    /// Fills `buf` with `count` audio samples starting at `start`.
    ///
    /// # Errors
    ///
    /// Implementations that carry audio may fail on invalid ranges.
    fn get_audio(&self, buf: &mut [u8], start: i64, count: i64, env: &dyn ScriptEnvironment) -> Result<()>;

    /// Caching hint from a downstream filter. The meaning of the return value
    /// depends on `hints`; 0 means "not handled".
    fn set_cache_hints(&self, hints: i32, frame_range: i32) -> i32;

    fn video_info(&self) -> &LegacyVideoInfo;
}

/// Shared clip handle.
pub type PClip = Arc<dyn Clip>;
