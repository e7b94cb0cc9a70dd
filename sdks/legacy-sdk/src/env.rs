// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The host environment a legacy filter is handed.

use crate::frame::LegacyFrame;
use crate::types::LegacyVideoInfo;
use crate::value::Value;
use framebridge_core::{BridgeError, Result};
use std::any::Any;
use std::sync::Arc;

/// Opaque data a filter attaches to a registered function or shutdown hook.
pub type UserData = Option<Arc<dyn Any + Send + Sync>>;

/// Constructs a filter. `args` is an array with one entry per declared argument,
/// `Value::Void` for optional arguments that were not given.
pub type ApplyFunc = fn(args: &Value, user_data: &UserData, env: &dyn ScriptEnvironment) -> Result<Value>;

/// Called once when the environment that registered it is destroyed.
pub type ShutdownFunc = fn(user_data: &UserData, env: &dyn ScriptEnvironment);

/// Services the host provides to legacy filters.
///
/// One environment serves one filter chain. The host guarantees that at most
/// one call into the chain is in flight at a time, so implementations of
/// [`crate::Clip`] may rely on the environment not changing underneath them
/// during a call.
pub trait ScriptEnvironment: Send + Sync {
    /// Interface version this environment speaks.
    fn interface_version(&self) -> i32;

    /// # Errors
    ///
    /// Fails with a construction error if `version` is newer than the host supports.
    fn check_version(&self, version: i32) -> Result<()>;

    /// CPU capability bits (`CPUF_*`).
    fn cpu_flags(&self) -> u32;

    /// Keeps a copy of `s` alive for as long as the environment.
    fn save_string(&self, s: &str) -> Arc<str>;

    /// Builds the error that aborts the current construction or frame computation.
    /// The message is also logged.
    fn throw_error(&self, message: &str) -> BridgeError;

    /// Registers a filter constructor under `name`.
    ///
    /// # Errors
    ///
    /// Fails with `DuplicateRegistration` if `name` is already bound to a
    /// different constructor, or `Argument` if `params` does not parse.
    fn add_function(&self, name: &str, params: &str, apply: ApplyFunc, user_data: UserData) -> Result<()>;

    fn function_exists(&self, name: &str) -> bool;

    /// Calls a registered function. `args` is an array of argument values;
    /// `arg_names[i]` names `args[i]`, or is `None` for a positional argument.
    ///
    /// # Errors
    ///
    /// Fails if the function does not exist, the arguments do not match its
    /// parameters, or the function itself fails.
    fn invoke(&self, name: &str, args: &Value, arg_names: &[Option<&str>]) -> Result<Value>;

    /// Looks up a variable in the visible scopes, then in the globals.
    ///
    /// # Errors
    ///
    /// Fails with `VariableNotFound` if the name is not bound anywhere.
    fn get_var(&self, name: &str) -> Result<Value>;

    fn get_var_def(&self, name: &str, default: Value) -> Value {
        self.get_var(name).unwrap_or(default)
    }

    /// Binds `name` in the innermost scope. Returns true if the name was new there.
    fn set_var(&self, name: &str, value: Value) -> bool;

    /// Binds `name` in the global scope. Returns true if the name was new there.
    fn set_global_var(&self, name: &str, value: Value) -> bool;

    fn push_context(&self, level: i32);

    /// # Errors
    ///
    /// Fails with `ScopeUnderflow` if no pushed scope remains.
    fn pop_context(&self) -> Result<()>;

    /// Allocates a writable frame for `vi`, with each row aligned to `align` bytes.
    ///
    /// # Errors
    ///
    /// Fails if `vi` describes no video.
    fn new_video_frame(&self, vi: &LegacyVideoInfo, align: usize) -> Result<LegacyFrame>;

    /// Makes `frame` writable, copying it if it is shared. Returns true if a copy was made.
    ///
    /// # Errors
    ///
    /// Fails if the copy cannot be allocated.
    fn make_writable(&self, frame: &mut LegacyFrame) -> Result<bool>;

    /// See [`crate::frame::bit_blt`].
    ///
    /// # Errors
    ///
    /// Fails if either buffer is too small for the copy.
    fn bit_blt(
        &self,
        dst: &mut [u8],
        dst_pitch: usize,
        src: &[u8],
        src_pitch: usize,
        row_size: usize,
        height: usize,
    ) -> Result<()> {
        crate::frame::bit_blt(dst, dst_pitch, src, src_pitch, row_size, height)
    }

    /// See [`LegacyFrame::subframe`].
    ///
    /// # Errors
    ///
    /// Fails if the view reaches outside the source buffer.
    fn subframe(
        &self,
        src: &LegacyFrame,
        rel_offset: usize,
        new_pitch: usize,
        new_row_size: usize,
        new_height: usize,
    ) -> Result<LegacyFrame> {
        src.subframe(rel_offset, new_pitch, new_row_size, new_height)
    }

    /// See [`LegacyFrame::subframe_planar`].
    ///
    /// # Errors
    ///
    /// Fails if the source is not planar or the view reaches outside its buffer.
    #[allow(clippy::too_many_arguments)]
    fn subframe_planar(
        &self,
        src: &LegacyFrame,
        rel_offset: usize,
        new_pitch: usize,
        new_row_size: usize,
        new_height: usize,
        rel_offset_u: usize,
        rel_offset_v: usize,
        new_pitch_uv: usize,
    ) -> Result<LegacyFrame> {
        src.subframe_planar(
            rel_offset,
            new_pitch,
            new_row_size,
            new_height,
            rel_offset_u,
            rel_offset_v,
            new_pitch_uv,
        )
    }

    /// Registers a hook to run when the environment is destroyed.
    fn at_exit(&self, func: ShutdownFunc, user_data: UserData);

    /// Memory limit request in MiB. Returns the limit in effect.
    fn set_memory_max(&self, mem: i32) -> i32;

    /// # Errors
    ///
    /// Fails if the host refuses to change directory.
    fn set_working_dir(&self, dir: &str) -> Result<()>;

    /// Cache-management request; returns 0 when the host does not handle `key`.
    fn manage_cache(&self, key: i32, data: i64) -> i64;

    /// Whether chroma planes get their own alignment; `key` selects the query.
    fn planar_chroma_alignment(&self, key: i32) -> bool;
}
