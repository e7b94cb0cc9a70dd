// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! FrameBridge Legacy Filter SDK
//!
//! The synchronous, pull-model API that legacy filters are written against. A
//! filter implements [`Clip`] for its output, pulls input frames by calling
//! [`Clip::get_frame`] on its child clips, and allocates or copies frames
//! through the [`ScriptEnvironment`] it is handed.
//!
//! # Example
//!
//! ```ignore
//! use framebridge_legacy_sdk::prelude::*;
//!
//! struct Invert { child: PClip }
//!
//! impl Clip for Invert {
//!     fn get_frame(&self, n: i32, env: &dyn ScriptEnvironment) -> Result<LegacyFrame> {
//!         let mut frame = self.child.get_frame(n, env)?;
//!         env.make_writable(&mut frame)?;
//!         /* ... */
//!         Ok(frame)
//!     }
//!     /* ... */
//! }
//!
//! fn create_invert(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
//!     let child = args.get(0).and_then(Value::as_clip).ok_or_else(|| env.throw_error("Invert: no clip"))?;
//!     Ok(Value::Clip(Arc::new(Invert { child: Arc::clone(child) })))
//! }
//!
//! struct MyPlugin;
//!
//! impl LegacyPlugin for MyPlugin {
//!     fn name(&self) -> &str { "invert" }
//!     fn init(&self, env: &dyn ScriptEnvironment) -> Result<String> {
//!         env.add_function("Invert", "c", create_invert, None)?;
//!         Ok("Inverts pixels".into())
//!     }
//! }
//! ```

pub mod clip;
pub mod env;
pub mod frame;
pub mod plugin;
pub mod types;
pub mod value;

pub use framebridge_core;

pub use clip::{Clip, PClip};
pub use env::{ApplyFunc, ScriptEnvironment, ShutdownFunc, UserData};
pub use frame::{bit_blt, FrameId, FrameReleaser, LegacyFrame, PlaneLayout, VideoFrame, VideoFrameBuffer};
pub use plugin::{LegacyPlugin, PrefetchHint};
pub use types::*;
pub use value::{parse_arg_specs, ArgSpec, ArgType, Repeat, Value};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clip::{Clip, PClip};
    pub use crate::env::{ApplyFunc, ScriptEnvironment, UserData};
    pub use crate::frame::LegacyFrame;
    pub use crate::plugin::{LegacyPlugin, PrefetchHint};
    pub use crate::types::{Colorspace, LegacyVideoInfo, PLANAR_U, PLANAR_V, PLANAR_Y};
    pub use crate::value::Value;
    pub use framebridge_core::{BridgeError, Result};
    pub use std::sync::Arc;
}
