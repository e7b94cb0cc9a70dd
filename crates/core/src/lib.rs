// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! FrameBridge Core - the graph-engine side of the legacy filter bridge.
//!
//! This crate defines what the host frame-rendering engine exposes to nodes:
//!
//! ## Core Modules
//!
//! - [`format`]: Pixel formats and stream-level video information
//! - [`frame`]: Immutable shared frames and the builder that produces them
//! - [`node`]: The `FrameSource` trait, node handles and per-request contexts
//! - [`cache`]: Per-node frame cache with in-flight de-duplication
//! - [`frame_pool`]: Bucketed buffer pooling for frame storage
//! - [`source`]: A deterministic pattern source for tests and demos
//! - [`config`]: Process-wide bridge configuration
//! - [`log`]: The host message sink
//! - [`error`]: Error taxonomy
//!
//! ## Quick Start
//!
//! ```ignore
//! use framebridge_core::{async_trait, Frame, FrameContext, FrameSource, NodeRef, VideoInfo};
//!
//! struct Invert { upstream: NodeRef }
//!
//! #[async_trait]
//! impl FrameSource for Invert {
//!     fn video_info(&self) -> &VideoInfo { self.upstream.video_info() }
//!
//!     async fn get_frame(&self, n: i32, ctx: &FrameContext) -> Result<Frame> {
//!         self.upstream.request_frame(n, ctx)?;
//!         ctx.wait_for_requests().await?;
//!         let src = self.upstream.get_frame(n).await?;
//!         /* ... */
//!     }
//! }
//! ```

// Re-export async_trait for use in node implementations
pub use async_trait::async_trait;

pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod frame_pool;
pub mod log;
pub mod node;
pub mod source;

pub use error::{BridgeError, ErrorClass, Result};

pub use format::{ColorFamily, PresetFormat, SampleType, VideoFormat, VideoInfo};
pub use frame::{Frame, FrameBuilder, DEFAULT_FRAME_ALIGNMENT};

pub use cache::FrameCache;
pub use node::{FrameContext, FrameSource, NodeRef};
pub use source::PatternSource;

pub use frame_pool::{FramePool, PooledBuffer};

pub use config::{bridge_config, set_bridge_config, BridgeConfig, PrefetchOverride};
pub use log::{log_message, MessageType};
