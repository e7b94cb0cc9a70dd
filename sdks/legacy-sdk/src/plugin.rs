// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Plugin entry points.

use crate::env::ScriptEnvironment;
use crate::types::MAX_INTERFACE_VERSION;
use framebridge_core::Result;

/// How many upstream frames a filter reads to produce frame `n`.
///
/// The filter reads source frames `n * mul / div + i` for every `i` in
/// `from..to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrefetchHint {
    pub div: i32,
    pub mul: i32,
    pub from: i32,
    pub to: i32,
}

impl PrefetchHint {
    /// A temporal window of `radius` frames on each side.
    pub const fn radius(radius: i32) -> Self {
        Self { div: 1, mul: 1, from: -radius, to: radius + 1 }
    }
}

/// A collection of legacy filters.
pub trait LegacyPlugin: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// The interface version the plugin was written against.
    fn interface_version(&self) -> i32 {
        MAX_INTERFACE_VERSION
    }

    /// Registers the plugin's functions with `env` and returns a description.
    ///
    /// # Errors
    ///
    /// Registration failures are propagated to the loader.
    fn init(&self, env: &dyn ScriptEnvironment) -> Result<String>;

    /// Upstream access patterns of the plugin's filters, by function name.
    fn prefetch_hints(&self) -> Vec<(String, PrefetchHint)> {
        Vec::new()
    }
}
