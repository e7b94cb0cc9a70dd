// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Runtime configuration for the bridge.
//!
//! The configuration is process-global: it is set once at startup, before any
//! filter node is constructed, and stays constant afterwards. If it is never
//! set, [`bridge_config`] returns the defaults.
//!
//! ## Usage
//!
//! ```ignore
//! use framebridge_core::config::{set_bridge_config, BridgeConfig};
//!
//! let config = BridgeConfig::load("framebridge.yaml")?;
//! set_bridge_config(config);
//! ```
//!
//! A YAML file only needs the keys it overrides:
//!
//! ```yaml
//! frame_cache_capacity: 64
//! prefetch:
//!   TemporalSoften:
//!     div: 1
//!     mul: 1
//!     from: -2
//!     to: 3
//! ```

use crate::error::{BridgeError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Default number of frames each node keeps cached.
const DEFAULT_FRAME_CACHE_CAPACITY: usize = 32;

/// Default row alignment (bytes) for frames allocated on behalf of legacy filters.
const DEFAULT_FRAME_ALIGNMENT: usize = 32;

/// Default number of slow-path warnings a clip adapter logs before going quiet.
const DEFAULT_MAX_SLOW_PATH_WARNINGS: u32 = 10;

/// A per-filter prefetch mapping, as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchOverride {
    pub div: i32,
    pub mul: i32,
    pub from: i32,
    pub to: i32,
}

impl PrefetchOverride {
    /// Number of upstream frames requested per output frame, before clamping.
    pub fn window(&self) -> i64 {
        i64::from(self.to) - i64::from(self.from)
    }
}

/// Bridge-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Frames cached per node. Must be at least 1.
    pub frame_cache_capacity: usize,

    /// Row alignment for frames allocated by legacy environments.
    pub frame_alignment: usize,

    /// How many times a clip adapter warns about frames that were not prefetched.
    pub max_slow_path_warnings: u32,

    /// Issue upstream prefetch requests before entering a legacy filter.
    /// Disabling this is only useful for debugging; every pull then takes the slow path.
    pub prefetch_enabled: bool,

    /// Prefetch mappings keyed by legacy filter name. These take precedence over
    /// the hint a filter registers for itself. A window may not be wider than
    /// `frame_cache_capacity`.
    pub prefetch: IndexMap<String, PrefetchOverride>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            frame_cache_capacity: DEFAULT_FRAME_CACHE_CAPACITY,
            frame_alignment: DEFAULT_FRAME_ALIGNMENT,
            max_slow_path_warnings: DEFAULT_MAX_SLOW_PATH_WARNINGS,
            prefetch_enabled: true,
            prefetch: IndexMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Parses a configuration from YAML.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Configuration` if the YAML is malformed or a value is invalid.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_saphyr::from_str(yaml)
            .map_err(|e| BridgeError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Io` if the file cannot be read, or
    /// `BridgeError::Configuration` if its contents are invalid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(?path, "Loading bridge configuration");
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Configuration` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.frame_cache_capacity == 0 {
            return Err(BridgeError::Configuration(
                "frame_cache_capacity must be at least 1".to_string(),
            ));
        }
        if !self.frame_alignment.is_power_of_two() {
            return Err(BridgeError::Configuration(format!(
                "frame_alignment must be a power of two, got {}",
                self.frame_alignment
            )));
        }
        for (name, pf) in &self.prefetch {
            if pf.div <= 0 || pf.mul <= 0 || pf.to <= pf.from {
                return Err(BridgeError::Configuration(format!(
                    "invalid prefetch mapping for '{name}': div and mul must be positive and to > from"
                )));
            }
            if pf.window() > i64::try_from(self.frame_cache_capacity).unwrap_or(i64::MAX) {
                return Err(BridgeError::Configuration(format!(
                    "prefetch window {}..{} for '{name}' is wider than frame_cache_capacity {}",
                    pf.from, pf.to, self.frame_cache_capacity
                )));
            }
        }
        Ok(())
    }
}

/// Global storage for the bridge configuration.
static BRIDGE_CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// Sets the global bridge configuration.
///
/// Subsequent calls are ignored (the first configuration wins).
pub fn set_bridge_config(config: BridgeConfig) {
    if BRIDGE_CONFIG.set(config).is_err() {
        tracing::warn!("Bridge config already set, ignoring new configuration");
    }
}

/// Returns the global configuration, or the defaults if none was set.
pub fn bridge_config() -> &'static BridgeConfig {
    BRIDGE_CONFIG.get_or_init(BridgeConfig::default)
}
