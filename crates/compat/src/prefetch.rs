// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Upstream prefetch mapping for wrapped filters.
//!
//! Before a legacy filter is entered for output frame `n`, every upstream node
//! is asked for frames `n * mul / div + i` for `i` in `from..to`, clamped to the
//! node's frame range. The legacy call then finds those frames already produced
//! and only blocks on frames the mapping did not predict.

use crate::registry::FunctionRegistry;
use framebridge_core::{BridgeConfig, BridgeError, PrefetchOverride, Result};
use framebridge_legacy_sdk::PrefetchHint;
use tracing::warn;

/// Widest `from..to` window a mapping may request per output frame.
pub const MAX_PREFETCH_WINDOW: i64 = 1024;

/// Linear mapping from an output frame to the upstream frames it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrefetchInfo {
    div: i32,
    mul: i32,
    from: i32,
    to: i32,
}

impl Default for PrefetchInfo {
    /// Frame `n` reads upstream frame `n` only.
    fn default() -> Self {
        Self { div: 1, mul: 1, from: 0, to: 1 }
    }
}

impl PrefetchInfo {
    /// # Errors
    ///
    /// Returns `BridgeError::Configuration` unless `div` and `mul` are positive,
    /// `to > from` and the window is at most [`MAX_PREFETCH_WINDOW`] frames wide.
    pub fn new(div: i32, mul: i32, from: i32, to: i32) -> Result<Self> {
        if div <= 0 || mul <= 0 {
            return Err(BridgeError::Configuration(format!(
                "prefetch divisor and multiplier must be positive, got {div} and {mul}"
            )));
        }
        if to <= from {
            return Err(BridgeError::Configuration(format!(
                "prefetch range {from}..{to} is empty"
            )));
        }
        if i64::from(to) - i64::from(from) > MAX_PREFETCH_WINDOW {
            return Err(BridgeError::Configuration(format!(
                "prefetch range {from}..{to} is wider than {MAX_PREFETCH_WINDOW} frames"
            )));
        }
        Ok(Self { div, mul, from, to })
    }

    pub const fn div(&self) -> i32 {
        self.div
    }

    pub const fn mul(&self) -> i32 {
        self.mul
    }

    /// Number of offsets in [`PrefetchInfo::range`].
    pub fn window(&self) -> i64 {
        i64::from(self.to) - i64::from(self.from)
    }

    /// Offsets relative to the scaled frame index.
    pub const fn range(&self) -> std::ops::Range<i32> {
        self.from..self.to
    }

    /// Upstream indices to request for output frame `n`, clamped to
    /// `0..upstream_frames`, in ascending order and without duplicates.
    pub fn indices(&self, n: i32, upstream_frames: i32) -> Vec<i32> {
        if upstream_frames <= 0 {
            return Vec::new();
        }
        let last = i64::from(upstream_frames) - 1;
        let base = i64::from(n) * i64::from(self.mul) / i64::from(self.div);
        let mut out: Vec<i32> = self
            .range()
            .map(|i| (base + i64::from(i)).clamp(0, last))
            .filter_map(|idx| i32::try_from(idx).ok())
            .collect();
        out.dedup();
        out
    }

    /// Picks the mapping for `filter`: a configured override first, then the hint
    /// registered with the function, then the default.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Configuration` if the configured override is invalid
    /// or wider than the node cache.
    pub fn resolve(filter: &str, config: &BridgeConfig, registry: &FunctionRegistry) -> Result<Self> {
        let capacity = i64::try_from(config.frame_cache_capacity).unwrap_or(i64::MAX);
        if let Some(pf) = config.prefetch.get(filter) {
            let info = Self::try_from(*pf)?;
            if info.window() > capacity {
                return Err(BridgeError::Configuration(format!(
                    "prefetch window {:?} for '{filter}' is wider than frame_cache_capacity {capacity}",
                    info.range()
                )));
            }
            return Ok(info);
        }
        let info = registry.prefetch_hint(filter).unwrap_or_default();
        if info.window() > capacity {
            warn!(
                filter,
                window = info.window(),
                capacity,
                "Registered prefetch window is wider than the frame cache; early frames may be evicted"
            );
        }
        Ok(info)
    }
}

impl TryFrom<PrefetchOverride> for PrefetchInfo {
    type Error = BridgeError;

    fn try_from(pf: PrefetchOverride) -> Result<Self> {
        Self::new(pf.div, pf.mul, pf.from, pf.to)
    }
}

impl TryFrom<PrefetchHint> for PrefetchInfo {
    type Error = BridgeError;

    fn try_from(hint: PrefetchHint) -> Result<Self> {
        Self::new(hint.div, hint.mul, hint.from, hint.to)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_requests_the_same_frame() {
        let pf = PrefetchInfo::default();
        assert_eq!(pf.indices(5, 10), vec![5]);
        assert_eq!(pf.indices(42, 10), vec![9]);
        assert!(pf.indices(0, 0).is_empty());
    }

    #[test]
    fn temporal_window_is_clamped_and_deduplicated() {
        let pf = PrefetchInfo::try_from(PrefetchHint::radius(2)).unwrap();
        assert_eq!(pf.indices(5, 10), vec![3, 4, 5, 6, 7]);
        assert_eq!(pf.indices(0, 10), vec![0, 1, 2]);
        assert_eq!(pf.indices(9, 10), vec![7, 8, 9]);
    }

    #[test]
    fn rate_changes_scale_the_index() {
        // Two source frames per output frame.
        let pf = PrefetchInfo::new(1, 2, 0, 2).unwrap();
        assert_eq!(pf.indices(3, 100), vec![6, 7]);

        // One source frame per two output frames.
        let pf = PrefetchInfo::new(2, 1, 0, 1).unwrap();
        assert_eq!(pf.indices(7, 100), vec![3]);
    }

    #[test]
    fn invalid_mappings_are_rejected() {
        assert!(PrefetchInfo::new(0, 1, 0, 1).is_err());
        assert!(PrefetchInfo::new(1, -1, 0, 1).is_err());
        assert!(PrefetchInfo::new(1, 1, 2, 2).is_err());
        assert!(PrefetchInfo::new(1, 1, -2_000_000_000, 2_000_000_000).is_err());
        assert!(PrefetchInfo::new(1, 1, 0, 1024).is_ok());
        assert!(PrefetchInfo::new(1, 1, 0, 1025).is_err());
    }

    #[test]
    fn unvalidated_overrides_wider_than_the_cache_are_rejected() {
        let registry = FunctionRegistry::new();
        let mut config = BridgeConfig { frame_cache_capacity: 4, ..BridgeConfig::default() };
        config.prefetch.insert("Soften".into(), PrefetchOverride { div: 1, mul: 1, from: -3, to: 4 });
        assert!(matches!(
            PrefetchInfo::resolve("Soften", &config, &registry),
            Err(BridgeError::Configuration(_))
        ));

        registry.set_prefetch_hint("Wide", PrefetchInfo::new(1, 1, -3, 4).unwrap());
        assert_eq!(PrefetchInfo::resolve("Wide", &config, &registry).unwrap().window(), 7);
    }

    #[test]
    fn configuration_takes_precedence() {
        let registry = FunctionRegistry::new();
        registry.set_prefetch_hint("Soften", PrefetchInfo::new(1, 1, -1, 2).unwrap());

        let mut config = BridgeConfig::default();
        assert_eq!(
            PrefetchInfo::resolve("Soften", &config, &registry).unwrap(),
            PrefetchInfo::new(1, 1, -1, 2).unwrap()
        );
        assert_eq!(PrefetchInfo::resolve("Other", &config, &registry).unwrap(), PrefetchInfo::default());

        config.prefetch.insert("Soften".into(), PrefetchOverride { div: 1, mul: 1, from: -3, to: 4 });
        assert_eq!(
            PrefetchInfo::resolve("Soften", &config, &registry).unwrap(),
            PrefetchInfo::new(1, 1, -3, 4).unwrap()
        );
    }
}
