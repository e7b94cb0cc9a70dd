// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use std::sync::LazyLock;

/// Bridge-wide instruments on the `framebridge_compat` meter.
pub struct BridgeMetrics {
    pub frames_produced: Counter<u64>,
    pub slow_path_fetches: Counter<u64>,
    pub filters_created: Counter<u64>,
    pub single_flight_wait: Histogram<f64>,
}

static METRICS: LazyLock<BridgeMetrics> = LazyLock::new(|| {
    let meter = global::meter("framebridge_compat");
    BridgeMetrics {
        frames_produced: meter
            .u64_counter("compat.frames_produced")
            .with_description("Frames produced by wrapped legacy filters")
            .build(),
        slow_path_fetches: meter
            .u64_counter("compat.slow_path_fetches")
            .with_description("Upstream frames a legacy filter pulled without a prefetch")
            .build(),
        filters_created: meter
            .u64_counter("compat.filters_created")
            .with_description("Legacy filter instances constructed")
            .build(),
        single_flight_wait: meter
            .f64_histogram("compat.single_flight_wait_seconds")
            .with_description("Time spent waiting for an environment's single-flight lock")
            .build(),
    }
});

pub fn metrics() -> &'static BridgeMetrics {
    &METRICS
}
