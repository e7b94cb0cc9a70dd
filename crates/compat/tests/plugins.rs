// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Plugin loading, registration and filter construction failures.

mod common;

use common::{init_tracing, pattern, registry, ConflictingPlugin, TestPlugin, VersionedPlugin};
use framebridge_compat::{create_filter_in, load_plugin, load_plugins, FunctionRegistry, HostValue, WrappedFilter};
use framebridge_core::{BridgeConfig, BridgeError, ErrorClass, PresetFormat};
use framebridge_legacy_sdk::{LegacyPlugin, ScriptEnvironment};
use std::sync::Arc;

#[test]
#[allow(clippy::unwrap_used)]
fn loading_registers_every_function_and_hint() {
    init_tracing();
    let (registry, _plugin, loaded) = registry();

    assert_eq!(loaded.name(), "test-filters");
    assert_eq!(loaded.description(), "Filters for bridge tests");
    assert_eq!(loaded.functions().len(), registry.len());
    assert!(loaded.functions().iter().any(|f| f == "TemporalAverage"));
    assert_eq!(registry.prefetch_hint("TemporalAverage").map(|p| p.range()), Some(-1..2));
    assert!(registry.prefetch_hint("Invert").is_none());
}

#[test]
#[allow(clippy::unwrap_used)]
fn reloading_the_same_plugin_is_harmless() {
    init_tracing();
    let registry = Arc::new(FunctionRegistry::new());
    let plugin = TestPlugin::default();
    load_plugin(&registry, &plugin).unwrap();
    let before = registry.names();
    load_plugin(&registry, &plugin).unwrap();
    assert_eq!(registry.names(), before);
}

#[test]
#[allow(clippy::unwrap_used)]
fn conflicting_registration_fails_only_that_plugin() {
    init_tracing();
    let registry = Arc::new(FunctionRegistry::new());
    let plugin = TestPlugin::default();
    let plugins: [&dyn LegacyPlugin; 2] = [&plugin, &ConflictingPlugin];

    let loaded = load_plugins(&registry, plugins);
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name(), "test-filters");

    let err = load_plugin(&registry, &ConflictingPlugin).unwrap_err();
    let cause = err.downcast_ref::<BridgeError>();
    assert!(matches!(cause, Some(BridgeError::DuplicateRegistration(_))), "{err:?}");
}

#[test]
#[allow(clippy::unwrap_used)]
fn interface_versions_outside_the_supported_range_are_rejected() {
    init_tracing();
    let registry = Arc::new(FunctionRegistry::new());
    assert!(load_plugin(&registry, &VersionedPlugin(1)).is_err());
    assert!(load_plugin(&registry, &VersionedPlugin(7)).is_err());
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
async fn functions_keep_the_version_they_were_registered_with() {
    init_tracing();
    let registry = Arc::new(FunctionRegistry::new());
    let loaded = load_plugin(&registry, &VersionedPlugin(2)).unwrap();
    assert_eq!(loaded.description(), "v2");
    assert_eq!(registry.get("Versioned").map(|f| f.interface_version()), Some(2));

    let source = pattern(PresetFormat::Gray8, 16, 16, 3);
    let node =
        create_filter_in(&registry, &BridgeConfig::default(), "Versioned", &[HostValue::Node(source)], &[])
            .await
            .unwrap();
    let wrapped = node.source_as::<WrappedFilter>().expect("wrapped filter");
    assert_eq!(wrapped.env().interface_version(), 2);
    assert!(wrapped.env().check_version(6).is_ok());
    assert!(node.get_frame(2).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[allow(clippy::unwrap_used)]
async fn construction_failures_are_construction_errors() {
    init_tracing();
    let (registry, _plugin, _loaded) = registry();
    let config = BridgeConfig::default();
    let source = || HostValue::Node(pattern(PresetFormat::Gray8, 16, 16, 3));

    let missing = create_filter_in(&registry, &config, "Sharpen", &[source()], &[]).await.unwrap_err();
    assert!(matches!(missing, BridgeError::Construction(_)));

    let rejected = create_filter_in(&registry, &config, "Reject", &[], &[]).await.unwrap_err();
    assert_eq!(rejected.class(), ErrorClass::Construction);
    assert!(rejected.to_string().contains("refusing to construct"));

    let not_a_clip = create_filter_in(&registry, &config, "NotAClip", &[], &[]).await.unwrap_err();
    assert!(not_a_clip.to_string().contains("instead of a clip"));

    let wrong_type = create_filter_in(&registry, &config, "Invert", &[HostValue::Int(3)], &[]).await.unwrap_err();
    assert!(matches!(wrong_type, BridgeError::Argument(_)));

    let unknown_name =
        create_filter_in(&registry, &config, "Brighten", &[source(), HostValue::Int(4)], &[None, Some("level")])
            .await
            .unwrap_err();
    assert!(matches!(unknown_name, BridgeError::Argument(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[allow(clippy::unwrap_used)]
async fn unsupported_input_formats_are_rejected() {
    init_tracing();
    let (registry, _plugin, _loaded) = registry();
    let deep = pattern(PresetFormat::Yuv420P10, 16, 16, 3);

    let err = create_filter_in(&registry, &BridgeConfig::default(), "Invert", &[HostValue::Node(deep)], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedFormat(_)));
    assert_eq!(err.class(), ErrorClass::Construction);
}
