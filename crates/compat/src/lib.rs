// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Legacy Filter Runtime for FrameBridge
//!
//! This crate runs filters written against the synchronous legacy API as
//! nodes of the multithreaded frame graph. Plugins register constructors in a
//! [`FunctionRegistry`]; [`create_filter`] builds one of them inside its own
//! [`LegacyEnvironment`] and returns a [`NodeRef`](framebridge_core::NodeRef)
//! the engine schedules like any native node.

pub mod args;
pub mod clip;
pub mod env;
pub mod frames;
pub mod host;
pub mod metrics;
pub mod prefetch;
pub mod registry;
pub mod wrapped;

use anyhow::{anyhow, Context, Result};
use framebridge_core::bridge_config;
use framebridge_legacy_sdk::{LegacyPlugin, LEGACY_INTERFACE_VERSION, MAX_INTERFACE_VERSION};
use std::sync::Arc;
use tracing::{info, warn};

pub use args::resolve_args;
pub use clip::LegacyClipAdapter;
pub use env::{CallContext, LegacyEnvironment, SingleFlightGuard};
pub use frames::{colorspace_for, preset_for, to_legacy, to_modern, OwnedFrames};
pub use host::{
    create_filter, create_filter_from_json, create_filter_in, host_args_from_json, HostArgs, HostValue,
};
pub use prefetch::PrefetchInfo;
pub use registry::{FunctionRegistry, WrappedFunction};
pub use wrapped::{AudioPlaceholder, WrappedFilter};

/// A plugin whose functions have been registered.
///
/// The environment the plugin was initialized in stays alive with this value;
/// shutdown hooks the plugin registered during initialization run when it is
/// dropped.
pub struct LoadedPlugin {
    name: String,
    description: String,
    functions: Vec<String>,
    env: Arc<env::LegacyEnvironment>,
}

impl LoadedPlugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Functions the plugin registered, sorted.
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    pub const fn env(&self) -> &Arc<env::LegacyEnvironment> {
        &self.env
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

/// Initializes `plugin` and registers its functions and prefetch hints in `registry`.
///
/// # Errors
///
/// Returns an error if:
/// - The plugin speaks an interface version the bridge does not support
/// - The plugin's initialization fails, including conflicting registrations
/// - A prefetch hint is invalid
pub fn load_plugin(registry: &Arc<FunctionRegistry>, plugin: &dyn LegacyPlugin) -> Result<LoadedPlugin> {
    let name = plugin.name().to_string();
    let version = plugin.interface_version();
    info!(plugin = %name, version, "Loading legacy plugin");

    if !(LEGACY_INTERFACE_VERSION..=MAX_INTERFACE_VERSION).contains(&version) {
        return Err(anyhow!(
            "Plugin '{name}' uses interface version {version}, host supports {LEGACY_INTERFACE_VERSION} to {MAX_INTERFACE_VERSION}"
        ));
    }

    let env = Arc::new(env::LegacyEnvironment::new(version, Arc::clone(registry), bridge_config()));
    let description =
        plugin.init(&*env).with_context(|| format!("Failed to initialize plugin '{name}'"))?;

    for (function, hint) in plugin.prefetch_hints() {
        let info = PrefetchInfo::try_from(hint)
            .with_context(|| format!("Invalid prefetch hint for '{function}' in plugin '{name}'"))?;
        registry.set_prefetch_hint(&function, info);
    }

    let functions = env.registered_functions();
    info!(plugin = %name, functions = functions.len(), "Successfully loaded legacy plugin");
    Ok(LoadedPlugin { name, description, functions, env })
}

/// Loads every plugin, skipping those that fail.
pub fn load_plugins<'a>(
    registry: &Arc<FunctionRegistry>,
    plugins: impl IntoIterator<Item = &'a dyn LegacyPlugin>,
) -> Vec<LoadedPlugin> {
    plugins
        .into_iter()
        .filter_map(|plugin| match load_plugin(registry, plugin) {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                warn!(plugin = plugin.name(), error = ?e, "Skipping legacy plugin");
                None
            },
        })
        .collect()
}
