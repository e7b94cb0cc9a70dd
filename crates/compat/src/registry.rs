// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Process-wide table of legacy filter constructors.
//!
//! Plugins register constructors here while they load. Entries are never
//! removed, and a name cannot be rebound to a different constructor. Lookups
//! take a shared read lock and clone an `Arc`, so they never wait on each other.

use crate::prefetch::PrefetchInfo;
use framebridge_core::{BridgeError, Result};
use framebridge_legacy_sdk::{parse_arg_specs, ApplyFunc, ArgSpec, UserData};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::{debug, warn};

/// A registered constructor and its parsed parameter list.
pub struct WrappedFunction {
    name: String,
    params: String,
    args: Vec<ArgSpec>,
    apply: ApplyFunc,
    user_data: UserData,
    interface_version: i32,
}

impl WrappedFunction {
    /// # Errors
    ///
    /// Returns `BridgeError::Argument` if `params` is not a valid parameter string.
    pub fn new(
        name: &str,
        params: &str,
        apply: ApplyFunc,
        user_data: UserData,
        interface_version: i32,
    ) -> Result<Self> {
        let args = parse_arg_specs(params)
            .map_err(|e| BridgeError::Argument(format!("function '{name}': {e}")))?;
        Ok(Self {
            name: name.to_string(),
            params: params.to_string(),
            args,
            apply,
            user_data,
            interface_version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    pub const fn apply(&self) -> ApplyFunc {
        self.apply
    }

    pub const fn user_data(&self) -> &UserData {
        &self.user_data
    }

    pub const fn interface_version(&self) -> i32 {
        self.interface_version
    }

    /// True if `other` would construct exactly the same filters.
    fn same_as(&self, other: &Self) -> bool {
        let same_data = match (&self.user_data, &other.user_data) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        std::ptr::fn_addr_eq(self.apply, other.apply)
            && self.params == other.params
            && self.interface_version == other.interface_version
            && same_data
    }
}

impl std::fmt::Debug for WrappedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("interface_version", &self.interface_version)
            .finish_non_exhaustive()
    }
}

/// Name-indexed constructor table.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<WrappedFunction>>>,
    prefetch_hints: RwLock<HashMap<String, PrefetchInfo>>,
}

static GLOBAL_REGISTRY: LazyLock<Arc<FunctionRegistry>> = LazyLock::new(|| Arc::new(FunctionRegistry::new()));

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Adds `function`, returning the entry now bound to its name.
    ///
    /// Adding a function identical to the one already registered returns the
    /// existing entry.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::DuplicateRegistration` if the name is bound to a
    /// different constructor. The existing entry is left untouched.
    pub fn add(&self, function: WrappedFunction) -> Result<Arc<WrappedFunction>> {
        let mut functions = self.functions.write().unwrap_or_else(PoisonError::into_inner);
        match functions.entry(function.name.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().same_as(&function) {
                    debug!(function = %function.name, "Function already registered, ignoring identical registration");
                    Ok(Arc::clone(existing.get()))
                } else {
                    warn!(function = %function.name, "Rejected conflicting registration");
                    Err(BridgeError::DuplicateRegistration(function.name))
                }
            },
            Entry::Vacant(slot) => {
                debug!(function = %function.name, params = %function.params, "Registered function");
                Ok(Arc::clone(slot.insert(Arc::new(function))))
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<WrappedFunction>> {
        self.functions.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.functions.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records how the filter called `name` reads its inputs.
    pub fn set_prefetch_hint(&self, name: &str, info: PrefetchInfo) {
        self.prefetch_hints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), info);
    }

    pub fn prefetch_hint(&self, name: &str) -> Option<PrefetchInfo> {
        self.prefetch_hints.read().unwrap_or_else(PoisonError::into_inner).get(name).copied()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.names()).finish_non_exhaustive()
    }
}
