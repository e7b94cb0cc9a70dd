// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Constructing legacy filters from the host side.
//!
//! [`create_filter`] looks a filter up in the registry, builds a fresh
//! environment for it, converts host arguments (nodes become clip adapters),
//! runs the constructor under the environment's single-flight lock and returns
//! the result as an ordinary [`NodeRef`].
//!
//! Constructors may pull frames from their inputs, which blocks on those nodes,
//! so the constructor always runs on a `spawn_blocking` worker.

use crate::args::resolve_args;
use crate::clip::LegacyClipAdapter;
use crate::env::{CallContext, LegacyEnvironment};
use crate::frames::preset_for;
use crate::metrics::metrics;
use crate::prefetch::PrefetchInfo;
use crate::registry::FunctionRegistry;
use crate::wrapped::{AudioPlaceholder, WrappedFilter};
use framebridge_core::{bridge_config, BridgeConfig, BridgeError, ErrorClass, NodeRef, Result, VideoInfo};
use framebridge_legacy_sdk::{LegacyVideoInfo, Value};
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Key of the JSON object that refers to a host node by name.
pub const NODE_REF_KEY: &str = "$node";

/// An argument supplied by the host.
#[derive(Debug, Clone)]
pub enum HostValue {
    Node(NodeRef),
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Array(Vec<HostValue>),
}

impl From<NodeRef> for HostValue {
    fn from(node: NodeRef) -> Self {
        Self::Node(node)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// A host argument list with optional names.
#[derive(Debug, Clone, Default)]
pub struct HostArgs {
    pub values: Vec<HostValue>,
    pub names: Vec<Option<String>>,
}

impl HostArgs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<HostValue>) -> Self {
        self.values.push(value.into());
        self.names.push(None);
        self
    }

    #[must_use]
    pub fn named(mut self, name: &str, value: impl Into<HostValue>) -> Self {
        self.values.push(value.into());
        self.names.push(Some(name.to_string()));
        self
    }

    pub fn name_refs(&self) -> Vec<Option<&str>> {
        self.names.iter().map(Option::as_deref).collect()
    }
}

struct Converter<'a> {
    env: &'a Arc<LegacyEnvironment>,
    upstream: Vec<NodeRef>,
}

impl Converter<'_> {
    #[allow(clippy::cast_possible_truncation)]
    fn convert(&mut self, value: &HostValue) -> Result<Value> {
        Ok(match value {
            HostValue::Node(node) => {
                if !self.upstream.iter().any(|n| NodeRef::ptr_eq(n, node)) {
                    self.upstream.push(node.clone());
                }
                Value::Clip(Arc::new(LegacyClipAdapter::new(node.clone(), self.env)?))
            },
            HostValue::Int(i) => Value::Int(
                i32::try_from(*i)
                    .map_err(|_| BridgeError::Argument(format!("integer {i} does not fit in 32 bits")))?,
            ),
            HostValue::Float(f) => Value::Float(*f as f32),
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::String(s) => Value::string(s),
            HostValue::Array(items) => {
                Value::Array(items.iter().map(|item| self.convert(item)).collect::<Result<_>>()?)
            },
        })
    }
}

fn host_video_info(name: &str, vi: &LegacyVideoInfo) -> Result<VideoInfo> {
    let preset = preset_for(vi.pixel_type);
    let format = preset.format();
    let (Ok(width), Ok(height)) = (u32::try_from(vi.width), u32::try_from(vi.height)) else {
        return Err(BridgeError::Construction(format!(
            "{name} produced invalid dimensions {}x{}",
            vi.width, vi.height
        )));
    };
    if width == 0 || height == 0 {
        return Err(BridgeError::Construction(format!("{name} produced an empty {width}x{height} clip")));
    }
    let w_mask = (1u32 << format.sub_sampling_w) - 1;
    let h_mask = (1u32 << format.sub_sampling_h) - 1;
    if width & w_mask != 0 || height & h_mask != 0 {
        return Err(BridgeError::Construction(format!(
            "{name} produced {width}x{height}, which {} subsampling cannot represent",
            vi.pixel_type
        )));
    }
    Ok(VideoInfo::new(
        preset,
        width,
        height,
        (i64::from(vi.fps_numerator), i64::from(vi.fps_denominator)),
        vi.num_frames,
    ))
}

/// Constructs the legacy filter `name` from the global registry and configuration.
///
/// # Errors
///
/// See [`create_filter_in`].
pub async fn create_filter(name: &str, args: &[HostValue], names: &[Option<&str>]) -> Result<NodeRef> {
    create_filter_in(&FunctionRegistry::global(), bridge_config(), name, args, names).await
}

/// Constructs the legacy filter `name` and wraps it as a host node.
///
/// # Errors
///
/// Returns a construction-class error if the function does not exist, an
/// argument cannot be converted or bound, the constructor fails, panics or
/// returns something other than a clip, or the output clip has no host equivalent.
pub async fn create_filter_in(
    registry: &Arc<FunctionRegistry>,
    config: &BridgeConfig,
    name: &str,
    args: &[HostValue],
    names: &[Option<&str>],
) -> Result<NodeRef> {
    let registry = Arc::clone(registry);
    let config = config.clone();
    let filter = name.to_string();
    let args = args.to_vec();
    let names: Vec<Option<String>> = names.iter().map(|n| n.map(str::to_string)).collect();
    tokio::task::spawn_blocking(move || {
        let names: Vec<Option<&str>> = names.iter().map(Option::as_deref).collect();
        construct(&registry, &config, &filter, &args, &names)
    })
    .await
    .map_err(|e| BridgeError::Construction(format!("constructor of '{name}' panicked: {e}")))?
}

fn construct(
    registry: &Arc<FunctionRegistry>,
    config: &BridgeConfig,
    name: &str,
    args: &[HostValue],
    names: &[Option<&str>],
) -> Result<NodeRef> {
    let function = registry
        .get(name)
        .ok_or_else(|| BridgeError::Construction(format!("there is no filter named '{name}'")))?;
    let env = Arc::new(LegacyEnvironment::new(function.interface_version(), Arc::clone(registry), config));

    let mut converter = Converter { env: &env, upstream: Vec::new() };
    let values = args.iter().map(|arg| converter.convert(arg)).collect::<Result<Vec<_>>>()?;
    let upstream = converter.upstream;
    let resolved = resolve_args(function.args(), values, names)
        .map_err(|e| BridgeError::Argument(format!("{name}: {e}")))?;

    let result = {
        let _guard = env.enter(CallContext::construction(upstream.clone()))?;
        (function.apply())(&resolved, function.user_data(), &*env)
    };
    drop(resolved);
    let clip = match result {
        Ok(Value::Clip(clip)) => clip,
        Ok(other) => {
            return Err(BridgeError::Construction(format!(
                "{name} returned a {} instead of a clip",
                other.type_name()
            )))
        },
        Err(e) if e.class() == ErrorClass::Runtime => {
            return Err(BridgeError::Construction(format!("{name}: {e}")))
        },
        Err(e) => return Err(e),
    };

    let legacy_vi = *clip.video_info();
    let video_info = host_video_info(name, &legacy_vi)?;
    let prefetch = PrefetchInfo::resolve(name, config, registry)?;
    env.finish_initialization();

    debug!(
        filter = name,
        upstream = upstream.len(),
        ?prefetch,
        format = %video_info.format,
        "Constructed legacy filter"
    );
    let wrapped = WrappedFilter::new(
        name,
        clip,
        env,
        upstream,
        prefetch,
        config.prefetch_enabled,
        video_info,
        AudioPlaceholder::from(&legacy_vi),
    );
    metrics().filters_created.add(1, &[KeyValue::new("filter", name.to_string())]);
    info!(
        filter = name,
        width = video_info.width,
        height = video_info.height,
        frames = video_info.num_frames,
        "Created legacy filter node"
    );
    Ok(NodeRef::new(name, wrapped, config.frame_cache_capacity))
}

fn host_value_from_json(value: &serde_json::Value, nodes: &HashMap<String, NodeRef>) -> Result<HostValue> {
    match value {
        serde_json::Value::Bool(b) => Ok(HostValue::Bool(*b)),
        serde_json::Value::Number(num) => {
            if let Some(i) = num.as_i64() {
                return Ok(HostValue::Int(i));
            }
            num.as_f64()
                .map(HostValue::Float)
                .ok_or_else(|| BridgeError::Argument(format!("number {num} is out of range")))
        },
        serde_json::Value::String(s) => Ok(HostValue::String(s.clone())),
        serde_json::Value::Array(items) => {
            Ok(HostValue::Array(items.iter().map(|v| host_value_from_json(v, nodes)).collect::<Result<_>>()?))
        },
        serde_json::Value::Object(map) => {
            let Some(node_name) = map.get(NODE_REF_KEY).and_then(serde_json::Value::as_str) else {
                return Err(BridgeError::Argument(format!(
                    "objects are only allowed as {{\"{NODE_REF_KEY}\": \"name\"}} references"
                )));
            };
            nodes
                .get(node_name)
                .cloned()
                .map(HostValue::Node)
                .ok_or_else(|| BridgeError::Argument(format!("unknown node '{node_name}'")))
        },
        serde_json::Value::Null => Err(BridgeError::Argument("null is not a valid argument".into())),
    }
}

/// Builds an argument list from JSON parameters.
///
/// An array supplies positional arguments. An object supplies named arguments,
/// except for its `"args"` entry, an array of positional arguments. Nodes are
/// referenced as `{"$node": "name"}` and looked up in `nodes`.
///
/// # Errors
///
/// Returns `BridgeError::Argument` for unknown nodes, nulls and other values
/// that have no host equivalent.
pub fn host_args_from_json(params: &serde_json::Value, nodes: &HashMap<String, NodeRef>) -> Result<HostArgs> {
    let mut args = HostArgs::new();
    match params {
        serde_json::Value::Null => {},
        serde_json::Value::Array(items) => {
            for item in items {
                args = args.arg(host_value_from_json(item, nodes)?);
            }
        },
        serde_json::Value::Object(map) => {
            if let Some(positional) = map.get("args") {
                let serde_json::Value::Array(items) = positional else {
                    return Err(BridgeError::Argument("\"args\" must be an array".into()));
                };
                for item in items {
                    args = args.arg(host_value_from_json(item, nodes)?);
                }
            }
            for (key, value) in map.iter().filter(|(key, _)| key.as_str() != "args") {
                args = args.named(key, host_value_from_json(value, nodes)?);
            }
        },
        other => args = args.arg(host_value_from_json(other, nodes)?),
    }
    Ok(args)
}

/// [`create_filter`] with JSON parameters, see [`host_args_from_json`].
///
/// # Errors
///
/// Fails if the parameters cannot be converted or the filter cannot be constructed.
pub async fn create_filter_from_json(
    name: &str,
    params: &serde_json::Value,
    nodes: &HashMap<String, NodeRef>,
) -> Result<NodeRef> {
    let args = host_args_from_json(params, nodes)?;
    create_filter(name, &args.values, &args.name_refs()).await
}
