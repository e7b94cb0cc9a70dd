// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The environment handed to legacy filters.
//!
//! One [`LegacyEnvironment`] serves one wrapped filter. Legacy code expects the
//! environment to describe "the current call" (which frame is being computed,
//! which upstream nodes it may touch), so every call into the filter first takes
//! the environment's single-flight lock with [`LegacyEnvironment::enter`], which
//! publishes a [`CallContext`] for exactly as long as the returned guard lives.
//! Calls into different environments never contend.

use crate::args::resolve_args;
use crate::frames::OwnedFrames;
use crate::metrics::metrics;
use crate::registry::{FunctionRegistry, WrappedFunction};
use framebridge_core::frame_pool::FramePool;
use framebridge_core::log::fatal;
use framebridge_core::{BridgeConfig, BridgeError, NodeRef, Result};
use framebridge_legacy_sdk::{
    bit_blt, ApplyFunc, LegacyFrame, LegacyVideoInfo, PlaneLayout, ScriptEnvironment, ShutdownFunc,
    UserData, Value, VideoFrame, VideoFrameBuffer, CPUF_AVX, CPUF_AVX2, CPUF_FPU, CPUF_INTEGER_SSE,
    CPUF_MMX, CPUF_SSE, CPUF_SSE2, CPUF_SSE3, CPUF_SSE4_1, CPUF_SSE4_2, CPUF_SSSE3,
    MAX_INTERFACE_VERSION,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// What the filter is being asked to do, valid while a call is in flight.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Output frame being computed, or -1 during construction.
    pub n: i32,
    /// Token of the host request driving the call, 0 during construction.
    pub token: u64,
    pub upstream: Vec<NodeRef>,
}

impl CallContext {
    pub fn frame(n: i32, token: u64, upstream: Vec<NodeRef>) -> Self {
        Self { n, token, upstream }
    }

    pub fn construction(upstream: Vec<NodeRef>) -> Self {
        Self { n: -1, token: 0, upstream }
    }
}

/// Holds an environment's single-flight lock. Dropping it clears the call context.
pub struct SingleFlightGuard<'a> {
    env: &'a LegacyEnvironment,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.env.call) = None;
        *lock(&self.env.holder) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

const fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_cpu_flags() -> u32 {
    let mut flags = CPUF_FPU;
    if std::arch::is_x86_feature_detected!("sse") {
        flags |= CPUF_MMX | CPUF_SSE | CPUF_INTEGER_SSE;
    }
    let features = [
        (std::arch::is_x86_feature_detected!("sse2"), CPUF_SSE2),
        (std::arch::is_x86_feature_detected!("sse3"), CPUF_SSE3),
        (std::arch::is_x86_feature_detected!("ssse3"), CPUF_SSSE3),
        (std::arch::is_x86_feature_detected!("sse4.1"), CPUF_SSE4_1),
        (std::arch::is_x86_feature_detected!("sse4.2"), CPUF_SSE4_2),
        (std::arch::is_x86_feature_detected!("avx"), CPUF_AVX),
        (std::arch::is_x86_feature_detected!("avx2"), CPUF_AVX2),
    ];
    for (present, bit) in features {
        if present {
            flags |= bit;
        }
    }
    flags
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
const fn detect_cpu_flags() -> u32 {
    0
}

/// Environment adapter for one legacy filter chain.
pub struct LegacyEnvironment {
    interface_version: i32,
    registry: Arc<FunctionRegistry>,
    alignment: usize,
    max_slow_path_warnings: u32,
    pool: FramePool<u8>,
    owned_frames: Arc<OwnedFrames>,

    single_flight: Mutex<()>,
    holder: Mutex<Option<ThreadId>>,
    call: Mutex<Option<CallContext>>,
    initializing: AtomicBool,

    /// Innermost scope last. The first entry is the base scope and is never popped.
    scopes: Mutex<Vec<HashMap<String, Value>>>,
    globals: Mutex<HashMap<String, Value>>,
    functions: Mutex<HashSet<String>>,
    saved_strings: Mutex<Vec<Arc<str>>>,
    at_exit: Mutex<Vec<(ShutdownFunc, UserData)>>,
    memory_max: AtomicI32,
    slow_path_fetches: AtomicU64,
}

impl LegacyEnvironment {
    pub fn new(interface_version: i32, registry: Arc<FunctionRegistry>, config: &BridgeConfig) -> Self {
        Self {
            interface_version,
            registry,
            alignment: config.frame_alignment,
            max_slow_path_warnings: config.max_slow_path_warnings,
            pool: FramePool::plane_default(),
            owned_frames: Arc::new(OwnedFrames::new()),
            single_flight: Mutex::new(()),
            holder: Mutex::new(None),
            call: Mutex::new(None),
            initializing: AtomicBool::new(true),
            scopes: Mutex::new(vec![HashMap::new()]),
            globals: Mutex::new(HashMap::new()),
            functions: Mutex::new(HashSet::new()),
            saved_strings: Mutex::new(Vec::new()),
            at_exit: Mutex::new(Vec::new()),
            memory_max: AtomicI32::new(0),
            slow_path_fetches: AtomicU64::new(0),
        }
    }

    /// Takes the single-flight lock and publishes `ctx` until the guard is dropped.
    ///
    /// Blocks while another thread is inside a call.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::LockViolation` if the calling thread already holds the lock.
    pub fn enter(&self, ctx: CallContext) -> Result<SingleFlightGuard<'_>> {
        let me = thread::current().id();
        if *lock(&self.holder) == Some(me) {
            return Err(BridgeError::LockViolation(format!(
                "re-entrant call for frame {} while thread {me:?} is already inside this environment",
                ctx.n
            )));
        }

        let started = Instant::now();
        let guard = lock(&self.single_flight);
        metrics().single_flight_wait.record(started.elapsed().as_secs_f64(), &[]);

        *lock(&self.holder) = Some(me);
        trace!(frame = ctx.n, token = ctx.token, "Entered legacy call");
        *lock(&self.call) = Some(ctx);
        Ok(SingleFlightGuard { env: self, _lock: guard })
    }

    /// True while some thread holds the single-flight lock.
    pub fn in_call(&self) -> bool {
        lock(&self.call).is_some()
    }

    /// True if the calling thread holds the single-flight lock.
    pub fn holds_lock(&self) -> bool {
        *lock(&self.holder) == Some(thread::current().id())
    }

    /// A copy of the current call context, if a call is in flight.
    pub fn call_context(&self) -> Option<CallContext> {
        lock(&self.call).clone()
    }

    pub fn finish_initialization(&self) {
        self.initializing.store(false, Ordering::Release);
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    pub const fn owned_frames(&self) -> &Arc<OwnedFrames> {
        &self.owned_frames
    }

    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    pub const fn max_slow_path_warnings(&self) -> u32 {
        self.max_slow_path_warnings
    }

    /// Upstream frames the filter pulled that had not been prefetched.
    pub fn slow_path_fetches(&self) -> u64 {
        self.slow_path_fetches.load(Ordering::Relaxed)
    }

    pub(crate) fn record_slow_path(&self) {
        self.slow_path_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Names registered through this environment, sorted.
    pub fn registered_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.functions).iter().cloned().collect();
        names.sort();
        names
    }

    /// Number of pushed scopes.
    pub fn scope_depth(&self) -> usize {
        lock(&self.scopes).len() - 1
    }

    /// Allocates one writable buffer holding planes of the given `(row_size, height)`.
    fn allocate(&self, planes: &[(usize, usize)], align: usize) -> Result<LegacyFrame> {
        let align = align.max(self.alignment);
        let mut layouts = Vec::with_capacity(planes.len());
        let mut offset = 0;
        for &(row_size, height) in planes {
            let pitch = align_up(row_size, align);
            layouts.push(PlaneLayout { segment: 0, offset, pitch, row_size, height });
            offset += align_up(pitch * height, align);
        }
        let buffer = VideoFrameBuffer::owned(self.pool.get(offset));
        Ok(LegacyFrame::new(VideoFrame::new(Arc::new(buffer), layouts)?))
    }
}

impl std::fmt::Debug for LegacyEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyEnvironment")
            .field("interface_version", &self.interface_version)
            .field("in_call", &self.in_call())
            .field("initializing", &self.is_initializing())
            .field("owned_frames", &self.owned_frames.len())
            .finish_non_exhaustive()
    }
}

impl ScriptEnvironment for LegacyEnvironment {
    fn interface_version(&self) -> i32 {
        self.interface_version
    }

    fn check_version(&self, version: i32) -> Result<()> {
        if version > MAX_INTERFACE_VERSION {
            return Err(BridgeError::Construction(format!(
                "interface version {version} requested, at most {MAX_INTERFACE_VERSION} is supported"
            )));
        }
        Ok(())
    }

    fn cpu_flags(&self) -> u32 {
        static FLAGS: OnceLock<u32> = OnceLock::new();
        *FLAGS.get_or_init(detect_cpu_flags)
    }

    fn save_string(&self, s: &str) -> Arc<str> {
        let saved: Arc<str> = Arc::from(s);
        lock(&self.saved_strings).push(Arc::clone(&saved));
        saved
    }

    fn throw_error(&self, message: &str) -> BridgeError {
        fatal(message, self.is_initializing())
    }

    fn add_function(&self, name: &str, params: &str, apply: ApplyFunc, user_data: UserData) -> Result<()> {
        let function = WrappedFunction::new(name, params, apply, user_data, self.interface_version)?;
        let mut functions = lock(&self.functions);
        self.registry.add(function)?;
        functions.insert(name.to_string());
        Ok(())
    }

    fn function_exists(&self, name: &str) -> bool {
        lock(&self.functions).contains(name) || self.registry.contains(name)
    }

    /// Calls `name` inside this environment. A clip it returns is not wrapped as a
    /// node: the nested filter shares the caller's lock and is not prefetched.
    fn invoke(&self, name: &str, args: &Value, arg_names: &[Option<&str>]) -> Result<Value> {
        let Some(function) = self.registry.get(name) else {
            return Err(BridgeError::Construction(format!("there is no function named '{name}'")));
        };
        let values = match args {
            Value::Array(items) => items.clone(),
            Value::Void => Vec::new(),
            other => vec![other.clone()],
        };
        let resolved = resolve_args(function.args(), values, arg_names)
            .map_err(|e| BridgeError::Argument(format!("{name}: {e}")))?;
        debug!(function = name, depth = self.scope_depth(), "Invoking function");
        (function.apply())(&resolved, function.user_data(), self)
    }

    fn get_var(&self, name: &str) -> Result<Value> {
        let scopes = lock(&self.scopes);
        if let Some(value) = scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(value.clone());
        }
        drop(scopes);
        lock(&self.globals)
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::VariableNotFound(name.to_string()))
    }

    fn set_var(&self, name: &str, value: Value) -> bool {
        let mut scopes = lock(&self.scopes);
        scopes.last_mut().is_some_and(|scope| scope.insert(name.to_string(), value).is_none())
    }

    fn set_global_var(&self, name: &str, value: Value) -> bool {
        lock(&self.globals).insert(name.to_string(), value).is_none()
    }

    fn push_context(&self, level: i32) {
        let mut scopes = lock(&self.scopes);
        scopes.push(HashMap::new());
        trace!(level, depth = scopes.len() - 1, "Pushed scope");
    }

    fn pop_context(&self) -> Result<()> {
        let mut scopes = lock(&self.scopes);
        if scopes.len() <= 1 {
            return Err(BridgeError::ScopeUnderflow);
        }
        scopes.pop();
        Ok(())
    }

    fn new_video_frame(&self, vi: &LegacyVideoInfo, align: usize) -> Result<LegacyFrame> {
        if !vi.has_video() {
            return Err(BridgeError::Runtime(format!(
                "cannot allocate a {}x{} frame",
                vi.width, vi.height
            )));
        }
        let planes: Vec<(usize, usize)> =
            (0..vi.num_planes()).map(|p| (vi.row_size(p), vi.plane_height(p))).collect();
        self.allocate(&planes, align)
    }

    fn make_writable(&self, frame: &mut LegacyFrame) -> Result<bool> {
        if frame.is_writable() {
            return Ok(false);
        }
        let planes: Vec<(usize, usize)> =
            (0..frame.num_planes()).map(|p| (frame.row_size(p), frame.height(p))).collect();
        let mut copy = self.allocate(&planes, self.alignment)?;
        for (p, &(row_size, height)) in planes.iter().enumerate() {
            let pitch = copy.pitch(p);
            let dst = copy
                .write_plane(p)
                .ok_or_else(|| BridgeError::Runtime("freshly allocated frame is not writable".into()))?;
            bit_blt(dst, pitch, frame.read(p), frame.pitch(p), row_size, height)?;
        }
        trace!(from = %frame.id(), to = %copy.id(), "Copied shared frame to make it writable");
        *frame = copy;
        Ok(true)
    }

    fn at_exit(&self, func: ShutdownFunc, user_data: UserData) {
        lock(&self.at_exit).push((func, user_data));
    }

    fn set_memory_max(&self, mem: i32) -> i32 {
        if mem > 0 {
            self.memory_max.store(mem, Ordering::Relaxed);
        }
        self.memory_max.load(Ordering::Relaxed)
    }

    fn set_working_dir(&self, dir: &str) -> Result<()> {
        debug!(dir, "Ignoring working directory change");
        Ok(())
    }

    fn manage_cache(&self, key: i32, _data: i64) -> i64 {
        trace!(key, "Ignoring cache management request");
        0
    }

    fn planar_chroma_alignment(&self, _key: i32) -> bool {
        true
    }
}

impl Drop for LegacyEnvironment {
    fn drop(&mut self) {
        let released = self.owned_frames.clear();
        if released > 0 {
            warn!(released, "Environment destroyed while legacy code still held host frames");
        }
        let hooks = std::mem::take(&mut *lock(&self.at_exit));
        for (func, user_data) in hooks.into_iter().rev() {
            func(&user_data, &*self);
        }
        debug!(interface_version = self.interface_version, "Destroyed legacy environment");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use framebridge_legacy_sdk::Colorspace;
    use std::sync::atomic::AtomicUsize;

    fn env() -> LegacyEnvironment {
        LegacyEnvironment::new(MAX_INTERFACE_VERSION, Arc::new(FunctionRegistry::new()), &BridgeConfig::default())
    }

    fn constant(args: &Value, _: &UserData, _: &dyn ScriptEnvironment) -> Result<Value> {
        Ok(args.get(0).cloned().unwrap_or_default())
    }

    fn twice(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
        let value = args.get(0).and_then(Value::as_int).unwrap_or(0);
        env.invoke("Constant", &Value::Int(value * 2), &[])
    }

    #[test]
    fn scopes_hide_popped_variables() {
        let env = env();
        assert!(matches!(env.pop_context(), Err(BridgeError::ScopeUnderflow)));

        env.set_global_var("g", Value::Int(1));
        env.push_context(0);
        assert!(env.set_var("x", Value::Int(2)));
        assert!(!env.set_var("x", Value::Int(3)));
        assert_eq!(env.get_var("x").unwrap(), Value::Int(3));
        assert_eq!(env.get_var("g").unwrap(), Value::Int(1));
        assert_eq!(env.scope_depth(), 1);

        env.pop_context().unwrap();
        assert!(matches!(env.get_var("x"), Err(BridgeError::VariableNotFound(_))));
        assert_eq!(env.get_var_def("x", Value::Bool(true)), Value::Bool(true));
        assert!(matches!(env.pop_context(), Err(BridgeError::ScopeUnderflow)));
    }

    #[test]
    fn nested_invoke_uses_the_same_environment() {
        let env = env();
        env.add_function("Constant", "i", constant, None).unwrap();
        env.add_function("Twice", "i", twice, None).unwrap();
        assert!(env.function_exists("Twice"));
        assert!(!env.function_exists("Thrice"));
        assert_eq!(env.invoke("Twice", &Value::Array(vec![Value::Int(4)]), &[]).unwrap(), Value::Int(8));
        assert!(matches!(env.invoke("Twice", &Value::string("x"), &[]), Err(BridgeError::Argument(_))));
        assert!(env.invoke("Thrice", &Value::Void, &[]).is_err());
        assert_eq!(env.registered_functions(), vec!["Constant".to_string(), "Twice".to_string()]);
    }

    #[test]
    fn single_flight_publishes_context_and_rejects_reentry() {
        let env = env();
        assert!(!env.in_call());
        {
            let _guard = env.enter(CallContext::frame(4, 9, Vec::new())).unwrap();
            assert!(env.in_call());
            assert!(env.holds_lock());
            std::thread::scope(|scope| {
                let other = scope.spawn(|| (env.in_call(), env.holds_lock()));
                assert_eq!(other.join().unwrap(), (true, false));
            });
            assert_eq!(env.call_context().unwrap().n, 4);
            let err = env.enter(CallContext::frame(5, 10, Vec::new())).err().unwrap();
            assert!(err.is_fatal());
        }
        assert!(env.call_context().is_none());
        assert!(!env.holds_lock());
        assert!(env.enter(CallContext::construction(Vec::new())).is_ok());
    }

    #[test]
    fn throw_error_class_follows_initialization() {
        let env = env();
        assert!(matches!(env.throw_error("bad args"), BridgeError::Construction(_)));
        env.finish_initialization();
        assert!(matches!(env.throw_error("bad frame"), BridgeError::Runtime(_)));
    }

    #[test]
    fn make_writable_copies_shared_frames() {
        let env = env();
        let vi = LegacyVideoInfo::new(40, 8, Colorspace::Yv12, (25, 1), 1);
        let mut frame = env.new_video_frame(&vi, 16).unwrap();
        assert_eq!(frame.pitch(0), 64);
        assert_eq!(frame.row_size(1), 20);
        frame.row_mut(1, 3).unwrap().fill(42);

        assert!(!env.make_writable(&mut frame).unwrap());

        let shared = frame.clone();
        assert!(env.make_writable(&mut frame).unwrap());
        assert!(!LegacyFrame::ptr_eq(&frame, &shared));
        assert_eq!(frame.row(1, 3), shared.row(1, 3));
        frame.row_mut(1, 3).unwrap().fill(7);
        assert_eq!(shared.row(1, 3)[0], 42);

        let empty = LegacyVideoInfo::new(0, 0, Colorspace::Y8, (25, 1), 1);
        assert!(env.new_video_frame(&empty, 16).is_err());
    }

    static HOOK_ORDER: AtomicUsize = AtomicUsize::new(0);

    fn first_hook(data: &UserData, _: &dyn ScriptEnvironment) {
        let slot = data.as_ref().and_then(|d| d.downcast_ref::<AtomicUsize>()).unwrap();
        slot.store(HOOK_ORDER.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
    }

    #[test]
    fn exit_hooks_run_in_reverse() {
        let a = Arc::new(AtomicUsize::new(usize::MAX));
        let b = Arc::new(AtomicUsize::new(usize::MAX));
        let env = env();
        env.at_exit(first_hook, Some(Arc::clone(&a) as Arc<dyn std::any::Any + Send + Sync>));
        env.at_exit(first_hook, Some(Arc::clone(&b) as Arc<dyn std::any::Any + Send + Sync>));
        drop(env);
        assert!(b.load(Ordering::SeqCst) < a.load(Ordering::SeqCst));
    }

    #[test]
    fn host_knobs_are_neutral() {
        let env = env();
        assert_eq!(env.set_memory_max(0), 0);
        assert_eq!(env.set_memory_max(512), 512);
        assert_eq!(env.set_memory_max(-1), 512);
        assert!(env.set_working_dir("/tmp").is_ok());
        assert_eq!(env.manage_cache(1, 2), 0);
        assert!(env.check_version(MAX_INTERFACE_VERSION).is_ok());
        assert!(env.check_version(MAX_INTERFACE_VERSION + 1).is_err());
        let saved = env.save_string("label");
        assert_eq!(&*saved, "label");
    }
}
