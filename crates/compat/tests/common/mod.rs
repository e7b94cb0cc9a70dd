// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Small legacy filters used by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use framebridge_compat::{load_plugin, FunctionRegistry, LoadedPlugin};
use framebridge_core::{NodeRef, PatternSource, PresetFormat, VideoInfo};
use framebridge_legacy_sdk::prelude::*;
use framebridge_legacy_sdk::SAMPLE_FLOAT;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

pub fn pattern(preset: PresetFormat, width: u32, height: u32, frames: i32) -> NodeRef {
    let vi = VideoInfo::new(preset, width, height, (30000, 1001), frames);
    NodeRef::new("pattern", PatternSource::new(vi), 8)
}

/// Start and end of every `Sleepy` frame computation.
#[derive(Debug, Default)]
pub struct SpanLog(Mutex<Vec<(Instant, Instant)>>);

impl SpanLog {
    /// Recorded spans, earliest start first.
    pub fn sorted(&self) -> Vec<(Instant, Instant)> {
        let mut spans = self.0.lock().unwrap().clone();
        spans.sort_by_key(|span| span.0);
        spans
    }
}

fn child(args: &Value, env: &dyn ScriptEnvironment, filter: &str) -> Result<PClip> {
    args.get(0)
        .and_then(Value::as_clip)
        .cloned()
        .ok_or_else(|| env.throw_error(&format!("{filter}: the first argument must be a clip")))
}

/// Returns its input unchanged, optionally with a different description.
struct Passthrough {
    child: PClip,
    vi: LegacyVideoInfo,
}

impl Passthrough {
    fn new(child: PClip) -> Self {
        let vi = *child.video_info();
        Self { child, vi }
    }
}

impl Clip for Passthrough {
    fn get_frame(&self, n: i32, env: &dyn ScriptEnvironment) -> Result<LegacyFrame> {
        self.child.get_frame(n, env)
    }

    fn get_parity(&self, n: i32) -> bool {
        self.child.get_parity(n)
    }

    fn get_audio(&self, buf: &mut [u8], start: i64, count: i64, env: &dyn ScriptEnvironment) -> Result<()> {
        self.child.get_audio(buf, start, count, env)
    }

    fn set_cache_hints(&self, _hints: i32, _frame_range: i32) -> i32 {
        0
    }

    fn video_info(&self) -> &LegacyVideoInfo {
        &self.vi
    }
}

/// Maps every sample through `f` into a newly allocated frame.
struct PointFilter {
    child: PClip,
    f: fn(u8, i32) -> u8,
    param: i32,
}

impl Clip for PointFilter {
    fn get_frame(&self, n: i32, env: &dyn ScriptEnvironment) -> Result<LegacyFrame> {
        let src = self.child.get_frame(n, env)?;
        let vi = self.child.video_info();
        let mut dst = env.new_video_frame(vi, 16)?;
        for p in 0..vi.num_planes() {
            for y in 0..src.height(p) {
                let row: Vec<u8> = src.row(p, y).iter().map(|&b| (self.f)(b, self.param)).collect();
                dst.row_mut(p, y)
                    .ok_or_else(|| env.throw_error("point filter: destination is not writable"))?
                    .copy_from_slice(&row);
            }
        }
        Ok(dst)
    }

    fn get_parity(&self, _n: i32) -> bool {
        false
    }

    fn get_audio(&self, _buf: &mut [u8], _start: i64, _count: i64, _env: &dyn ScriptEnvironment) -> Result<()> {
        Ok(())
    }

    fn set_cache_hints(&self, _hints: i32, _frame_range: i32) -> i32 {
        0
    }

    fn video_info(&self) -> &LegacyVideoInfo {
        self.child.video_info()
    }
}

/// Averages frames `n - 1`, `n` and `n + 1`.
struct TemporalAverage {
    child: PClip,
}

impl Clip for TemporalAverage {
    fn get_frame(&self, n: i32, env: &dyn ScriptEnvironment) -> Result<LegacyFrame> {
        let last = self.child.video_info().num_frames - 1;
        let frames = [
            self.child.get_frame((n - 1).clamp(0, last), env)?,
            self.child.get_frame(n, env)?,
            self.child.get_frame((n + 1).clamp(0, last), env)?,
        ];
        let vi = self.child.video_info();
        let mut dst = env.new_video_frame(vi, 16)?;
        for p in 0..vi.num_planes() {
            for y in 0..frames[1].height(p) {
                let row: Vec<u8> = (0..frames[1].row_size(p))
                    .map(|x| {
                        let sum: u16 = frames.iter().map(|f| u16::from(f.row(p, y)[x])).sum();
                        u8::try_from(sum / 3).unwrap_or(u8::MAX)
                    })
                    .collect();
                dst.row_mut(p, y)
                    .ok_or_else(|| env.throw_error("TemporalAverage: destination is not writable"))?
                    .copy_from_slice(&row);
            }
        }
        Ok(dst)
    }

    fn get_parity(&self, _n: i32) -> bool {
        false
    }

    fn get_audio(&self, _buf: &mut [u8], _start: i64, _count: i64, _env: &dyn ScriptEnvironment) -> Result<()> {
        Ok(())
    }

    fn set_cache_hints(&self, _hints: i32, _frame_range: i32) -> i32 {
        0
    }

    fn video_info(&self) -> &LegacyVideoInfo {
        self.child.video_info()
    }
}

/// Passes frames through after sleeping, recording when each call ran.
struct Sleepy {
    child: PClip,
    log: Arc<SpanLog>,
    delay: Duration,
}

impl Clip for Sleepy {
    fn get_frame(&self, n: i32, env: &dyn ScriptEnvironment) -> Result<LegacyFrame> {
        let start = Instant::now();
        let frame = self.child.get_frame(n, env)?;
        std::thread::sleep(self.delay);
        self.log.0.lock().unwrap().push((start, Instant::now()));
        Ok(frame)
    }

    fn get_parity(&self, _n: i32) -> bool {
        false
    }

    fn get_audio(&self, _buf: &mut [u8], _start: i64, _count: i64, _env: &dyn ScriptEnvironment) -> Result<()> {
        Ok(())
    }

    fn set_cache_hints(&self, _hints: i32, _frame_range: i32) -> i32 {
        0
    }

    fn video_info(&self) -> &LegacyVideoInfo {
        self.child.video_info()
    }
}

/// Fails on odd frames.
struct FailOdd {
    child: PClip,
}

impl Clip for FailOdd {
    fn get_frame(&self, n: i32, env: &dyn ScriptEnvironment) -> Result<LegacyFrame> {
        if n % 2 == 1 {
            return Err(env.throw_error(&format!("FailOdd: frame {n} is odd")));
        }
        self.child.get_frame(n, env)
    }

    fn get_parity(&self, _n: i32) -> bool {
        false
    }

    fn get_audio(&self, _buf: &mut [u8], _start: i64, _count: i64, _env: &dyn ScriptEnvironment) -> Result<()> {
        Ok(())
    }

    fn set_cache_hints(&self, _hints: i32, _frame_range: i32) -> i32 {
        0
    }

    fn video_info(&self) -> &LegacyVideoInfo {
        self.child.video_info()
    }
}

fn invert_sample(b: u8, _: i32) -> u8 {
    255 - b
}

fn brighten_sample(b: u8, gain: i32) -> u8 {
    u8::try_from((i32::from(b) + gain).clamp(0, 255)).unwrap_or(u8::MAX)
}

fn create_passthrough(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    Ok(Value::Clip(Arc::new(Passthrough::new(child(args, env, "Passthrough")?))))
}

fn create_invert(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    let child = child(args, env, "Invert")?;
    Ok(Value::Clip(Arc::new(PointFilter { child, f: invert_sample, param: 0 })))
}

fn create_brighten(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    let child = child(args, env, "Brighten")?;
    let gain = args.get(1).map_or(16, |v| v.int_or(16));
    Ok(Value::Clip(Arc::new(PointFilter { child, f: brighten_sample, param: gain })))
}

fn create_temporal_average(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    Ok(Value::Clip(Arc::new(TemporalAverage { child: child(args, env, "TemporalAverage")? })))
}

fn create_sleepy(args: &Value, user_data: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    let child = child(args, env, "Sleepy")?;
    let log = user_data
        .clone()
        .and_then(|data| data.downcast::<SpanLog>().ok())
        .ok_or_else(|| env.throw_error("Sleepy: missing span log"))?;
    let delay = args.get(1).map_or(100, |v| v.int_or(100));
    let delay = Duration::from_millis(u64::try_from(delay).unwrap_or(0));
    Ok(Value::Clip(Arc::new(Sleepy { child, log, delay })))
}

fn create_fail_odd(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    Ok(Value::Clip(Arc::new(FailOdd { child: child(args, env, "FailOdd")? })))
}

fn create_not_a_clip(_: &Value, _: &UserData, _: &dyn ScriptEnvironment) -> Result<Value> {
    Ok(Value::Int(1))
}

fn create_reject(_: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    Err(env.throw_error("Reject: refusing to construct"))
}

/// Brightens its input by the first sample of the input's last frame, read
/// while constructing.
fn create_add_last(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    let child = child(args, env, "AddLast")?;
    let last = child.video_info().num_frames - 1;
    let gain = i32::from(child.get_frame(last, env)?.row(0, 0)[0]);
    Ok(Value::Clip(Arc::new(PointFilter { child, f: brighten_sample, param: gain })))
}

fn create_explode(_: &Value, _: &UserData, _: &dyn ScriptEnvironment) -> Result<Value> {
    panic!("Explode: constructor panicked");
}

/// Builds an inverted copy of its input through a nested invocation.
fn create_chain(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    let child = child(args, env, "Chain")?;
    env.push_context(1);
    env.set_var("chain_input", Value::Clip(Arc::clone(&child)));
    let result = env.invoke("Invert", &Value::Array(vec![Value::Clip(child)]), &[]);
    env.pop_context()?;
    result
}

/// Passes its input through with motion-vector style data in the audio fields.
fn create_vectors(args: &Value, _: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    let mut clip = Passthrough::new(child(args, env, "Vectors")?);
    clip.vi.num_audio_samples = 1234;
    clip.vi.nchannels = 2;
    clip.vi.sample_type = SAMPLE_FLOAT;
    Ok(Value::Clip(Arc::new(clip)))
}

fn set_exit_flag(user_data: &UserData, _: &dyn ScriptEnvironment) {
    if let Some(flag) = user_data.as_ref().and_then(|d| d.downcast_ref::<AtomicBool>()) {
        flag.store(true, Ordering::SeqCst);
    }
}

fn create_exit_flag(args: &Value, user_data: &UserData, env: &dyn ScriptEnvironment) -> Result<Value> {
    env.at_exit(set_exit_flag, user_data.clone());
    create_passthrough(args, user_data, env)
}

/// The test plugin. Shared state is handed to filters as registration user data.
#[derive(Default)]
pub struct TestPlugin {
    pub spans: Arc<SpanLog>,
    pub exit_flag: Arc<AtomicBool>,
}

impl LegacyPlugin for TestPlugin {
    fn name(&self) -> &str {
        "test-filters"
    }

    fn init(&self, env: &dyn ScriptEnvironment) -> Result<String> {
        env.add_function("Passthrough", "c", create_passthrough, None)?;
        env.add_function("Invert", "c", create_invert, None)?;
        env.add_function("Brighten", "c[gain]i", create_brighten, None)?;
        env.add_function("TemporalAverage", "c", create_temporal_average, None)?;
        let spans: Arc<dyn std::any::Any + Send + Sync> = Arc::clone(&self.spans) as _;
        env.add_function("Sleepy", "c[delay]i", create_sleepy, Some(spans))?;
        env.add_function("FailOdd", "c", create_fail_odd, None)?;
        env.add_function("NotAClip", "", create_not_a_clip, None)?;
        env.add_function("Reject", "", create_reject, None)?;
        env.add_function("AddLast", "c", create_add_last, None)?;
        env.add_function("Explode", "", create_explode, None)?;
        env.add_function("Chain", "c", create_chain, None)?;
        env.add_function("Vectors", "c", create_vectors, None)?;
        let flag: Arc<dyn std::any::Any + Send + Sync> = Arc::clone(&self.exit_flag) as _;
        env.add_function("ExitFlag", "c", create_exit_flag, Some(flag))?;
        Ok("Filters for bridge tests".to_string())
    }

    fn prefetch_hints(&self) -> Vec<(String, PrefetchHint)> {
        vec![("TemporalAverage".to_string(), PrefetchHint::radius(1))]
    }
}

/// Registers a single passthrough filter, `Versioned`, at the given interface version.
pub struct VersionedPlugin(pub i32);

impl LegacyPlugin for VersionedPlugin {
    fn name(&self) -> &str {
        "versioned"
    }

    fn interface_version(&self) -> i32 {
        self.0
    }

    fn init(&self, env: &dyn ScriptEnvironment) -> Result<String> {
        env.add_function("Versioned", "c", create_passthrough, None)?;
        Ok(format!("v{}", env.interface_version()))
    }
}

/// Tries to claim `Invert` with a different constructor.
pub struct ConflictingPlugin;

impl LegacyPlugin for ConflictingPlugin {
    fn name(&self) -> &str {
        "conflicting"
    }

    fn init(&self, env: &dyn ScriptEnvironment) -> Result<String> {
        env.add_function("Invert", "c", create_passthrough, None)?;
        Ok("Never loads".to_string())
    }
}

/// A fresh registry with [`TestPlugin`] loaded.
pub fn registry() -> (Arc<FunctionRegistry>, Arc<TestPlugin>, LoadedPlugin) {
    let registry = Arc::new(FunctionRegistry::new());
    let plugin = Arc::new(TestPlugin::default());
    let loaded = load_plugin(&registry, &*plugin).unwrap();
    (registry, plugin, loaded)
}
