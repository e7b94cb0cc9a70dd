// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Moving frames between the host and legacy representations.
//!
//! Host frames are handed to legacy code as read-only views of their plane
//! storage. While a view is alive, the host frame it borrows from is retained
//! in an [`OwnedFrames`] table keyed by the view's [`FrameId`]; the view's
//! releaser removes the entry when the last legacy handle goes away.
//!
//! Legacy frames coming back are copied into fresh host frames, unless they are
//! one of those untouched views, in which case the retained host frame is
//! returned as is.

use framebridge_core::{
    BridgeError, Frame, FrameBuilder, PresetFormat, Result, VideoFormat, VideoInfo,
};
use framebridge_legacy_sdk::{
    bit_blt, Colorspace, FrameId, FrameReleaser, LegacyFrame, PlaneLayout, VideoFrame, VideoFrameBuffer,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{trace, warn};

/// Host frames kept alive on behalf of legacy views.
#[derive(Debug, Default)]
pub struct OwnedFrames {
    frames: Mutex<HashMap<FrameId, Frame>>,
}

impl OwnedFrames {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<FrameId, Frame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn retain(&self, id: FrameId, frame: Frame) {
        if self.lock().insert(id, frame).is_some() {
            warn!(frame = %id, "Frame retained twice");
        }
    }

    pub fn get(&self, id: FrameId) -> Option<Frame> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every retained frame and returns how many there were.
    pub fn clear(&self) -> usize {
        let drained: Vec<Frame> = self.lock().drain().map(|(_, frame)| frame).collect();
        drained.len()
    }
}

impl FrameReleaser for OwnedFrames {
    fn release(&self, id: FrameId) {
        if self.lock().remove(&id).is_none() {
            warn!(frame = %id, "Released a frame that was not retained");
        } else {
            trace!(frame = %id, "Released retained frame");
        }
    }
}

/// The legacy colorspace with the same layout as `format`.
pub fn colorspace_for(format: &VideoFormat) -> Option<Colorspace> {
    match format.preset()? {
        PresetFormat::Yuv420P8 => Some(Colorspace::Yv12),
        PresetFormat::Yuv422P8 => Some(Colorspace::Yv16),
        PresetFormat::Yuv444P8 => Some(Colorspace::Yv24),
        PresetFormat::Yuv410P8 => Some(Colorspace::Yuv9),
        PresetFormat::Yuv411P8 => Some(Colorspace::Yv411),
        PresetFormat::Gray8 => Some(Colorspace::Y8),
        PresetFormat::CompatYuy2 => Some(Colorspace::Yuy2),
        PresetFormat::CompatBgr32 => Some(Colorspace::Bgr32),
        PresetFormat::Gray16
        | PresetFormat::Rgb24
        | PresetFormat::RgbS
        | PresetFormat::Yuv420P10
        | PresetFormat::Yuv420P16 => None,
    }
}

/// The host format with the same layout as `colorspace`.
pub const fn preset_for(colorspace: Colorspace) -> PresetFormat {
    match colorspace {
        Colorspace::Yv12 => PresetFormat::Yuv420P8,
        Colorspace::Yv16 => PresetFormat::Yuv422P8,
        Colorspace::Yv24 => PresetFormat::Yuv444P8,
        Colorspace::Yuv9 => PresetFormat::Yuv410P8,
        Colorspace::Yv411 => PresetFormat::Yuv411P8,
        Colorspace::Y8 => PresetFormat::Gray8,
        Colorspace::Yuy2 => PresetFormat::CompatYuy2,
        Colorspace::Bgr32 => PresetFormat::CompatBgr32,
    }
}

/// Wraps `frame` for legacy code without copying and retains it in `owned`
/// until the returned frame and every clone of it are dropped.
///
/// # Errors
///
/// Returns `BridgeError::UnsupportedFormat` if the frame has no legacy equivalent.
pub fn to_legacy(owned: &Arc<OwnedFrames>, frame: &Frame) -> Result<LegacyFrame> {
    if colorspace_for(frame.format()).is_none() {
        return Err(BridgeError::UnsupportedFormat(frame.format().name.to_string()));
    }

    let num_planes = frame.num_planes();
    let mut segments = Vec::with_capacity(num_planes);
    let mut planes = Vec::with_capacity(num_planes);
    for p in 0..num_planes {
        segments.push(frame.plane_bytes(p));
        planes.push(PlaneLayout {
            segment: p,
            offset: 0,
            pitch: frame.stride(p),
            row_size: frame.row_bytes(p),
            height: frame.plane_height(p) as usize,
        });
    }

    let releaser: Weak<dyn FrameReleaser> = Arc::downgrade(owned) as Weak<dyn FrameReleaser>;
    let view = VideoFrame::new(Arc::new(VideoFrameBuffer::shared(segments)), planes)?.with_releaser(releaser);
    owned.retain(view.id(), frame.clone());
    Ok(LegacyFrame::new(view))
}

/// Converts a frame returned by legacy code into a host frame described by `vi`.
///
/// # Errors
///
/// Returns `BridgeError::Runtime` if the frame's plane geometry does not match `vi`.
pub fn to_modern(owned: &OwnedFrames, frame: &LegacyFrame, vi: &VideoInfo, alignment: usize) -> Result<Frame> {
    if let Some(retained) = owned.get(frame.id()) {
        if retained.format() == &vi.format && retained.width() == vi.width && retained.height() == vi.height {
            trace!(frame = %frame.id(), "Passing host frame through unchanged");
            return Ok(retained);
        }
    }

    let format = vi.format;
    let num_planes = usize::from(format.num_planes);
    if frame.num_planes() != num_planes {
        return Err(BridgeError::Runtime(format!(
            "legacy frame has {} planes, {} expects {num_planes}",
            frame.num_planes(),
            format
        )));
    }

    let mut builder = FrameBuilder::with_alignment(format, vi.width, vi.height, alignment);
    for p in 0..num_planes {
        let row_size = builder.row_bytes(p);
        let height = builder.plane_height(p) as usize;
        if frame.row_size(p) != row_size || frame.height(p) != height {
            return Err(BridgeError::Runtime(format!(
                "legacy frame plane {p} is {}x{} bytes, expected {row_size}x{height}",
                frame.row_size(p),
                frame.height(p)
            )));
        }
        let stride = builder.stride(p);
        bit_blt(builder.plane_mut(p), stride, frame.read(p), frame.pitch(p), row_size, height)?;
    }
    Ok(builder.freeze())
}
