// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Reference-counted, mutable video frames.
//!
//! A [`LegacyFrame`] is a shared pointer to a [`VideoFrame`], which in turn
//! describes plane geometry over a [`VideoFrameBuffer`]. Several frames may
//! share one buffer (subframes do), and several `LegacyFrame` clones may share
//! one `VideoFrame`. A frame is writable only when neither is shared and the
//! buffer owns its bytes.
//!
//! Buffers come in two flavours:
//! - owned storage allocated for the filter, writable once unshared
//! - shared views of another runtime's plane data, never writable
//!
//! Each `VideoFrame` carries a process-unique [`FrameId`]. A frame may register a
//! [`FrameReleaser`], which is told the id exactly once when the last handle to
//! the frame goes away.

use bytes::Bytes;
use framebridge_core::frame_pool::PooledBuffer;
use framebridge_core::{BridgeError, Result};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`VideoFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notified when a frame it was registered on is destroyed.
pub trait FrameReleaser: Send + Sync {
    fn release(&self, id: FrameId);
}

enum Segment {
    Owned(PooledBuffer<u8>),
    Shared(Bytes),
}

impl Segment {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(buf) => buf,
            Self::Shared(bytes) => bytes,
        }
    }
}

/// Backing storage of one or more frames.
pub struct VideoFrameBuffer {
    segments: Vec<Segment>,
}

impl VideoFrameBuffer {
    /// A single writable segment.
    pub fn owned(data: PooledBuffer<u8>) -> Self {
        Self { segments: vec![Segment::Owned(data)] }
    }

    /// One read-only segment per entry, without copying.
    pub fn shared(segments: Vec<Bytes>) -> Self {
        Self { segments: segments.into_iter().map(Segment::Shared).collect() }
    }

    pub fn is_shared(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Shared(_)))
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, idx: usize) -> &[u8] {
        self.segments.get(idx).map_or(&[], Segment::as_slice)
    }

    fn segment_mut(&mut self, idx: usize) -> Option<&mut [u8]> {
        match self.segments.get_mut(idx)? {
            Segment::Owned(buf) => Some(buf),
            Segment::Shared(_) => None,
        }
    }
}

impl fmt::Debug for VideoFrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<usize> = self.segments.iter().map(|s| s.as_slice().len()).collect();
        f.debug_struct("VideoFrameBuffer")
            .field("segments", &sizes)
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// Where a plane lives inside a [`VideoFrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub segment: usize,
    pub offset: usize,
    pub pitch: usize,
    pub row_size: usize,
    pub height: usize,
}

impl PlaneLayout {
    /// Bytes from the first byte of the first row to the last byte of the last row.
    pub const fn span(&self) -> usize {
        if self.height == 0 {
            0
        } else {
            self.pitch * (self.height - 1) + self.row_size
        }
    }
}

/// Plane geometry over a shared buffer.
pub struct VideoFrame {
    id: FrameId,
    buffer: Arc<VideoFrameBuffer>,
    planes: Vec<PlaneLayout>,
    read_only: bool,
    releaser: Option<Weak<dyn FrameReleaser>>,
}

impl VideoFrame {
    /// Describes `planes` over `buffer`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Runtime` if a plane reaches outside its segment or its
    /// pitch is shorter than its rows.
    pub fn new(buffer: Arc<VideoFrameBuffer>, planes: Vec<PlaneLayout>) -> Result<Self> {
        for (idx, plane) in planes.iter().enumerate() {
            if plane.height > 1 && plane.pitch < plane.row_size {
                return Err(BridgeError::Runtime(format!(
                    "plane {idx} pitch {} is shorter than its row size {}",
                    plane.pitch, plane.row_size
                )));
            }
            if plane.segment >= buffer.num_segments() {
                return Err(BridgeError::Runtime(format!("plane {idx} refers to a missing segment")));
            }
            let available = buffer.segment(plane.segment).len();
            if plane.offset + plane.span() > available {
                return Err(BridgeError::Runtime(format!(
                    "plane {idx} needs {} bytes at offset {}, buffer holds {available}",
                    plane.span(),
                    plane.offset
                )));
            }
        }
        Ok(Self { id: FrameId::next(), buffer, planes, read_only: false, releaser: None })
    }

    /// Registers the releaser that learns when this frame is destroyed.
    #[must_use]
    pub fn with_releaser(mut self, releaser: Weak<dyn FrameReleaser>) -> Self {
        self.releaser = Some(releaser);
        self
    }

    #[must_use]
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub const fn id(&self) -> FrameId {
        self.id
    }

    pub fn buffer(&self) -> &Arc<VideoFrameBuffer> {
        &self.buffer
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn layout(&self, plane: usize) -> Option<PlaneLayout> {
        self.planes.get(plane).copied()
    }

    pub fn pitch(&self, plane: usize) -> usize {
        self.planes.get(plane).map_or(0, |p| p.pitch)
    }

    pub fn row_size(&self, plane: usize) -> usize {
        self.planes.get(plane).map_or(0, |p| p.row_size)
    }

    pub fn height(&self, plane: usize) -> usize {
        self.planes.get(plane).map_or(0, |p| p.height)
    }

    /// Plane bytes from the first row to the end of the last row. Empty for a missing plane.
    pub fn read(&self, plane: usize) -> &[u8] {
        let Some(layout) = self.planes.get(plane) else { return &[] };
        &self.buffer.segment(layout.segment)[layout.offset..layout.offset + layout.span()]
    }

    /// The visible bytes of row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `y` is not a row of `plane`.
    pub fn row(&self, plane: usize, y: usize) -> &[u8] {
        let pitch = self.pitch(plane);
        let row_size = self.row_size(plane);
        &self.read(plane)[y * pitch..y * pitch + row_size]
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("id", &self.id)
            .field("planes", &self.planes)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl Drop for VideoFrame {
    fn drop(&mut self) {
        if let Some(releaser) = self.releaser.take().and_then(|weak| weak.upgrade()) {
            tracing::trace!(frame = %self.id, "Releasing frame");
            releaser.release(self.id);
        }
    }
}

/// Shared handle to a [`VideoFrame`].
#[derive(Debug, Clone)]
pub struct LegacyFrame(Arc<VideoFrame>);

impl LegacyFrame {
    pub fn new(frame: VideoFrame) -> Self {
        Self(Arc::new(frame))
    }

    /// True when writing cannot be observed through any other handle.
    pub fn is_writable(&self) -> bool {
        !self.0.read_only
            && Arc::strong_count(&self.0) == 1
            && Arc::strong_count(&self.0.buffer) == 1
            && !self.0.buffer.is_shared()
    }

    /// Mutable plane bytes, or `None` if the frame is not writable.
    pub fn write_plane(&mut self, plane: usize) -> Option<&mut [u8]> {
        if !self.is_writable() {
            return None;
        }
        let frame = Arc::get_mut(&mut self.0)?;
        let layout = *frame.planes.get(plane)?;
        let segment = Arc::get_mut(&mut frame.buffer)?.segment_mut(layout.segment)?;
        Some(&mut segment[layout.offset..layout.offset + layout.span()])
    }

    /// Mutable visible bytes of row `y`, or `None` if the frame is not writable.
    pub fn row_mut(&mut self, plane: usize, y: usize) -> Option<&mut [u8]> {
        let pitch = self.0.pitch(plane);
        let row_size = self.0.row_size(plane);
        if y >= self.0.height(plane) {
            return None;
        }
        self.write_plane(plane).map(|data| &mut data[y * pitch..y * pitch + row_size])
    }

    /// A read-only view of the first plane at a new origin and geometry. Nothing is copied.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Runtime` if the view reaches outside the buffer.
    pub fn subframe(
        &self,
        rel_offset: usize,
        new_pitch: usize,
        new_row_size: usize,
        new_height: usize,
    ) -> Result<Self> {
        let base = self.0.layout(0).ok_or_else(|| BridgeError::Runtime("frame has no planes".into()))?;
        let plane = PlaneLayout {
            segment: base.segment,
            offset: base.offset + rel_offset,
            pitch: new_pitch,
            row_size: new_row_size,
            height: new_height,
        };
        let frame = VideoFrame::new(Arc::clone(&self.0.buffer), vec![plane])?;
        Ok(Self::new(frame.into_read_only()))
    }

    /// A read-only view of all three planes. Chroma row size and height scale with
    /// the luma geometry in the same ratio as in the source frame.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Runtime` if the source is not planar or the view reaches
    /// outside the buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn subframe_planar(
        &self,
        rel_offset: usize,
        new_pitch: usize,
        new_row_size: usize,
        new_height: usize,
        rel_offset_u: usize,
        rel_offset_v: usize,
        new_pitch_uv: usize,
    ) -> Result<Self> {
        if self.0.num_planes() != 3 {
            return Err(BridgeError::Runtime("planar subframe of a non-planar frame".into()));
        }
        let (y, u, v) = match (self.0.layout(0), self.0.layout(1), self.0.layout(2)) {
            (Some(y), Some(u), Some(v)) => (y, u, v),
            _ => return Err(BridgeError::Runtime("frame is missing a plane".into())),
        };
        let scale = |value: usize, num: usize, den: usize| if den == 0 { 0 } else { value * num / den };
        let row_size_uv = scale(new_row_size, u.row_size, y.row_size);
        let height_uv = scale(new_height, u.height, y.height);

        let planes = vec![
            PlaneLayout {
                segment: y.segment,
                offset: y.offset + rel_offset,
                pitch: new_pitch,
                row_size: new_row_size,
                height: new_height,
            },
            PlaneLayout {
                segment: u.segment,
                offset: u.offset + rel_offset_u,
                pitch: new_pitch_uv,
                row_size: row_size_uv,
                height: height_uv,
            },
            PlaneLayout {
                segment: v.segment,
                offset: v.offset + rel_offset_v,
                pitch: new_pitch_uv,
                row_size: row_size_uv,
                height: height_uv,
            },
        ];
        let frame = VideoFrame::new(Arc::clone(&self.0.buffer), planes)?;
        Ok(Self::new(frame.into_read_only()))
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for LegacyFrame {
    type Target = VideoFrame;

    fn deref(&self) -> &VideoFrame {
        &self.0
    }
}

/// Copies `height` rows of `row_size` bytes between buffers with independent pitches.
///
/// Only the declared `row_size` bytes of each row are read or written.
///
/// # Errors
///
/// Returns `BridgeError::Runtime` if either buffer is too small for the copy or a
/// pitch is shorter than `row_size`.
pub fn bit_blt(
    dst: &mut [u8],
    dst_pitch: usize,
    src: &[u8],
    src_pitch: usize,
    row_size: usize,
    height: usize,
) -> Result<()> {
    if height == 0 || row_size == 0 {
        return Ok(());
    }
    if height > 1 && (dst_pitch < row_size || src_pitch < row_size) {
        return Err(BridgeError::Runtime(format!(
            "bit_blt pitch ({dst_pitch}/{src_pitch}) shorter than row size {row_size}"
        )));
    }
    let dst_span = dst_pitch * (height - 1) + row_size;
    let src_span = src_pitch * (height - 1) + row_size;
    if dst.len() < dst_span || src.len() < src_span {
        return Err(BridgeError::Runtime(format!(
            "bit_blt of {height}x{row_size} needs {dst_span}/{src_span} bytes, got {}/{}",
            dst.len(),
            src.len()
        )));
    }

    if dst_pitch == row_size && src_pitch == row_size {
        dst[..dst_span].copy_from_slice(&src[..src_span]);
        return Ok(());
    }
    for y in 0..height {
        let d = y * dst_pitch;
        let s = y * src_pitch;
        dst[d..d + row_size].copy_from_slice(&src[s..s + row_size]);
    }
    Ok(())
}
