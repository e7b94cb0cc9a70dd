// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Immutable shared video frames.
//!
//! A [`Frame`] is the handle that flows between nodes of the host graph. It is
//! cheap to clone (one `Arc` increment) and can never be mutated once built.
//! Plane storage is `Bytes`, so other representations can borrow plane data
//! without copying. Frames are produced by filling a [`FrameBuilder`] and
//! calling [`FrameBuilder::freeze`].

use crate::error::{BridgeError, Result};
use crate::format::VideoFormat;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;

/// Default row alignment for newly allocated planes.
pub const DEFAULT_FRAME_ALIGNMENT: usize = 32;

#[derive(Debug)]
struct PlaneData {
    data: Bytes,
    stride: usize,
}

#[derive(Debug)]
struct FrameInner {
    format: VideoFormat,
    width: u32,
    height: u32,
    planes: Vec<PlaneData>,
}

/// Immutable, reference-counted video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    /// Assembles a frame from existing plane buffers without copying.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Runtime` if the plane count does not match the format,
    /// a stride is shorter than the visible row, or a buffer is too small for its plane.
    pub fn from_planes(
        format: VideoFormat,
        width: u32,
        height: u32,
        planes: Vec<(Bytes, usize)>,
    ) -> Result<Self> {
        if planes.len() != usize::from(format.num_planes) {
            return Err(BridgeError::Runtime(format!(
                "{} expects {} planes, got {}",
                format,
                format.num_planes,
                planes.len()
            )));
        }

        let mut checked = Vec::with_capacity(planes.len());
        for (idx, (data, stride)) in planes.into_iter().enumerate() {
            let row_bytes = format.row_bytes(idx, width);
            let rows = format.plane_height(idx, height) as usize;
            if stride < row_bytes {
                return Err(BridgeError::Runtime(format!(
                    "plane {idx} stride {stride} is shorter than its row ({row_bytes} bytes)"
                )));
            }
            let needed = if rows == 0 { 0 } else { stride * (rows - 1) + row_bytes };
            if data.len() < needed {
                return Err(BridgeError::Runtime(format!(
                    "plane {idx} holds {} bytes, needs {needed}",
                    data.len()
                )));
            }
            checked.push(PlaneData { data, stride });
        }

        Ok(Self { inner: Arc::new(FrameInner { format, width, height, planes: checked }) })
    }

    pub fn format(&self) -> &VideoFormat {
        &self.inner.format
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn num_planes(&self) -> usize {
        self.inner.planes.len()
    }

    /// Raw plane storage, including stride padding.
    ///
    /// # Panics
    ///
    /// Panics if `plane` is not a valid plane index.
    pub fn plane(&self, plane: usize) -> &[u8] {
        &self.inner.planes[plane].data
    }

    /// A zero-copy handle to the plane storage.
    pub fn plane_bytes(&self, plane: usize) -> Bytes {
        self.inner.planes[plane].data.clone()
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.inner.planes[plane].stride
    }

    pub fn plane_width(&self, plane: usize) -> u32 {
        self.inner.format.plane_width(plane, self.inner.width)
    }

    pub fn plane_height(&self, plane: usize) -> u32 {
        self.inner.format.plane_height(plane, self.inner.height)
    }

    pub fn row_bytes(&self, plane: usize) -> usize {
        self.inner.format.row_bytes(plane, self.inner.width)
    }

    /// The visible bytes of row `y` of `plane`.
    pub fn row(&self, plane: usize, y: usize) -> &[u8] {
        let start = y * self.stride(plane);
        &self.plane(plane)[start..start + self.row_bytes(plane)]
    }

    /// Copies the visible pixels of `plane` into a tightly packed buffer.
    pub fn visible_bytes(&self, plane: usize) -> Vec<u8> {
        let rows = self.plane_height(plane) as usize;
        let mut out = Vec::with_capacity(rows * self.row_bytes(plane));
        for y in 0..rows {
            out.extend_from_slice(self.row(plane, y));
        }
        out
    }

    /// Returns true if both handles refer to the same frame.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Number of live handles to this frame.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

const fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// A frame under construction. Planes are zero-initialized.
#[derive(Debug)]
pub struct FrameBuilder {
    format: VideoFormat,
    width: u32,
    height: u32,
    planes: Vec<(BytesMut, usize)>,
}

impl FrameBuilder {
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        Self::with_alignment(format, width, height, DEFAULT_FRAME_ALIGNMENT)
    }

    pub fn with_alignment(format: VideoFormat, width: u32, height: u32, alignment: usize) -> Self {
        let planes = (0..usize::from(format.num_planes))
            .map(|idx| {
                let stride = align_up(format.row_bytes(idx, width), alignment);
                let rows = format.plane_height(idx, height) as usize;
                (BytesMut::zeroed(stride * rows), stride)
            })
            .collect();
        Self { format, width, height, planes }
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.planes[plane].1
    }

    pub fn row_bytes(&self, plane: usize) -> usize {
        self.format.row_bytes(plane, self.width)
    }

    pub fn plane_height(&self, plane: usize) -> u32 {
        self.format.plane_height(plane, self.height)
    }

    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        &mut self.planes[plane].0
    }

    pub fn row_mut(&mut self, plane: usize, y: usize) -> &mut [u8] {
        let stride = self.stride(plane);
        let row_bytes = self.row_bytes(plane);
        let start = y * stride;
        &mut self.planes[plane].0[start..start + row_bytes]
    }

    /// Finishes construction. No pixel data is copied.
    pub fn freeze(self) -> Frame {
        let planes = self
            .planes
            .into_iter()
            .map(|(data, stride)| PlaneData { data: data.freeze(), stride })
            .collect();
        Frame {
            inner: Arc::new(FrameInner {
                format: self.format,
                width: self.width,
                height: self.height,
                planes,
            }),
        }
    }
}
