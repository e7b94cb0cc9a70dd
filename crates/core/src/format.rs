// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Pixel format descriptors and stream-level video information.
//!
//! - [`PresetFormat`]: integer-identified format tags known to the host
//! - [`VideoFormat`]: the plane layout a format implies
//! - [`VideoInfo`]: dimensions, format, frame rate and length of a node's output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Color family of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFamily {
    Gray,
    Rgb,
    Yuv,
    /// Packed layouts kept only for compatibility with legacy filters.
    Compat,
}

/// How samples are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    Integer,
    Float,
}

/// Format tags with a stable integer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetFormat {
    Gray8,
    Gray16,
    Rgb24,
    RgbS,
    Yuv420P8,
    Yuv422P8,
    Yuv444P8,
    Yuv410P8,
    Yuv411P8,
    Yuv420P10,
    Yuv420P16,
    CompatBgr32,
    CompatYuy2,
}

impl PresetFormat {
    pub const ALL: [Self; 13] = [
        Self::Gray8,
        Self::Gray16,
        Self::Rgb24,
        Self::RgbS,
        Self::Yuv420P8,
        Self::Yuv422P8,
        Self::Yuv444P8,
        Self::Yuv410P8,
        Self::Yuv411P8,
        Self::Yuv420P10,
        Self::Yuv420P16,
        Self::CompatBgr32,
        Self::CompatYuy2,
    ];

    /// The integer identity of this format.
    pub const fn id(self) -> i32 {
        match self {
            Self::Gray8 => 1_000_010,
            Self::Gray16 => 1_000_011,
            Self::Rgb24 => 2_000_010,
            Self::RgbS => 2_000_021,
            Self::Yuv420P8 => 3_000_010,
            Self::Yuv422P8 => 3_000_011,
            Self::Yuv444P8 => 3_000_012,
            Self::Yuv410P8 => 3_000_013,
            Self::Yuv411P8 => 3_000_014,
            Self::Yuv420P10 => 3_000_016,
            Self::Yuv420P16 => 3_000_018,
            Self::CompatBgr32 => 9_000_010,
            Self::CompatYuy2 => 9_000_011,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.id() == id)
    }

    /// Builds the full descriptor for this preset.
    pub const fn format(self) -> VideoFormat {
        let (name, color_family, sample_type, bits, bytes, ssw, ssh, planes) = match self {
            Self::Gray8 => ("Gray8", ColorFamily::Gray, SampleType::Integer, 8, 1, 0, 0, 1),
            Self::Gray16 => ("Gray16", ColorFamily::Gray, SampleType::Integer, 16, 2, 0, 0, 1),
            Self::Rgb24 => ("RGB24", ColorFamily::Rgb, SampleType::Integer, 8, 1, 0, 0, 3),
            Self::RgbS => ("RGBS", ColorFamily::Rgb, SampleType::Float, 32, 4, 0, 0, 3),
            Self::Yuv420P8 => ("YUV420P8", ColorFamily::Yuv, SampleType::Integer, 8, 1, 1, 1, 3),
            Self::Yuv422P8 => ("YUV422P8", ColorFamily::Yuv, SampleType::Integer, 8, 1, 1, 0, 3),
            Self::Yuv444P8 => ("YUV444P8", ColorFamily::Yuv, SampleType::Integer, 8, 1, 0, 0, 3),
            Self::Yuv410P8 => ("YUV410P8", ColorFamily::Yuv, SampleType::Integer, 8, 1, 2, 2, 3),
            Self::Yuv411P8 => ("YUV411P8", ColorFamily::Yuv, SampleType::Integer, 8, 1, 2, 0, 3),
            Self::Yuv420P10 => ("YUV420P10", ColorFamily::Yuv, SampleType::Integer, 10, 2, 1, 1, 3),
            Self::Yuv420P16 => ("YUV420P16", ColorFamily::Yuv, SampleType::Integer, 16, 2, 1, 1, 3),
            Self::CompatBgr32 => ("CompatBGR32", ColorFamily::Compat, SampleType::Integer, 32, 4, 0, 0, 1),
            Self::CompatYuy2 => ("CompatYUY2", ColorFamily::Compat, SampleType::Integer, 16, 2, 1, 0, 1),
        };
        VideoFormat {
            id: self.id(),
            name,
            color_family,
            sample_type,
            bits_per_sample: bits,
            bytes_per_sample: bytes,
            sub_sampling_w: ssw,
            sub_sampling_h: ssh,
            num_planes: planes,
        }
    }
}

impl fmt::Display for PresetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format().name)
    }
}

/// Describes the plane layout of a pixel format.
///
/// Subsampling is stored as log2 of the divisor, so 4:2:0 has `sub_sampling_w == 1`
/// and `sub_sampling_h == 1`. Packed compat formats have a single plane and carry
/// the per-pixel size in `bytes_per_sample`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub id: i32,
    pub name: &'static str,
    pub color_family: ColorFamily,
    pub sample_type: SampleType,
    pub bits_per_sample: u8,
    pub bytes_per_sample: u8,
    pub sub_sampling_w: u8,
    pub sub_sampling_h: u8,
    pub num_planes: u8,
}

impl VideoFormat {
    pub fn preset(&self) -> Option<PresetFormat> {
        PresetFormat::from_id(self.id)
    }

    const fn is_chroma_plane(&self, plane: usize) -> bool {
        plane > 0 && !matches!(self.color_family, ColorFamily::Rgb)
    }

    /// Width in pixels of `plane` for a frame `width` pixels wide.
    pub const fn plane_width(&self, plane: usize, width: u32) -> u32 {
        if self.is_chroma_plane(plane) {
            width >> self.sub_sampling_w
        } else {
            width
        }
    }

    /// Height in rows of `plane` for a frame `height` rows tall.
    pub const fn plane_height(&self, plane: usize, height: u32) -> u32 {
        if self.is_chroma_plane(plane) {
            height >> self.sub_sampling_h
        } else {
            height
        }
    }

    /// Bytes of visible data per row of `plane`.
    pub const fn row_bytes(&self, plane: usize, width: u32) -> usize {
        self.plane_width(plane, width) as usize * self.bytes_per_sample as usize
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Stream-level description of a node's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub fps_num: i64,
    pub fps_den: i64,
    pub num_frames: i32,
}

impl VideoInfo {
    pub const fn new(
        preset: PresetFormat,
        width: u32,
        height: u32,
        fps: (i64, i64),
        num_frames: i32,
    ) -> Self {
        Self { format: preset.format(), width, height, fps_num: fps.0, fps_den: fps.1, num_frames }
    }

    /// Returns true if `n` is a valid frame index for this stream.
    pub const fn contains(&self, n: i32) -> bool {
        n >= 0 && n < self.num_frames
    }

    /// Clamps `n` into the valid frame-index domain.
    pub fn clamp_frame(&self, n: i32) -> i32 {
        n.clamp(0, (self.num_frames - 1).max(0))
    }
}
