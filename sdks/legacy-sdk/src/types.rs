// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Stream description types of the legacy API.

use std::fmt;

/// Highest interface version a filter may request.
pub const MAX_INTERFACE_VERSION: i32 = 6;

/// The older interface version some plugins still register against.
pub const LEGACY_INTERFACE_VERSION: i32 = 2;

pub const PLANAR_Y: usize = 0;
pub const PLANAR_U: usize = 1;
pub const PLANAR_V: usize = 2;

// CPU capability bits reported by `ScriptEnvironment::cpu_flags`.
pub const CPUF_FPU: u32 = 0x02;
pub const CPUF_MMX: u32 = 0x04;
pub const CPUF_INTEGER_SSE: u32 = 0x08;
pub const CPUF_SSE: u32 = 0x10;
pub const CPUF_SSE2: u32 = 0x20;
pub const CPUF_SSE3: u32 = 0x100;
pub const CPUF_SSSE3: u32 = 0x200;
pub const CPUF_SSE4_1: u32 = 0x400;
pub const CPUF_AVX: u32 = 0x800;
pub const CPUF_SSE4_2: u32 = 0x1000;
pub const CPUF_AVX2: u32 = 0x2000;

// Audio sample types. The bridge never produces audio; these only travel
// through the placeholder fields of `LegacyVideoInfo`.
pub const SAMPLE_INT8: i32 = 1;
pub const SAMPLE_INT16: i32 = 2;
pub const SAMPLE_INT24: i32 = 4;
pub const SAMPLE_INT32: i32 = 8;
pub const SAMPLE_FLOAT: i32 = 16;

/// Pixel layouts a legacy filter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorspace {
    /// Planar 4:2:0.
    Yv12,
    /// Planar 4:2:2.
    Yv16,
    /// Planar 4:4:4.
    Yv24,
    /// Planar 4:1:1.
    Yv411,
    /// Planar 4:1:0.
    Yuv9,
    /// Luma only.
    Y8,
    /// Packed 4:2:2, two bytes per pixel.
    Yuy2,
    /// Packed BGRA, four bytes per pixel, rows stored bottom-up.
    Bgr32,
}

impl Colorspace {
    pub const ALL: [Self; 8] =
        [Self::Yv12, Self::Yv16, Self::Yv24, Self::Yv411, Self::Yuv9, Self::Y8, Self::Yuy2, Self::Bgr32];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Yv12 => "YV12",
            Self::Yv16 => "YV16",
            Self::Yv24 => "YV24",
            Self::Yv411 => "YV411",
            Self::Yuv9 => "YUV9",
            Self::Y8 => "Y8",
            Self::Yuy2 => "YUY2",
            Self::Bgr32 => "BGR32",
        }
    }

    pub const fn is_planar(self) -> bool {
        !matches!(self, Self::Yuy2 | Self::Bgr32)
    }

    pub const fn is_rgb(self) -> bool {
        matches!(self, Self::Bgr32)
    }

    pub const fn is_yuv(self) -> bool {
        !self.is_rgb()
    }

    pub const fn num_planes(self) -> usize {
        match self {
            Self::Y8 | Self::Yuy2 | Self::Bgr32 => 1,
            _ => 3,
        }
    }

    /// Bytes per pixel of the luma (or only) plane.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Yuy2 => 2,
            Self::Bgr32 => 4,
            _ => 1,
        }
    }

    /// log2 of the horizontal chroma subsampling.
    pub const fn sub_sampling_w(self) -> u32 {
        match self {
            Self::Yv12 | Self::Yv16 => 1,
            Self::Yv411 | Self::Yuv9 => 2,
            _ => 0,
        }
    }

    /// log2 of the vertical chroma subsampling.
    pub const fn sub_sampling_h(self) -> u32 {
        match self {
            Self::Yv12 => 1,
            Self::Yuv9 => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field-order flags of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageType(u32);

impl ImageType {
    pub const BFF: Self = Self(1);
    pub const TFF: Self = Self(1 << 1);
    pub const FIELDBASED: Self = Self(1 << 2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Description of a legacy clip.
///
/// Only the video fields are meaningful to the bridge. The audio fields are
/// copied between filters untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyVideoInfo {
    pub width: i32,
    pub height: i32,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    pub num_frames: i32,
    pub pixel_type: Colorspace,
    pub image_type: ImageType,
    pub audio_samples_per_second: i32,
    pub sample_type: i32,
    pub num_audio_samples: i64,
    pub nchannels: i32,
}

impl LegacyVideoInfo {
    /// A video-only description.
    pub const fn new(
        width: i32,
        height: i32,
        pixel_type: Colorspace,
        fps: (u32, u32),
        num_frames: i32,
    ) -> Self {
        Self {
            width,
            height,
            fps_numerator: fps.0,
            fps_denominator: fps.1,
            num_frames,
            pixel_type,
            image_type: ImageType::BFF,
            audio_samples_per_second: 0,
            sample_type: SAMPLE_INT16,
            num_audio_samples: 0,
            nchannels: 0,
        }
    }

    pub const fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub const fn has_audio(&self) -> bool {
        self.audio_samples_per_second != 0
    }

    pub const fn num_planes(&self) -> usize {
        self.pixel_type.num_planes()
    }

    pub const fn is_bff(&self) -> bool {
        self.image_type.contains(ImageType::BFF)
    }

    pub const fn is_field_based(&self) -> bool {
        self.image_type.contains(ImageType::FIELDBASED)
    }

    /// Visible bytes per row of `plane`. Zero for planes the colorspace does not have.
    pub const fn row_size(&self, plane: usize) -> usize {
        if plane >= self.num_planes() || self.width <= 0 {
            return 0;
        }
        let width = self.width.unsigned_abs() as usize;
        let width = if plane == PLANAR_Y { width } else { width >> self.pixel_type.sub_sampling_w() };
        width * self.pixel_type.bytes_per_pixel()
    }

    /// Rows in `plane`. Zero for planes the colorspace does not have.
    pub const fn plane_height(&self, plane: usize) -> usize {
        if plane >= self.num_planes() || self.height <= 0 {
            return 0;
        }
        let height = self.height.unsigned_abs() as usize;
        if plane == PLANAR_Y {
            height
        } else {
            height >> self.pixel_type.sub_sampling_h()
        }
    }

    /// Bytes a tightly packed frame of this description occupies.
    pub const fn frame_size(&self) -> usize {
        let mut total = 0;
        let mut plane = 0;
        while plane < self.num_planes() {
            total += self.row_size(plane) * self.plane_height(plane);
            plane += 1;
        }
        total
    }

    /// Frame rate as a float, for display only.
    #[allow(clippy::cast_precision_loss)]
    pub fn fps(&self) -> f64 {
        if self.fps_denominator == 0 {
            return 0.0;
        }
        f64::from(self.fps_numerator) / f64::from(self.fps_denominator)
    }
}
