// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Deterministic synthetic source.

use crate::error::Result;
use crate::format::VideoInfo;
use crate::frame::{Frame, FrameBuilder};
use crate::node::{FrameContext, FrameSource};
use async_trait::async_trait;

/// A native source whose pixels encode the frame index.
///
/// Every byte of plane `p` of frame `n` equals `(n + 64 * p) mod 256`, which
/// makes frames easy to tell apart after they pass through other nodes.
#[derive(Debug, Clone)]
pub struct PatternSource {
    video_info: VideoInfo,
}

impl PatternSource {
    pub const fn new(video_info: VideoInfo) -> Self {
        Self { video_info }
    }

    /// The byte value every sample of `plane` in frame `n` carries.
    pub fn expected_byte(n: i32, plane: usize) -> u8 {
        let plane = i64::try_from(plane).unwrap_or(0);
        // rem_euclid keeps the result in 0..256, so the conversion cannot fail.
        u8::try_from((i64::from(n) + 64 * plane).rem_euclid(256)).unwrap_or(0)
    }
}

#[async_trait]
impl FrameSource for PatternSource {
    fn video_info(&self) -> &VideoInfo {
        &self.video_info
    }

    async fn get_frame(&self, n: i32, _ctx: &FrameContext) -> Result<Frame> {
        let vi = &self.video_info;
        let mut builder = FrameBuilder::new(vi.format, vi.width, vi.height);
        for plane in 0..usize::from(vi.format.num_planes) {
            builder.plane_mut(plane).fill(Self::expected_byte(n, plane));
        }
        Ok(builder.freeze())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::format::PresetFormat;
    use crate::node::NodeRef;

    #[tokio::test]
    async fn planes_encode_frame_index() {
        let vi = VideoInfo::new(PresetFormat::Yuv420P8, 64, 32, (30000, 1001), 300);
        let node = NodeRef::new("pattern", PatternSource::new(vi), 8);
        let frame = node.get_frame(250).await.unwrap();
        assert_eq!(frame.row(0, 0)[0], 250);
        assert_eq!(frame.row(1, 15)[31], 58);
        assert_eq!(frame.row(2, 3)[5], 122);
    }
}
