//! H.264 encoding of pattern frames with OpenH264

use crate::error::{Error, Result};
use crate::media::pattern::VideoFrame;
use crate::media::routing::FrameEncoder;
use bytes::Bytes;
use openh264::encoder::Encoder;
use openh264::formats::{RgbSliceU8, YUVBuffer};
use webrtc::api::media_engine::MIME_TYPE_H264;

/// Constrained baseline, single NAL unit or non-interleaved packetization
pub const H264_FMTP: &str =
    "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

/// An IDR frame every two seconds at 30 fps, so a viewer that binds late
/// still gets a picture
pub const KEYFRAME_INTERVAL: u64 = 60;

pub struct H264Encoder {
    inner: Encoder,
    frames: u64,
}

impl H264Encoder {
    pub fn new() -> Result<Self> {
        let inner = Encoder::new()
            .map_err(|e| Error::Encoding(format!("failed to start OpenH264: {e}")))?;
        Ok(Self { inner, frames: 0 })
    }
}

impl FrameEncoder for H264Encoder {
    fn mime_type(&self) -> &str {
        MIME_TYPE_H264
    }

    fn sdp_fmtp_line(&self) -> &str {
        H264_FMTP
    }

    /// Returns Annex B NAL units for one RGB24 frame
    fn encode(&mut self, frame: &VideoFrame) -> Result<Bytes> {
        if self.frames > 0 && self.frames % KEYFRAME_INTERVAL == 0 {
            self.inner.force_intra_frame();
        }
        self.frames += 1;

        let rgb = RgbSliceU8::new(&frame.data, (frame.width, frame.height));
        let yuv = YUVBuffer::from_rgb_source(rgb);
        let bitstream = self
            .inner
            .encode(&yuv)
            .map_err(|e| Error::Encoding(e.to_string()))?;
        Ok(Bytes::from(bitstream.to_vec()))
    }
}
