//! Synthetic test video and per-session track routing

pub mod h264;
pub mod pattern;
pub mod routing;

pub use h264::H264Encoder;
pub use pattern::{FrameClock, PatternSource, RealtimeClock, VideoFrame};
pub use routing::{EncoderFactory, FrameEncoder, MediaTasks};
