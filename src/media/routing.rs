//! Track wiring for a peer session
//!
//! - Pattern: one outbound video track fed by [`PatternSource`], inbound media discarded
//! - Echo: one outbound track per kind, inbound RTP written back unchanged

use crate::error::{Error, Result};
use crate::media::h264::H264Encoder;
use crate::media::pattern::{PatternSource, VideoFrame, FRAME_DURATION, VIDEO_CLOCK_RATE};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

/// Compresses raw frames for the outbound pattern track
pub trait FrameEncoder: Send {
    fn mime_type(&self) -> &str;

    /// `a=fmtp` parameters the track is negotiated with
    fn sdp_fmtp_line(&self) -> &str {
        ""
    }

    /// `false` when the encoder can never produce output
    fn is_available(&self) -> bool {
        true
    }

    fn encode(&mut self, frame: &VideoFrame) -> Result<Bytes>;
}

pub type EncoderFactory = Arc<dyn Fn() -> Box<dyn FrameEncoder> + Send + Sync>;

/// Stand-in when no codec could be started. The track is still negotiated
/// but nothing is rendered for it.
#[derive(Debug, Default)]
pub struct UnavailableEncoder;

impl FrameEncoder for UnavailableEncoder {
    fn mime_type(&self) -> &str {
        MIME_TYPE_H264
    }

    fn is_available(&self) -> bool {
        false
    }

    fn encode(&mut self, _frame: &VideoFrame) -> Result<Bytes> {
        Err(Error::Encoding("no H.264 encoder available".into()))
    }
}

/// OpenH264 per session, or [`UnavailableEncoder`] if it fails to start
pub fn default_encoder_factory() -> EncoderFactory {
    Arc::new(|| match H264Encoder::new() {
        Ok(encoder) => Box::new(encoder) as Box<dyn FrameEncoder>,
        Err(e) => {
            warn!("{e}");
            Box::new(UnavailableEncoder)
        }
    })
}

/// Background media tasks owned by one session
#[derive(Default)]
pub struct MediaTasks {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MediaTasks {
    pub fn push(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn abort_all(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

/// RTCP has to be drained for interceptors (NACK, reports) to work
fn drain_rtcp(sender: Arc<RTCRtpSender>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        while sender.read(&mut buf).await.is_ok() {}
    })
}

/// Adds the color bars track and starts pumping frames into it
pub async fn attach_pattern(
    pc: &RTCPeerConnection,
    session_id: &str,
    mut encoder: Box<dyn FrameEncoder>,
    tasks: &MediaTasks,
) -> Result<Arc<TrackLocalStaticSample>> {
    let mime_type = encoder.mime_type().to_owned();
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: mime_type.clone(),
            clock_rate: VIDEO_CLOCK_RATE,
            sdp_fmtp_line: encoder.sdp_fmtp_line().to_owned(),
            ..Default::default()
        },
        "colorbars".to_owned(),
        format!("colorbars-{session_id}"),
    ));

    let sender = pc
        .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await?;
    tasks.push(drain_rtcp(sender));

    if !encoder.is_available() {
        warn!(session = session_id, "no video encoder, color bars track stays silent");
        return Ok(track);
    }

    let pump_track = Arc::clone(&track);
    let sid = session_id.to_owned();
    tasks.push(tokio::spawn(async move {
        let mut source = PatternSource::new();
        let mut warned = false;
        loop {
            let frame = source.next_frame().await;
            let data = match encoder.encode(&frame) {
                Ok(data) => data,
                Err(e) => {
                    if !warned {
                        warn!(session = %sid, "dropping pattern frame: {e}");
                        warned = true;
                    }
                    continue;
                }
            };
            // the encoder may skip a frame under rate control
            if data.is_empty() {
                continue;
            }
            let sample = Sample {
                data,
                duration: FRAME_DURATION,
                ..Default::default()
            };
            if let Err(e) = pump_track.write_sample(&sample).await {
                debug!(session = %sid, "pattern track closed: {e}");
                break;
            }
        }
    }));

    info!(session = session_id, mime = %mime_type, "attached color bars track");
    Ok(track)
}

/// Outbound tracks that mirror whatever the peer sends
pub struct EchoTracks {
    video: Arc<TrackLocalStaticRTP>,
    audio: Arc<TrackLocalStaticRTP>,
}

impl EchoTracks {
    /// Must run before the remote description is applied so the answer
    /// carries a send direction for both kinds
    pub async fn attach(pc: &RTCPeerConnection, session_id: &str, tasks: &MediaTasks) -> Result<Self> {
        let stream_id = format!("echo-{session_id}");
        let video = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: VIDEO_CLOCK_RATE,
                ..Default::default()
            },
            "echo-video".to_owned(),
            stream_id.clone(),
        ));
        let audio = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            "echo-audio".to_owned(),
            stream_id,
        ));

        for track in [&video, &audio] {
            let sender = pc
                .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            tasks.push(drain_rtcp(sender));
        }

        Ok(Self { video, audio })
    }

    /// Writes every packet of `remote` back on the outbound track of the same kind
    pub fn forward(&self, remote: Arc<TrackRemote>, session_id: &str) -> Option<JoinHandle<()>> {
        let local = match remote.kind() {
            RTPCodecType::Video => Arc::clone(&self.video),
            RTPCodecType::Audio => Arc::clone(&self.audio),
            _ => return None,
        };
        let sid = session_id.to_owned();
        Some(tokio::spawn(async move {
            let mut forwarded = 0u64;
            while let Ok((packet, _)) = remote.read_rtp().await {
                if let Err(e) = local.write_rtp(&packet).await {
                    debug!(session = %sid, "echo write stopped: {e}");
                    break;
                }
                forwarded += 1;
            }
            debug!(session = %sid, forwarded, "echo forwarding ended");
        }))
    }
}

/// Reads and discards an inbound track until it ends
pub fn blackhole(remote: Arc<TrackRemote>, session_id: &str) -> JoinHandle<()> {
    let sid = session_id.to_owned();
    tokio::spawn(async move {
        let mut discarded = 0u64;
        while remote.read_rtp().await.is_ok() {
            discarded += 1;
        }
        debug!(session = %sid, discarded, "inbound track ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::pattern::render_color_bars;
    use crate::media::pattern::{HEIGHT, VIDEO_TIME_BASE, WIDTH};
    use crate::peer::connection::new_peer;
    use std::time::Duration;

    fn frame() -> VideoFrame {
        VideoFrame {
            width: WIDTH,
            height: HEIGHT,
            data: render_color_bars(0),
            pts: 0,
            time_base: VIDEO_TIME_BASE,
        }
    }

    async fn peer() -> Arc<RTCPeerConnection> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        new_peer("routing-test", &[], tx).await.unwrap()
    }

    #[test]
    fn unavailable_encoder_reports_error() {
        let mut encoder = UnavailableEncoder;
        assert!(!encoder.is_available());
        assert!(matches!(encoder.encode(&frame()), Err(Error::Encoding(_))));
    }

    #[test]
    fn default_factory_produces_h264() {
        let mut encoder = (default_encoder_factory())();
        assert!(encoder.is_available());
        assert_eq!(encoder.mime_type(), MIME_TYPE_H264);
        assert!(encoder.sdp_fmtp_line().contains("packetization-mode=1"));
        assert!(!encoder.encode(&frame()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn pattern_pump_runs_with_encoder() {
        let pc = peer().await;
        let tasks = MediaTasks::default();
        attach_pattern(&pc, "s1", (default_encoder_factory())(), &tasks)
            .await
            .unwrap();
        // rtcp drain + frame pump
        assert_eq!(tasks.len(), 2);
        tasks.abort_all();
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn no_pump_without_encoder() {
        let pc = peer().await;
        let tasks = MediaTasks::default();
        let track = attach_pattern(&pc, "s1", Box::new(UnavailableEncoder), &tasks)
            .await
            .unwrap();
        assert_eq!(track.id(), "colorbars");
        assert_eq!(tasks.len(), 1);
        tasks.abort_all();
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn abort_all_stops_tasks() {
        let tasks = MediaTasks::default();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tasks.push(tokio::spawn(async move {
            let _tx = tx;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));
        assert_eq!(tasks.len(), 1);

        tasks.abort_all();
        assert!(tasks.is_empty());
        // the sender is dropped once the task is cancelled
        assert!(rx.await.is_err());
    }
}
