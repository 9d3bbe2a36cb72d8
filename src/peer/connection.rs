use crate::error::Result;
use crate::logger::dump_candidate;
use crate::peer::state::ConnectionSignal;
use crate::peer::types::IceServerConfig;
use crate::utils::add_ice_url_scheme;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Notifications forwarded from the connection to its session, in emission order
pub enum PeerEvent {
    Connection(ConnectionSignal),
    Track(Arc<TrackRemote>),
    /// Disconnect grace timer fired; carries the generation it was armed with
    GraceExpired(u64),
}

pub type EventSender = mpsc::UnboundedSender<PeerEvent>;

/// Creates a peer connection with the default codecs and interceptors and
/// forwards its state and track notifications to `events`
pub async fn new_peer(
    session_id: &str,
    ice_servers: &[IceServerConfig],
    events: EventSender,
) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);

    let sid = session_id.to_owned();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => dump_candidate(&sid, &c),
            None => debug!(session = %sid, "candidate gathering finished"),
        }
        Box::pin(async {})
    }));

    let sid = session_id.to_owned();
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        info!(session = %sid, ?state, "ICE gathering state");
        Box::pin(async {})
    }));

    let sid = session_id.to_owned();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        debug!(session = %sid, ?state, "peer connection state");
        Box::pin(async {})
    }));

    let sid = session_id.to_owned();
    let state_events = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        info!(session = %sid, ?state, "ICE connection state");
        if let Some(signal) = ConnectionSignal::from_ice(state) {
            // the session loop is gone once it has closed
            let _ = state_events.send(PeerEvent::Connection(signal));
        }
        Box::pin(async {})
    }));

    let sid = session_id.to_owned();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
            info!(session = %sid, kind = %track.kind(), "track received");
            let _ = events.send(PeerEvent::Track(track));
            Box::pin(async {})
        },
    ));

    Ok(pc)
}

pub fn rtc_config(servers: &[IceServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_ice_servers_with_credentials() {
        let servers = ice_servers(&[
            IceServerConfig::stun("stun.l.google.com:19302"),
            IceServerConfig::turn("relay.example.org:3478", "alice", "secret"),
        ]);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.l.google.com:19302".to_owned()]);
        assert!(servers[0].username.is_empty());
        assert_eq!(servers[1].urls, vec!["turn:relay.example.org:3478".to_owned()]);
        assert_eq!(servers[1].username, "alice");
        assert_eq!(servers[1].credential, "secret");
    }

    #[test]
    fn config_uses_max_bundle() {
        let config = rtc_config(&[]);
        assert!(config.ice_servers.is_empty());
        assert_eq!(config.bundle_policy, RTCBundlePolicy::MaxBundle);
    }

    #[tokio::test]
    async fn builds_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pc = new_peer("test", &[], tx).await.unwrap();
        assert_eq!(pc.connection_state(), RTCPeerConnectionState::New);
        pc.close().await.unwrap();
    }
}
