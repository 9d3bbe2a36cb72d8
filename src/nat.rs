//! Startup NAT classification
//!
//! A single probe gathers the server's own ICE candidates against a public
//! STUN server and infers how reachable the server is. The result is
//! advisory: it is attached to every answer and never blocks startup.

use crate::config::NatProbeSettings;
use crate::error::{Error, Result};
use crate::peer::ice::probe_candidates;
use crate::peer::types::{CandidateKind, CandidateRecord, IceServerConfig};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Public address used to find the outbound interface; nothing is sent to it
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

pub const NOT_DETECTED: &str = "Not detected";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NatCategory {
    None,
    Unknown,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NatInfo {
    pub local_ip: String,
    pub public_ip: String,
    pub nat_type: String,
    pub nat_category: NatCategory,
    pub has_srflx: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl NatInfo {
    fn failed(detail: String) -> Self {
        Self {
            local_ip: NOT_DETECTED.into(),
            public_ip: NOT_DETECTED.into(),
            nat_type: "Detection failed".into(),
            nat_category: NatCategory::Error,
            has_srflx: false,
            error: Some(detail),
            detected_at: Utc::now(),
        }
    }
}

/// Source of the local address and candidates the classifier works from
#[async_trait]
pub trait CandidateProbe: Send + Sync {
    async fn local_address(&self) -> Result<IpAddr>;
    async fn gather(&self) -> Result<Vec<CandidateRecord>>;
}

/// Probe against a real STUN server
pub struct StunProbe {
    stun_url: String,
    timeout: Duration,
}

impl StunProbe {
    pub fn new(stun_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            stun_url: stun_url.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &NatProbeSettings) -> Self {
        Self::new(settings.stun_url.clone(), settings.timeout)
    }

    /// STUN URL with the scheme filled in
    pub fn server_url(&self) -> String {
        add_ice_url_scheme(&IceServerConfig::stun(self.stun_url.as_str()))
    }
}

#[async_trait]
impl CandidateProbe for StunProbe {
    async fn local_address(&self) -> Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(ROUTE_PROBE_ADDR).await?;
        Ok(socket.local_addr()?.ip())
    }

    async fn gather(&self) -> Result<Vec<CandidateRecord>> {
        let servers = vec![RTCIceServer {
            urls: vec![self.server_url()],
            ..Default::default()
        }];
        probe_candidates(servers, self.timeout)
            .await
            .map_err(|e| Error::Probe(e.to_string()))
    }
}

/// Infers the NAT situation from the gathered candidate types
pub fn classify(local: IpAddr, candidates: &[CandidateRecord]) -> NatInfo {
    let has_host = candidates.iter().any(|c| c.kind == CandidateKind::Host);
    let srflx = candidates.iter().find(|c| c.kind == CandidateKind::Srflx);

    let nat_type = match (has_host, srflx) {
        (true, None) => "No NAT detected - Same network as browser",
        (true, Some(_)) => "Behind NAT - exact type requires a live connection test",
        _ => "Unrecognized network configuration",
    };
    // cone vs. symmetric would need several STUN servers to tell apart
    let nat_category = match (has_host, srflx) {
        (true, None) => NatCategory::None,
        _ => NatCategory::Unknown,
    };
    let public_ip = srflx.map(|c| c.address.clone());

    NatInfo {
        local_ip: local.to_string(),
        public_ip: public_ip.unwrap_or_else(|| NOT_DETECTED.into()),
        nat_type: nat_type.into(),
        nat_category,
        has_srflx: srflx.is_some(),
        error: None,
        detected_at: Utc::now(),
    }
}

/// Runs the probe; failures end up in the result instead of an error
pub async fn detect(probe: &dyn CandidateProbe) -> NatInfo {
    let result = async {
        let local = probe.local_address().await?;
        let candidates = probe.gather().await?;
        Ok::<_, Error>(classify(local, &candidates))
    }
    .await;

    match result {
        Ok(info) => {
            info!(
                local_ip = %info.local_ip,
                public_ip = %info.public_ip,
                category = ?info.nat_category,
                "{}",
                info.nat_type
            );
            info
        }
        Err(e) => {
            warn!("NAT detection failed: {e}");
            NatInfo::failed(e.to_string())
        }
    }
}

/// Classification shared with the signaling handlers, written once at startup
#[derive(Debug, Default)]
pub struct NatReport {
    info: OnceCell<NatInfo>,
}

impl NatReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the first classification; later ones are dropped
    pub fn set(&self, info: NatInfo) -> bool {
        self.info.set(info).is_ok()
    }

    pub fn get(&self) -> Option<&NatInfo> {
        self.info.get()
    }
}
