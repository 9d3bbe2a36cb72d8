use crate::error::{Error, Result};
use crate::peer::types::{CandidateKind, CandidateRecord};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

/// How long to hold the answer back so candidates make it into the SDP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherPolicy {
    /// Blind delay, regardless of gathering progress
    Fixed(Duration),
    /// Stop as soon as gathering completes, but never wait longer than `max_wait`
    UntilComplete { max_wait: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherOutcome {
    Completed,
    TimedOut,
    /// A fixed wait ran its full length
    Elapsed,
}

impl GatherPolicy {
    /// `complete` resolves when the connection reports the end of gathering
    pub async fn wait<F>(&self, complete: F) -> GatherOutcome
    where
        F: Future,
    {
        match *self {
            GatherPolicy::Fixed(d) => {
                sleep(d).await;
                GatherOutcome::Elapsed
            }
            GatherPolicy::UntilComplete { max_wait } => match timeout(max_wait, complete).await {
                Ok(_) => GatherOutcome::Completed,
                Err(_) => GatherOutcome::TimedOut,
            },
        }
    }
}

/// Candidate counts per type
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub prflx: usize,
    pub relay: usize,
}

impl CandidateSummary {
    pub fn from_candidates(candidates: &[CandidateRecord]) -> Self {
        let mut summary = Self::default();
        for candidate in candidates {
            match candidate.kind {
                CandidateKind::Host => summary.host += 1,
                CandidateKind::Srflx => summary.srflx += 1,
                CandidateKind::Prflx => summary.prflx += 1,
                CandidateKind::Relay => summary.relay += 1,
            }
        }
        summary
    }

    pub fn from_sdp(sdp: &str) -> Self {
        Self::from_candidates(&CandidateRecord::all_from_sdp(sdp))
    }

    pub fn total(&self) -> usize {
        self.host + self.srflx + self.prflx + self.relay
    }

    /// Logs the counts; zero candidates means the peer will most likely fail to connect
    pub fn report(&self, session_id: &str) {
        info!(
            session = session_id,
            host = self.host,
            srflx = self.srflx,
            relay = self.relay,
            "candidate analysis"
        );
        if self.total() == 0 {
            warn!(
                session = session_id,
                "answer carries no ICE candidates, connection is likely to fail"
            );
        } else if self.relay == 0 {
            info!(session = session_id, "no TURN relay candidates, connection through strict NAT may fail");
        }
    }
}

/// Gathers local candidates against `ice_servers` with a throwaway peer
/// connection and closes it whatever the outcome.
pub async fn probe_candidates(
    ice_servers: Vec<RTCIceServer>,
    max_wait: Duration,
) -> Result<Vec<CandidateRecord>> {
    let api = APIBuilder::new().build();
    let pc = api
        .new_peer_connection(RTCConfiguration {
            ice_servers,
            ..Default::default()
        })
        .await?;

    let result = gather_on(&pc, max_wait).await;
    if let Err(e) = pc.close().await {
        debug!("closing probe connection: {e}");
    }
    result
}

async fn gather_on(pc: &RTCPeerConnection, max_wait: Duration) -> Result<Vec<CandidateRecord>> {
    // a data channel is enough to give the offer an m-line to gather for
    pc.create_data_channel("probe", None).await?;
    let offer = pc.create_offer(None).await?;
    let mut complete = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await?;

    match (GatherPolicy::UntilComplete { max_wait })
        .wait(complete.recv())
        .await
    {
        GatherOutcome::Completed => debug!("probe gathering completed"),
        outcome => debug!(?outcome, "probe gathering did not complete"),
    }

    let local = pc
        .local_description()
        .await
        .ok_or_else(|| Error::Probe("probe has no local description".into()))?;
    Ok(CandidateRecord::all_from_sdp(&local.sdp))
}
