//! One negotiated peer connection, from offer to teardown
//!
//! Connection notifications are queued and handled one at a time by a task
//! owned by the session. Closing is idempotent: whichever of the event loop,
//! a failed negotiation or server shutdown gets there first does the work.

use crate::config::{MediaPolicy, SessionSettings};
use crate::error::{Error, Result};
use crate::logger::dump_selected_pair;
use crate::media::routing::{attach_pattern, blackhole, EchoTracks};
use crate::media::{EncoderFactory, MediaTasks};
use crate::peer::connection::{new_peer, EventSender, PeerEvent};
use crate::peer::ice::CandidateSummary;
use crate::peer::registry::SessionRegistry;
use crate::peer::state::{ConnectionSignal, SessionState, Transition};
use crate::peer::types::OfferRequest;
use crate::utils::random_id;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_remote::TrackRemote;

pub struct PeerSession {
    id: String,
    pc: Arc<RTCPeerConnection>,
    settings: SessionSettings,
    registry: Weak<SessionRegistry>,
    state: watch::Sender<SessionState>,
    events: EventSender,
    media: MediaTasks,
    echo: OnceCell<EchoTracks>,
    echoed: Mutex<Vec<String>>,
    grace: Mutex<GraceTimer>,
    inbound: Mutex<Vec<String>>,
}

/// Disconnect grace timer; `generation` tells a live expiry from a stale one
#[derive(Default)]
struct GraceTimer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl PeerSession {
    /// Runs the whole offer/answer exchange. On failure the session is
    /// closed and deregistered before the error is returned.
    pub async fn accept_offer(
        registry: &Arc<SessionRegistry>,
        settings: &SessionSettings,
        encoders: &EncoderFactory,
        offer: OfferRequest,
    ) -> Result<(Arc<Self>, RTCSessionDescription)> {
        let session = Self::open(registry, settings, encoders).await?;
        match session.negotiate(offer).await {
            Ok(local) => Ok((session, local)),
            Err(e) => {
                warn!(session = %session.id, "negotiation failed: {e}");
                session.close().await;
                Err(e)
            }
        }
    }

    /// Creates the connection, registers the session and attaches the
    /// configured media
    pub async fn open(
        registry: &Arc<SessionRegistry>,
        settings: &SessionSettings,
        encoders: &EncoderFactory,
    ) -> Result<Arc<Self>> {
        let id = random_id();
        let (events, events_rx) = mpsc::unbounded_channel();
        let pc = new_peer(&id, &settings.ice_servers, events.clone()).await?;
        let (state, _) = watch::channel(SessionState::Negotiating);

        let session = Arc::new(Self {
            id,
            pc,
            settings: settings.clone(),
            registry: Arc::downgrade(registry),
            state,
            events,
            media: MediaTasks::default(),
            echo: OnceCell::new(),
            echoed: Mutex::new(Vec::new()),
            grace: Mutex::new(GraceTimer::default()),
            inbound: Mutex::new(Vec::new()),
        });

        registry.insert(Arc::clone(&session)).await;
        tokio::spawn(Arc::clone(&session).run(events_rx));

        if let Err(e) = session.attach_media(encoders).await {
            session.close().await;
            return Err(e);
        }

        info!(session = %session.id, media = ?settings.media, "session created");
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Ids of every inbound track seen so far
    pub fn inbound_tracks(&self) -> Vec<String> {
        self.inbound.lock().clone()
    }

    /// Ids of the inbound tracks being mirrored back
    pub fn echoed_tracks(&self) -> Vec<String> {
        self.echoed.lock().clone()
    }

    /// Queues a connection signal behind any pending notifications
    pub fn notify(&self, signal: ConnectionSignal) {
        let _ = self.events.send(PeerEvent::Connection(signal));
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }

    async fn attach_media(&self, encoders: &EncoderFactory) -> Result<()> {
        match self.settings.media {
            MediaPolicy::Pattern => {
                attach_pattern(&self.pc, &self.id, encoders(), &self.media).await?;
            }
            MediaPolicy::Echo => {
                let echo = EchoTracks::attach(&self.pc, &self.id, &self.media).await?;
                let _ = self.echo.set(echo);
            }
        }
        Ok(())
    }

    async fn negotiate(&self, offer: OfferRequest) -> Result<RTCSessionDescription> {
        if offer.kind != "offer" {
            return Err(Error::Negotiation(format!(
                "expected an offer, got `{}`",
                offer.kind
            )));
        }

        let remote = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| Error::Negotiation(format!("invalid offer: {e}")))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::Negotiation(format!("failed to set remote description: {e}")))?;

        debug!(session = %self.id, "creating answer");
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("failed to create answer: {e}")))?;

        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("failed to set local description: {e}")))?;

        let outcome = self.settings.gather.wait(gathered.recv()).await;
        debug!(session = %self.id, ?outcome, "ICE gathering wait over");

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| Error::Negotiation("no local description after answer".into()))?;
        CandidateSummary::from_sdp(&local.sdp).report(&self.id);
        Ok(local)
    }

    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
        let mut state = self.state.subscribe();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = async {
                    let _ = state.wait_for(|s| s.is_terminal()).await;
                } => break,
            }
        }
        debug!(session = %self.id, "event loop finished");
    }

    async fn handle(&self, event: PeerEvent) {
        match event {
            PeerEvent::Connection(signal) => self.apply(signal).await,
            PeerEvent::Track(track) => self.on_inbound_track(track),
            PeerEvent::GraceExpired(generation) => {
                let live = {
                    let mut grace = self.grace.lock();
                    let live = grace.handle.is_some() && grace.generation == generation;
                    if live {
                        grace.handle = None;
                    }
                    live
                };
                if live {
                    self.apply(ConnectionSignal::GraceExpired).await;
                } else {
                    debug!(session = %self.id, generation, "stale grace expiry ignored");
                }
            }
        }
    }

    async fn apply(&self, signal: ConnectionSignal) {
        let current = self.state();
        match current.on_signal(signal) {
            Transition::Stay => {
                debug!(session = %self.id, state = ?current, ?signal, "no transition");
            }
            Transition::Enter(next) => {
                let moved = self.state.send_if_modified(|s| {
                    if s.is_shutting_down() {
                        return false;
                    }
                    *s = next;
                    true
                });
                if !moved {
                    return;
                }
                info!(session = %self.id, from = ?current, to = ?next, "session state");
                match next {
                    SessionState::Disconnected => self.arm_grace(),
                    SessionState::Connected | SessionState::Completed => self.disarm_grace(),
                    _ => {}
                }
            }
            Transition::Close => {
                if signal == ConnectionSignal::Failed {
                    dump_selected_pair(&self.pc, &self.id, "before-close").await;
                }
                info!(session = %self.id, ?signal, "closing session");
                self.close().await;
            }
        }
    }

    fn on_inbound_track(&self, track: Arc<TrackRemote>) {
        self.inbound.lock().push(track.id());
        let echo = match self.settings.media {
            MediaPolicy::Echo => self.echo.get(),
            MediaPolicy::Pattern => None,
        };
        match echo.and_then(|echo| echo.forward(Arc::clone(&track), &self.id)) {
            Some(handle) => {
                self.echoed.lock().push(track.id());
                self.media.push(handle);
            }
            None => self.media.push(blackhole(track, &self.id)),
        }
    }

    /// Starts the disconnect grace timer unless one is already running
    fn arm_grace(&self) {
        let mut grace = self.grace.lock();
        if grace.handle.is_some() {
            return;
        }
        grace.generation += 1;
        let generation = grace.generation;
        let period = self.settings.disconnect_grace;
        let events = self.events.clone();
        debug!(session = %self.id, ?period, generation, "disconnect grace period started");
        grace.handle = Some(tokio::spawn(async move {
            sleep(period).await;
            let _ = events.send(PeerEvent::GraceExpired(generation));
        }));
    }

    fn disarm_grace(&self) {
        if let Some(handle) = self.grace.lock().handle.take() {
            debug!(session = %self.id, "disconnect grace period cancelled");
            handle.abort();
        }
    }

    /// Releases the connection and leaves the registry. Calling it on a
    /// session that is already closing or closed does nothing.
    pub async fn close(&self) {
        let began = self.state.send_if_modified(|s| {
            if s.is_shutting_down() {
                return false;
            }
            *s = SessionState::Closing;
            true
        });
        if !began {
            debug!(session = %self.id, "close ignored, already closing");
            return;
        }

        self.disarm_grace();
        self.media.abort_all();
        if let Err(e) = self.pc.close().await {
            warn!(session = %self.id, "error closing peer connection: {e}");
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id).await;
        }
        self.state.send_replace(SessionState::Closed);
        info!(session = %self.id, "session closed");
    }
}
