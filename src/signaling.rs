//! HTTP signaling: the demo page and the offer/answer endpoint

use crate::config::SessionSettings;
use crate::error::{Error, Result};
use crate::media::routing::default_encoder_factory;
use crate::media::EncoderFactory;
use crate::nat::NatReport;
use crate::peer::types::{AnswerResponse, OfferRequest};
use crate::peer::{PeerSession, SessionRegistry};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub settings: Arc<SessionSettings>,
    pub nat: Arc<NatReport>,
    pub encoders: EncoderFactory,
}

impl AppState {
    pub fn new(settings: SessionSettings, nat: Arc<NatReport>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            settings: Arc::new(settings),
            nat,
            encoders: default_encoder_factory(),
        }
    }

    pub fn with_encoders(mut self, encoders: EncoderFactory) -> Self {
        self.encoders = encoders;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/offer", post(offer))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn offer(State(state): State<AppState>, body: Bytes) -> Result<Json<AnswerResponse>> {
    let offer: OfferRequest =
        serde_json::from_slice(&body).map_err(|e| Error::MalformedRequest(e.to_string()))?;

    let (session, local) =
        PeerSession::accept_offer(&state.registry, &state.settings, &state.encoders, offer).await?;
    let sessions = state.registry.len().await;
    info!(session = session.id(), sessions, "answer sent");

    Ok(Json(AnswerResponse {
        kind: local.sdp_type.to_string(),
        sdp: local.sdp,
        nat_info: state.nat.get().cloned(),
    }))
}
