use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Errors surfaced by the signaling server
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request body is not JSON or misses a required field
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Offer/answer exchange failed; the session has been torn down
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// NAT probe failure, only ever stored in the classification result
    #[error("nat probe failed: {0}")]
    Probe(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn kind(&self) -> &'static str {
        match self {
            Error::MalformedRequest(_) => "malformed_request",
            Error::Negotiation(_) | Error::WebRtc(_) => "negotiation_failed",
            Error::Probe(_) => "probe_failed",
            Error::Encoding(_) => "encoding_failed",
            Error::Config(_) => "invalid_config",
            Error::Io(_) => "io_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
