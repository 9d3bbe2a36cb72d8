pub mod connection;
pub mod ice;
pub mod registry;
pub mod session;
pub mod state;
pub mod types;

pub use registry::SessionRegistry;
pub use session::PeerSession;
pub use state::{ConnectionSignal, SessionState};
pub use types::{AnswerResponse, CandidateKind, CandidateRecord, IceServerConfig, OfferRequest};
