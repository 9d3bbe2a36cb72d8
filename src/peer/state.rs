//! Peer session lifecycle
//!
//! ```text
//! negotiating ──► connected ◄──► completed
//!      │              │  ▲           │
//!      │              ▼  │           │
//!      └────────► disconnected ◄─────┘
//!                     │ (failed / closed / grace expired)
//!                     ▼
//!                  closing ──► closed
//! ```
//!
//! `failed` and `closed` close the session from any live state. A
//! `disconnected` session is given a bounded grace period to recover.

use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Connected,
    Completed,
    Disconnected,
    Closing,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }

    pub fn is_shutting_down(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }

    /// Exhaustive transition table
    pub fn on_signal(self, signal: ConnectionSignal) -> Transition {
        use ConnectionSignal as S;
        use SessionState::*;

        match (self, signal) {
            (Closing | Closed, _) => Transition::Stay,
            (_, S::Failed | S::Closed) => Transition::Close,
            (Disconnected, S::GraceExpired) => Transition::Close,
            (_, S::GraceExpired) => Transition::Stay,
            (_, S::Checking) => Transition::Stay,
            (Connected, S::Connected)
            | (Completed, S::Completed)
            | (Disconnected, S::Disconnected) => Transition::Stay,
            (_, S::Connected) => Transition::Enter(Connected),
            (_, S::Completed) => Transition::Enter(Completed),
            (_, S::Disconnected) => Transition::Enter(Disconnected),
        }
    }
}

/// Notifications that drive a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSignal {
    /// Connectivity checks in progress
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
    /// Disconnect grace period ran out
    GraceExpired,
}

impl ConnectionSignal {
    pub fn from_ice(state: RTCIceConnectionState) -> Option<Self> {
        match state {
            RTCIceConnectionState::New | RTCIceConnectionState::Checking => Some(Self::Checking),
            RTCIceConnectionState::Connected => Some(Self::Connected),
            RTCIceConnectionState::Completed => Some(Self::Completed),
            RTCIceConnectionState::Disconnected => Some(Self::Disconnected),
            RTCIceConnectionState::Failed => Some(Self::Failed),
            RTCIceConnectionState::Closed => Some(Self::Closed),
            RTCIceConnectionState::Unspecified => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Enter(SessionState),
    /// Release the connection and leave the registry
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionSignal as S;
    use SessionState::*;

    const LIVE: [SessionState; 4] = [Negotiating, Connected, Completed, Disconnected];

    #[test]
    fn failed_and_closed_close_every_live_state() {
        for state in LIVE {
            assert_eq!(state.on_signal(S::Failed), Transition::Close, "{state:?}");
            assert_eq!(state.on_signal(S::Closed), Transition::Close, "{state:?}");
        }
    }

    #[test]
    fn disconnected_alone_never_closes() {
        for state in [Negotiating, Connected, Completed] {
            assert_eq!(state.on_signal(S::Disconnected), Transition::Enter(Disconnected));
        }
        assert_eq!(Disconnected.on_signal(S::Disconnected), Transition::Stay);
    }

    #[test]
    fn disconnected_recovers() {
        assert_eq!(Disconnected.on_signal(S::Connected), Transition::Enter(Connected));
        assert_eq!(Disconnected.on_signal(S::Completed), Transition::Enter(Completed));
    }

    #[test]
    fn grace_expiry_only_closes_disconnected() {
        assert_eq!(Disconnected.on_signal(S::GraceExpired), Transition::Close);
        for state in [Negotiating, Connected, Completed] {
            assert_eq!(state.on_signal(S::GraceExpired), Transition::Stay);
        }
    }

    #[test]
    fn establishment_path() {
        assert_eq!(Negotiating.on_signal(S::Checking), Transition::Stay);
        assert_eq!(Negotiating.on_signal(S::Connected), Transition::Enter(Connected));
        assert_eq!(Connected.on_signal(S::Completed), Transition::Enter(Completed));
        assert_eq!(Completed.on_signal(S::Connected), Transition::Enter(Connected));
    }

    #[test]
    fn shutting_down_states_ignore_everything() {
        let all = [
            S::Checking,
            S::Connected,
            S::Completed,
            S::Disconnected,
            S::Failed,
            S::Closed,
            S::GraceExpired,
        ];
        for state in [Closing, Closed] {
            for signal in all {
                assert_eq!(state.on_signal(signal), Transition::Stay);
            }
        }
        assert!(Closed.is_terminal());
        assert!(!Closing.is_terminal());
        assert!(Closing.is_shutting_down());
    }

    #[test]
    fn ice_state_mapping() {
        assert_eq!(ConnectionSignal::from_ice(RTCIceConnectionState::Checking), Some(S::Checking));
        assert_eq!(ConnectionSignal::from_ice(RTCIceConnectionState::Failed), Some(S::Failed));
        assert_eq!(ConnectionSignal::from_ice(RTCIceConnectionState::Unspecified), None);
    }
}
