use crate::nat::NatInfo;
use serde::{Deserialize, Serialize};

/// Offer posted by the browser to `POST /offer`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OfferRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// Answer returned for an offer, with the server's NAT snapshot
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnswerResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
    pub nat_info: Option<NatInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IceServerKind {
    Stun,
    Turn,
}

/// ICE server entry handed to every peer connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    #[serde(rename = "type")]
    pub kind: IceServerKind,
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            kind: IceServerKind::Stun,
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            kind: IceServerKind::Turn,
            url: url.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// ICE candidate type, as carried by the `typ` attribute
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Host,
    Srflx,
    Prflx,
    Relay,
}

impl CandidateKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "host" => Some(Self::Host),
            "srflx" => Some(Self::Srflx),
            "prflx" => Some(Self::Prflx),
            "relay" => Some(Self::Relay),
            _ => None,
        }
    }
}

/// A gathered candidate reduced to what classification needs
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub kind: CandidateKind,
    pub address: String,
    pub port: u16,
}

impl CandidateRecord {
    pub fn new(kind: CandidateKind, address: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            address: address.into(),
            port,
        }
    }

    /// Parses `a=candidate:` SDP lines as well as bare `candidate:` strings
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let line = line.strip_prefix("a=").unwrap_or(line);
        let body = line.strip_prefix("candidate:")?;

        // foundation component transport priority address port "typ" kind ...
        let fields: Vec<&str> = body.split_whitespace().collect();
        if fields.len() < 8 || fields[6] != "typ" {
            return None;
        }
        let port = fields[5].parse().ok()?;
        let kind = CandidateKind::parse(fields[7])?;
        Some(Self::new(kind, fields[4], port))
    }

    /// Every candidate line of a session description
    pub fn all_from_sdp(sdp: &str) -> Vec<Self> {
        sdp.lines().filter_map(Self::parse).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sdp_candidate_line() {
        let line = "a=candidate:1 1 udp 2130706431 192.168.1.100 54321 typ host generation 0";
        let cand = CandidateRecord::parse(line).unwrap();
        assert_eq!(cand, CandidateRecord::new(CandidateKind::Host, "192.168.1.100", 54321));
    }

    #[test]
    fn parses_trickle_candidate_string() {
        let line = "candidate:2 1 udp 1694498815 203.0.113.1 61000 typ srflx raddr 0.0.0.0 rport 61000";
        let cand = CandidateRecord::parse(line).unwrap();
        assert_eq!(cand.kind, CandidateKind::Srflx);
        assert_eq!(cand.address, "203.0.113.1");
    }

    #[test]
    fn ignores_non_candidate_lines() {
        assert!(CandidateRecord::parse("a=mid:0").is_none());
        assert!(CandidateRecord::parse("a=candidate:broken").is_none());
        assert!(CandidateRecord::parse("a=candidate:1 1 udp 1 10.0.0.1 notaport typ host").is_none());
    }

    #[test]
    fn collects_candidates_from_sdp() {
        let sdp = "v=0\r\n\
                   m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
                   a=candidate:1 1 udp 2130706431 10.0.0.2 5000 typ host\r\n\
                   a=candidate:2 1 udp 1694498815 198.51.100.7 6000 typ srflx raddr 10.0.0.2 rport 5000\r\n\
                   a=end-of-candidates\r\n";
        let cands = CandidateRecord::all_from_sdp(sdp);
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[1].kind, CandidateKind::Srflx);
    }

    #[test]
    fn offer_requires_both_fields() {
        assert!(serde_json::from_str::<OfferRequest>(r#"{"type":"offer"}"#).is_err());
        assert!(serde_json::from_str::<OfferRequest>(r#"{"sdp":"v=0"}"#).is_err());
        let offer: OfferRequest = serde_json::from_str(r#"{"type":"offer","sdp":"v=0"}"#).unwrap();
        assert_eq!(offer.kind, "offer");
    }

    #[test]
    fn answer_serialises_missing_nat_info_as_null() {
        let answer = AnswerResponse {
            kind: "answer".into(),
            sdp: "v=0".into(),
            nat_info: None,
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["type"], "answer");
        assert!(json["nat_info"].is_null());
    }
}
