use crate::peer::types::{IceServerConfig, IceServerKind};
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Prefixes `stun:`/`turn:` to an ICE server URL that has no scheme
pub fn add_ice_url_scheme(config: &IceServerConfig) -> String {
    const SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];
    if SCHEMES.iter().any(|s| config.url.starts_with(s)) {
        config.url.clone()
    } else {
        let scheme = match config.kind {
            IceServerKind::Turn => "turn:",
            IceServerKind::Stun => "stun:",
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_is_sixteen_hex_chars() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }

    #[test]
    fn scheme_added_only_when_missing() {
        let turn = IceServerConfig::turn("relay.example.org:3478", "user", "secret");
        assert_eq!(add_ice_url_scheme(&turn), "turn:relay.example.org:3478");

        let stun = IceServerConfig::stun("stun:stun.l.google.com:19302");
        assert_eq!(add_ice_url_scheme(&stun), "stun:stun.l.google.com:19302");

        let turns = IceServerConfig::turn("turns:relay.example.org:443", "user", "secret");
        assert_eq!(add_ice_url_scheme(&turns), "turns:relay.example.org:443");
    }
}
