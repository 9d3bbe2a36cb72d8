// Server configuration: defaults, command line, validated settings

use crate::error::{Error, Result};
use crate::peer::ice::GatherPolicy;
use crate::peer::types::{IceServerConfig, IceServerKind};
use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

pub const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";

/// Upper bound of the ICE gathering wait before an answer is returned
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a `disconnected` session may linger before it is closed
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(10);

pub const DEFAULT_NAT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What a session sends back to the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaPolicy {
    /// Send the color bars pattern; inbound media is discarded
    Pattern,
    /// Mirror every inbound track back to the sender
    Echo,
}

/// Color bars WebRTC signaling server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "COLORBARS_HOST")]
    pub host: IpAddr,

    /// Media served to each peer
    #[arg(long, value_enum, default_value = "pattern", env = "COLORBARS_MODE")]
    pub mode: MediaPolicy,

    /// Maximum time to wait for ICE gathering before answering
    #[arg(long, default_value_t = DEFAULT_GATHER_TIMEOUT.as_secs(), env = "COLORBARS_GATHER_TIMEOUT_SECS")]
    pub gather_timeout_secs: u64,

    /// Always wait the full gather timeout instead of stopping when gathering completes
    #[arg(long)]
    pub fixed_gather_wait: bool,

    /// Grace period for a disconnected peer to recover
    #[arg(long, default_value_t = DEFAULT_DISCONNECT_GRACE.as_secs(), env = "COLORBARS_DISCONNECT_GRACE_SECS")]
    pub disconnect_grace_secs: u64,

    /// STUN servers for peer connections
    #[arg(long = "stun", default_value = DEFAULT_STUN)]
    pub stun: Vec<String>,

    /// TURN servers as `url,username,credential`
    #[arg(long = "turn", value_parser = parse_turn)]
    pub turn: Vec<IceServerConfig>,

    /// STUN server used by the startup NAT probe
    #[arg(long, default_value = DEFAULT_STUN)]
    pub nat_stun: String,

    #[arg(long, default_value_t = DEFAULT_NAT_PROBE_TIMEOUT.as_secs())]
    pub nat_probe_timeout_secs: u64,

    /// Skip NAT classification at startup
    #[arg(long)]
    pub skip_nat_probe: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "COLORBARS_LOG")]
    pub log_level: String,
}

fn parse_turn(s: &str) -> std::result::Result<IceServerConfig, String> {
    let parts: Vec<&str> = s.splitn(3, ',').collect();
    match parts.as_slice() {
        [url, username, credential] if !url.is_empty() => {
            Ok(IceServerConfig::turn(*url, *username, *credential))
        }
        _ => Err(format!("expected `url,username,credential`, got `{s}`")),
    }
}

/// Per-session negotiation settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub media: MediaPolicy,
    pub gather: GatherPolicy,
    pub disconnect_grace: Duration,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            media: MediaPolicy::Pattern,
            gather: GatherPolicy::UntilComplete {
                max_wait: DEFAULT_GATHER_TIMEOUT,
            },
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct NatProbeSettings {
    pub enabled: bool,
    pub stun_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub session: SessionSettings,
    pub nat_probe: NatProbeSettings,
    pub log_level: String,
}

impl Settings {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let gather_wait = Duration::from_secs(cli.gather_timeout_secs);
        let gather = if cli.fixed_gather_wait {
            GatherPolicy::Fixed(gather_wait)
        } else {
            GatherPolicy::UntilComplete {
                max_wait: gather_wait,
            }
        };

        let mut ice_servers: Vec<IceServerConfig> =
            cli.stun.into_iter().map(IceServerConfig::stun).collect();
        ice_servers.extend(cli.turn);
        validate_ice_servers(&ice_servers)?;

        Ok(Self {
            listen: SocketAddr::new(cli.host, cli.port),
            session: SessionSettings {
                media: cli.mode,
                gather,
                disconnect_grace: Duration::from_secs(cli.disconnect_grace_secs),
                ice_servers,
            },
            nat_probe: NatProbeSettings {
                enabled: !cli.skip_nat_probe,
                stun_url: cli.nat_stun,
                timeout: Duration::from_secs(cli.nat_probe_timeout_secs),
            },
            log_level: cli.log_level,
        })
    }
}

pub fn validate_ice_servers(servers: &[IceServerConfig]) -> Result<()> {
    for server in servers {
        if server.url.is_empty() {
            return Err(Error::Config("ICE server URL cannot be empty".into()));
        }
        if server.kind == IceServerKind::Turn
            && (server.username.is_none() || server.credential.is_none())
        {
            return Err(Error::Config(format!(
                "TURN server {} requires username and credential",
                server.url
            )));
        }
    }
    Ok(())
}
