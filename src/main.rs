use anyhow::Context;
use clap::Parser;
use colorbars_rtc::config::{Cli, Settings};
use colorbars_rtc::logger;
use colorbars_rtc::nat::{self, NatReport, StunProbe};
use colorbars_rtc::signaling::{router, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_cli(Cli::parse())?;
    logger::init(&settings.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %settings.listen,
        mode = ?settings.session.media,
        gather = ?settings.session.gather,
        ice_servers = settings.session.ice_servers.len(),
        "colorbars-rtc starting"
    );

    // classification finishes before the listener accepts anything
    let nat = Arc::new(NatReport::new());
    if settings.nat_probe.enabled {
        let probe = StunProbe::from_settings(&settings.nat_probe);
        nat.set(nat::detect(&probe).await);
    } else {
        info!("NAT probe skipped");
    }

    let state = AppState::new(settings.session.clone(), nat);
    let registry = Arc::clone(&state.registry);

    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen))?;
    info!("listening on http://{}", settings.listen);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    registry.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
