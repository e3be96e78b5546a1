use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use kodiconfig::get_config;
use kodinow::{Poller, PollerSettings, Snapshot, SnapshotStore};
use kodirpc::{Credentials, KodiClient, KodiEndpoint};
use kodiserver::{LoggingOptions, NowPlayingExt, ServerBuilder};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();

    // ========== Logging & HTTP server ==========
    let mut server = ServerBuilder::new_configured().build();
    server
        .init_logging(LoggingOptions::from_config(&config))
        .await;

    // ========== Kodi client ==========
    let kodi_url = config.get_kodi_url();
    let endpoint = KodiEndpoint::parse(&kodi_url)
        .with_context(|| format!("Invalid kodi.url '{}'", kodi_url))?;
    let credentials =
        Credentials::from_parts(&config.get_kodi_username(), &config.get_kodi_password());
    let client = Arc::new(KodiClient::new(
        endpoint,
        credentials,
        config.get_kodi_timeout(),
    ));

    let version_client = client.clone();
    match tokio::task::spawn_blocking(move || version_client.version()).await? {
        Ok(version) => info!(
            url = %client.endpoint().rpc_url(),
            "Connected to Kodi {}.{}",
            version.major,
            version.minor
        ),
        Err(e) => warn!(error = %e, "Kodi not reachable yet, polling anyway"),
    }

    // ========== Now-playing engine ==========
    let settings = PollerSettings {
        interval: config.get_poll_interval(),
        grace_period: config.get_grace_period(),
        extra_fanart_dir: config.get_extra_fanart_dir(),
        ..PollerSettings::default()
    };
    let store = Arc::new(SnapshotStore::new(Snapshot::stopped(Utc::now())));
    let poller = Poller::spawn(client.clone(), settings, store.clone())
        .context("Failed to start the poller")?;

    server
        .init_nowplaying_api(store, client)
        .await
        .context("Failed to start the SSE bridge")?;

    // ========== Serve ==========
    server
        .start()
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", server.http_port()))?;

    info!("KodiInfo is ready, press Ctrl+C to stop");
    server.wait().await;

    tokio::task::spawn_blocking(move || poller.shutdown()).await??;
    info!("Poller stopped");

    Ok(())
}
