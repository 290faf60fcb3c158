//! The `serve` lifecycle.
//!
//! [`KioskService::run`] restores the cookie jar, runs the content server,
//! the relay server and the relay client until the shutdown future
//! resolves, then stops them and forces a final cookie flush. The flush runs
//! even when a server ended with an error; that error is reported after it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::KioskConfig;
use crate::cookies::{CookiePersistence, CookieStore, MemoryCookieStore};
use crate::relay::{self, RelayClientConfig, RelayHub};
use crate::server::{AppState, ContentServer};

/// Both listeners of the kiosk side, bound and ready to serve.
pub struct KioskService {
    config: KioskConfig,
    http_listener: TcpListener,
    relay_listener: TcpListener,
}

impl KioskService {
    /// Bind the content and relay listeners from `config`.
    pub async fn bind(config: KioskConfig) -> Result<Self> {
        let http_listener = TcpListener::bind(config.http_addr())
            .await
            .with_context(|| format!("failed to bind content server on {}", config.http_addr()))?;
        let relay_listener = TcpListener::bind(config.relay_addr())
            .await
            .with_context(|| format!("failed to bind relay server on {}", config.relay_addr()))?;
        Ok(Self {
            config,
            http_listener,
            relay_listener,
        })
    }

    /// Bound address of the content server.
    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http_listener.local_addr()
    }

    /// Bound address of the relay server.
    pub fn relay_addr(&self) -> std::io::Result<SocketAddr> {
        self.relay_listener.local_addr()
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            config,
            http_listener,
            relay_listener,
        } = self;

        // Restored before the content server accepts its first connection.
        let cookies = Arc::new(MemoryCookieStore::new());
        let store: Arc<dyn CookieStore> = cookies.clone();
        let persistence = Arc::new(CookiePersistence::new(
            store,
            config.cookies_path(),
            config.cookie_debounce,
        ));
        persistence.restore().await;
        let watcher = persistence.watch(cookies.subscribe());

        let relay_client = config.dialer_url.clone().map(|url| {
            relay::client::spawn(RelayClientConfig {
                url,
                reconnect_delay: config.reconnect_delay,
                keepalive_interval: config.keepalive_interval,
            })
        });

        let state = Arc::new(AppState::from_config(&config, cookies, relay_client.clone()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let relay_server = tokio::spawn(relay::hub::serve(
            relay_listener,
            Arc::new(RelayHub::new()),
            stopped(stop_rx.clone()),
        ));
        let content_server = tokio::spawn(ContentServer::serve(
            http_listener,
            state,
            stopped(stop_rx),
        ));

        shutdown.await;
        info!("Shutting down");
        let _ = stop_tx.send(true);

        let content = content_server.await;
        let relay = relay_server.await;
        if let Some(client) = relay_client {
            client.shutdown();
        }
        watcher.abort();

        let flushed = persistence.flush_now().await;
        match &flushed {
            Ok(()) => info!(path = %persistence.path().display(), "Cookie session saved"),
            Err(e) => error!(error = %e, "Final cookie flush failed"),
        }

        content
            .context("content server task panicked")?
            .context("content server failed")?;
        relay
            .context("relay server task panicked")?
            .context("relay server failed")?;
        flushed.context("final cookie flush failed")?;
        Ok(())
    }
}

/// Resolves once `true` is sent on the stop channel, or the sender is gone.
pub fn stopped(mut stop: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = stop.wait_for(|stopped| *stopped).await;
    }
}
