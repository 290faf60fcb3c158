//! Content server implementation

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::{KioskConfig, MAX_BODY_BYTES};
use crate::cookies::MemoryCookieStore;
use crate::handlers;
use crate::paths::PathResolver;
use crate::relay::RelayClientHandle;
use crate::status::SystemProbe;
use crate::tasks::TaskStore;

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    pub resolver: PathResolver,
    pub tasks: TaskStore,
    pub probe: SystemProbe,
    pub cookies: Arc<MemoryCookieStore>,
    /// `None` when no dialer URL is configured
    pub relay: Option<RelayClientHandle>,
}

impl AppState {
    pub fn from_config(
        config: &KioskConfig,
        cookies: Arc<MemoryCookieStore>,
        relay: Option<RelayClientHandle>,
    ) -> Self {
        let resolver = config
            .aux_roots
            .iter()
            .fold(PathResolver::new(&config.content_root), |resolver, (prefix, root)| {
                resolver.with_aux_root(prefix.clone(), root)
            });
        Self {
            resolver,
            tasks: TaskStore::new(config.tasks_path()),
            probe: SystemProbe::from_config(config),
            cookies,
            relay,
        }
    }
}

/// CORS policy of one API route: any origin, a JSON `Content-Type`, and the
/// route's own methods. Answers `OPTIONS` itself, so handlers never see it.
fn cors<const N: usize>(methods: [Method; N]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE])
}

/// Build the router: task API, status API, session and dial-pad routes, then
/// static content for everything else.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/api/tasks",
            get(handlers::tasks::list)
                .post(handlers::tasks::create)
                .layer(cors([Method::GET, Method::POST, Method::OPTIONS])),
        )
        .route(
            "/api/tasks/{id}",
            get(handlers::tasks::get)
                .patch(handlers::tasks::update)
                .delete(handlers::tasks::delete)
                .layer(cors([
                    Method::GET,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])),
        )
        .route(
            "/api/system/status",
            get(handlers::status::system_status).layer(cors([Method::GET, Method::OPTIONS])),
        )
        .route(
            "/api/session/cookies",
            get(handlers::session::list)
                .post(handlers::session::record_change)
                .layer(cors([Method::GET, Method::POST, Method::OPTIONS])),
        )
        .route(
            "/api/dialpad",
            post(handlers::dialpad::send).layer(cors([Method::POST, Method::OPTIONS])),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::map_response(handlers::preflight));

    Router::new()
        .merge(api)
        .fallback(handlers::assets::serve)
        .with_state(state)
}

/// Kiosk content and API server
pub struct ContentServer;

impl ContentServer {
    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!("Content server listening on http://{}", addr);
        }
        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}
