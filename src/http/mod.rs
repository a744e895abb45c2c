//! HTTP surface
//!
//! JSON API over axum. Handlers are thin: they parse the request, call into
//! [`IntelligenceService`], the browse helpers, or a search engine, and let
//! [`CodeBrowserError`](crate::error::CodeBrowserError) pick the status code.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::browse::ResponseCache;
use crate::intelligence::IntelligenceService;
use crate::registry::RepoRegistry;
use crate::search::SearchEngines;

/// Shared state handed to every handler
pub struct AppState {
    pub intelligence: IntelligenceService,
    pub engines: SearchEngines,
    pub cache: ResponseCache,
}

impl AppState {
    /// State without response caching
    pub fn new(intelligence: IntelligenceService, engines: SearchEngines) -> Self {
        Self {
            intelligence,
            engines,
            cache: ResponseCache::disabled(),
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn registry(&self) -> &Arc<dyn RepoRegistry> {
        self.intelligence.registry()
    }
}

/// Build the router with all routes and layers
pub fn router(state: Arc<AppState>, request_timeout: Duration) -> axum::Router {
    handlers::router(state, request_timeout)
}

/// Bind `listen` and serve until Ctrl-C
pub async fn serve(listen: SocketAddr, state: Arc<AppState>, request_timeout: Duration) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state, request_timeout))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
