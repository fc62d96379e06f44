//! # Server Module
//!
//! HTTP server setup and route configuration for the solskill server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::middleware;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::ApiKeyAuth;
use crate::config::Config;
use crate::routes;
use crate::services::{RateLimiter, TwitterVerifier};
use crate::store::{ActivityLog, AgentStore};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across all route handlers.
///
/// Everything is constructed in [`start`] and injected from there; there is
/// no module-level singleton, so tests can build isolated instances.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub agents: Arc<AgentStore>,
    pub activity: Arc<ActivityLog>,
    pub rate_limiter: Arc<RateLimiter>,
    pub verifier: Arc<TwitterVerifier>,
}

/// Assemble the full router over the given state.
pub fn build_router(state: AppState) -> Router {
    // Activity endpoints require a Bearer API key
    let activity_routes = routes::activities::create_routes().layer(
        middleware::from_fn_with_state(state.clone(), ApiKeyAuth::validate_key),
    );

    Router::new()
        .route("/ping", axum::routing::get(routes::health::ping))
        .merge(routes::agents::create_routes())
        .merge(routes::claim::create_routes())
        .merge(activity_routes)
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([
                        axum::http::Method::GET,
                        axum::http::Method::POST,
                        axum::http::Method::OPTIONS,
                    ])
                    .allow_headers([
                        axum::http::header::ORIGIN,
                        axum::http::header::CONTENT_TYPE,
                        axum::http::header::ACCEPT,
                        axum::http::header::AUTHORIZATION,
                    ]),
            ),
        )
        .with_state(state)
}

/// Starts the solskill HTTP server: loads configuration, opens the stores,
/// wires the verification chain, spawns the background sweep task, and
/// serves until the process is terminated.
pub async fn start() -> Result<()> {
    let config = Arc::new(Config::from_env().context("failed to load configuration")?);

    let agents = Arc::new(
        AgentStore::open(&config.storage.data_dir).context("failed to open agent store")?,
    );
    let activity = Arc::new(
        ActivityLog::open(&config.storage.data_dir).context("failed to open activity log")?,
    );
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let verifier = Arc::new(TwitterVerifier::from_config(&config.twitter));

    tracing::info!("loaded {} agent(s) from {}", agents.len().await, config.storage.data_dir.display());

    let state = AppState {
        config: config.clone(),
        agents,
        activity: activity.clone(),
        rate_limiter: rate_limiter.clone(),
        verifier,
    };

    // Periodic cleanup: expired rate-limit windows and aged-out activity
    // entries, on one shared interval independent of request handling.
    let retention_days = config.activity.retention_days;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let dropped = rate_limiter.sweep();
            if dropped > 0 {
                tracing::debug!("rate limiter sweep dropped {} entries", dropped);
            }
            activity.sweep_retention(retention_days).await;
        }
    });

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr} - port may already be in use"))?;

    tracing::info!("🚀 solskill server listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/ping", addr);
    tracing::info!("🤖 Agent endpoints available at http://{}/agents/*", addr);

    // Connect info feeds the rate limiter's per-peer fallback bucket when no
    // proxy header is present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
