//! # SolSkill Server
//!
//! HTTP API server for the agent identity and API-key lifecycle with
//! Twitter/X social-proof verification, built with Axum and Tokio.
//!
//! ## Architecture
//! The server is organized into modules:
//! - `server`: core server initialization and route configuration
//! - `config`: environment variable configuration management
//! - `store`: file-backed credential store and activity log
//! - `services`: rate limiter and tweet verification provider chain
//! - `auth`: API-key minting and Bearer authentication middleware
//! - `routes`: HTTP route handlers organized by functionality
//!
//! ## Environment Setup
//! Copy `.env.example` to `.env` and configure:
//! ```bash
//! cp .env.example .env
//! # Edit .env with your Twitter bearer token
//! ```
//!
//! ## Running the Server
//! ```bash
//! cargo run
//! ```
//!
//! The server starts on `http://0.0.0.0:3000` by default; verify with
//! `curl http://localhost:3000/ping`.

mod auth;
mod config;
mod error;
mod routes;
mod server;
mod services;
mod store;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Structured logging: compact console output, level via RUST_LOG
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();

    tracing::info!("🏁 Starting SolSkill Server...");
    tracing::info!(
        "📦 Package: {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = server::start().await {
        tracing::error!("server failed: {:#}", e);
        std::process::exit(1);
    }
}
