//! Configuration module for environment variables and application settings

use std::env;
use std::path::PathBuf;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Twitter/X verification configuration
    pub twitter: TwitterConfig,

    /// Flat-file storage configuration
    pub storage: StorageConfig,

    /// Fixed-window rate limit applied to unauthenticated endpoints
    pub rate_limit: RateLimitConfig,

    /// Activity log configuration
    pub activity: ActivityConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct TwitterConfig {
    /// Bearer credential for the official lookup API. Optional: without it
    /// the client runs on the syndication fallback alone.
    pub bearer_token: Option<String>,

    /// Official tweet lookup base URL
    pub api_url: String,

    /// Unauthenticated syndication endpoint used as fallback
    pub syndication_url: String,

    /// Accept any tweet without checking it. Debug/local shortcut only;
    /// must never default to enabled.
    pub manual_verification: bool,

    /// Product handle that registration and claim tweets must mention
    pub product_handle: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding agents.json / claims.json / activities.json
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityConfig {
    /// Entries older than this are dropped by the retention sweep
    pub retention_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                // $PORT wins when set (Heroku-style), then SERVER_PORT
                port: env::var("PORT")
                    .or_else(|_| env::var("SERVER_PORT"))
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(3000),
            },

            twitter: TwitterConfig {
                bearer_token: env::var("TWITTER_BEARER_TOKEN").ok().filter(|t| !t.is_empty()),
                api_url: env::var("TWITTER_API_URL")
                    .unwrap_or_else(|_| "https://api.twitter.com/2".to_string()),
                syndication_url: env::var("TWITTER_SYNDICATION_URL")
                    .unwrap_or_else(|_| "https://cdn.syndication.twimg.com".to_string()),
                manual_verification: env::var("MANUAL_VERIFICATION")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
                product_handle: env::var("PRODUCT_HANDLE")
                    .unwrap_or_else(|_| "@solskill".to_string()),
            },

            storage: StorageConfig {
                data_dir: env::var("SOLSKILL_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("data")),
            },

            rate_limit: RateLimitConfig {
                window_ms: env::var("RATE_LIMIT_WINDOW_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60_000),
                max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },

            activity: ActivityConfig {
                retention_days: env::var("ACTIVITY_RETENTION_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            },
        })
    }
}
