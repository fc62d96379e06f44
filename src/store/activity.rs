//! File-backed activity logger.
//!
//! Append-mostly: records are created once per handled request and never
//! mutated; the only deletion path is the retention sweep. Request bodies are
//! redacted before they ever touch disk, and API keys are stored in masked
//! form only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::agents::write_json;
use crate::store::models::{mask_api_key, Activity, ActivityType};

const ACTIVITIES_FILE: &str = "activities.json";

/// Body keys whose values are never persisted. Matched case-insensitively as
/// substrings, so `apiKey` and `privateKey` both trip on `key`.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "key",
    "privatekey",
    "seed",
    "mnemonic",
];

const REDACTED: &str = "[REDACTED]";

/// Fields supplied by a handler when logging a request.
#[derive(Debug, Default, Clone)]
pub struct NewActivity {
    /// When absent, derived from the endpoint path.
    pub activity_type: Option<ActivityType>,
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub duration_ms: u64,
    pub request_body: Option<Value>,
    pub response_preview: Option<String>,
    pub error: Option<String>,
    pub metadata: Option<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Filters accepted by [`ActivityLog::query`].
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    #[serde(rename = "type")]
    pub activity_type: Option<ActivityType>,
    /// Identity filter. Keys are stored masked, and masked keys can collide
    /// across agents, so the agent id is the only ownership filter.
    pub agent_id: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// One page of query results plus the filter-wide total.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub activities: Vec<Activity>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total: usize,
    pub by_endpoint: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
    pub last_24h: u64,
    pub last_7d: u64,
    pub avg_duration_ms: f64,
}

pub struct ActivityLog {
    path: PathBuf,
    inner: RwLock<Vec<Activity>>,
}

impl ActivityLog {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let path = data_dir.join(ACTIVITIES_FILE);
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            inner: RwLock::new(entries),
        })
    }

    /// Append one record. Persist failures are logged and swallowed: the log
    /// is telemetry and must never fail the request being logged.
    pub async fn log(&self, entry: NewActivity) -> Activity {
        let activity_type = if entry.status >= 400 {
            ActivityType::Error
        } else {
            entry
                .activity_type
                .unwrap_or_else(|| derive_type(&entry.endpoint))
        };

        let record = Activity {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            activity_type,
            api_key: entry.api_key.as_deref().map(mask_api_key),
            agent_id: entry.agent_id,
            endpoint: entry.endpoint,
            method: entry.method,
            status: entry.status,
            duration_ms: entry.duration_ms,
            request_body: entry.request_body.map(redact),
            response_preview: entry.response_preview,
            error: entry.error,
            metadata: entry.metadata,
            ip: entry.ip,
            user_agent: entry.user_agent,
        };

        let mut entries = self.inner.write().await;
        entries.push(record.clone());
        if let Err(e) = write_json(&self.path, &*entries) {
            tracing::warn!("failed to persist activity log: {:#}", e);
        }
        record
    }

    /// Filtered page, newest-first, with the total count independent of the
    /// page bounds.
    pub async fn query(&self, q: &ActivityQuery) -> ActivityPage {
        let entries = self.inner.read().await;

        let mut matched: Vec<&Activity> = entries
            .iter()
            .filter(|a| {
                q.activity_type.is_none_or(|t| a.activity_type == t)
                    && q.agent_id
                        .as_deref()
                        .is_none_or(|id| a.agent_id.as_deref() == Some(id))
                    && q.endpoint
                        .as_deref()
                        .is_none_or(|e| a.endpoint.contains(e))
                    && q.method
                        .as_deref()
                        .is_none_or(|m| a.method.eq_ignore_ascii_case(m))
                    && q.from.is_none_or(|from| a.timestamp >= from)
                    && q.to.is_none_or(|to| a.timestamp <= to)
                    && q.status_min.is_none_or(|s| a.status >= s)
                    && q.status_max.is_none_or(|s| a.status <= s)
            })
            .collect();

        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matched.len();
        let offset = q.offset.unwrap_or(0);
        let limit = q.limit.unwrap_or(50).min(500);
        let activities = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        ActivityPage {
            activities,
            total,
            offset,
            limit,
        }
    }

    /// Aggregate counts, optionally scoped to one agent.
    pub async fn stats(&self, agent_id: Option<&str>) -> ActivityStats {
        let entries = self.inner.read().await;
        let now = Utc::now();
        let day_ago = now - Duration::hours(24);
        let week_ago = now - Duration::days(7);

        let mut by_endpoint: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut total = 0usize;
        let mut last_24h = 0u64;
        let mut last_7d = 0u64;
        let mut duration_sum = 0u64;

        for a in entries.iter() {
            if let Some(id) = agent_id {
                if a.agent_id.as_deref() != Some(id) {
                    continue;
                }
            }
            total += 1;
            duration_sum += a.duration_ms;
            *by_endpoint.entry(a.endpoint.clone()).or_default() += 1;
            let type_name = serde_json::to_value(a.activity_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "api_call".to_string());
            *by_type.entry(type_name).or_default() += 1;
            if a.timestamp >= day_ago {
                last_24h += 1;
            }
            if a.timestamp >= week_ago {
                last_7d += 1;
            }
        }

        ActivityStats {
            total,
            by_endpoint,
            by_type,
            last_24h,
            last_7d,
            avg_duration_ms: if total == 0 {
                0.0
            } else {
                duration_sum as f64 / total as f64
            },
        }
    }

    /// Drop entries older than the retention window. Returns how many were
    /// removed.
    pub async fn sweep_retention(&self, retention_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut entries = self.inner.write().await;
        let before = entries.len();
        entries.retain(|a| a.timestamp >= cutoff);
        let removed = before - entries.len();
        if removed > 0 {
            if let Err(e) = write_json(&self.path, &*entries) {
                tracing::warn!("failed to persist activity log after sweep: {:#}", e);
            }
            tracing::info!("activity retention sweep removed {} entries", removed);
        }
        removed
    }
}

/// Heuristic substring match against the endpoint path.
fn derive_type(endpoint: &str) -> ActivityType {
    if endpoint.contains("/deposit") {
        ActivityType::Deposit
    } else if endpoint.contains("/withdraw") {
        ActivityType::Withdraw
    } else if endpoint.contains("/borrow") {
        ActivityType::Borrow
    } else if endpoint.contains("/repay") {
        ActivityType::Repay
    } else if endpoint.contains("/swap") {
        ActivityType::Swap
    } else {
        ActivityType::ApiCall
    }
}

/// Recursively replace values under sensitive key names, at any depth.
fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let lowered = k.to_lowercase();
                    if SENSITIVE_KEYS.iter().any(|s| lowered.contains(s)) {
                        (k, Value::String(REDACTED.to_string()))
                    } else {
                        (k, redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}
