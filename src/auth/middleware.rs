//! Authentication Middleware
//!
//! Axum middleware validating Bearer API keys against the credential store
//! and injecting the caller's identity for downstream handlers.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::models::AuthAgent;
use crate::error::ApiError;
use crate::server::AppState;

pub struct ApiKeyAuth;

impl ApiKeyAuth {
    /// Require a valid `Authorization: Bearer solskill_...` header.
    ///
    /// A key passes iff it carries the required prefix, a record exists, and
    /// the agent is verified. Usage counters are bumped on every accepted
    /// call (best-effort telemetry).
    pub async fn validate_key(
        State(state): State<AppState>,
        mut req: Request,
        next: Next,
    ) -> Result<Response, ApiError> {
        let key = extract_bearer(&req)
            .ok_or_else(|| ApiError::AuthFailed("missing Bearer API key".into()))?;

        if !state.agents.validate(&key).await {
            tracing::warn!("rejected request with invalid API key on {}", req.uri().path());
            return Err(ApiError::AuthFailed("invalid or unverified API key".into()));
        }

        // validate() just confirmed the record exists
        let agent = state
            .agents
            .get_by_api_key(&key)
            .await
            .ok_or_else(|| ApiError::AuthFailed("invalid or unverified API key".into()))?;

        state.agents.increment_usage(&key).await;

        req.extensions_mut().insert(AuthAgent {
            id: agent.id,
            name: agent.name,
        });

        Ok(next.run(req).await)
    }
}

fn extract_bearer(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
