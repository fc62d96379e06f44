//! Claim-code flow: a pre-created agent is handed to its eventual owner as
//! a public claim code; posting the verification tweet completes a one-way
//! `pending_claim -> claimed` transition.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json as ResponseJson, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::routes::client_ip;
use crate::server::AppState;
use crate::store::activity::NewActivity;
use crate::store::models::{ActivityType, AgentStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVerifyRequest {
    pub tweet_url: String,
    /// Payment address to bind at claim time; optional.
    pub wallet: Option<String>,
}

/// GET /claim/{code}/info, unauthenticated claim instructions, or a 409
/// "already claimed" payload naming who claimed it and when.
pub async fn claim_info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Response> {
    let agent = state
        .agents
        .get_by_claim_code(&code)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("unknown claim code {code}")))?;

    if agent.status == AgentStatus::Claimed {
        return Ok((
            StatusCode::CONFLICT,
            ResponseJson(json!({
                "success": false,
                "error": "agent already claimed",
                "agentName": agent.name,
                "claimedByTwitter": agent.claimed_by_twitter,
                "claimedAt": agent.claimed_at,
            })),
        )
            .into_response());
    }

    let handle = state.verifier.product_handle();
    let verification_code = agent.verification_code.clone().unwrap_or_default();
    Ok(ResponseJson(json!({
        "success": true,
        "agentName": agent.name,
        "status": agent.status,
        "instructions": {
            "steps": [
                format!("Post the tweet below from the account that will own \"{}\".", agent.name),
                "POST the tweet URL to /claim/{code}/verify-tweet.",
            ],
            "tweetTemplate": format!(
                "Claiming my agent {} on {handle} with code {verification_code}",
                agent.name
            ),
        },
    }))
    .into_response())
}

/// POST /claim/{code}/verify-tweet, claim completion.
///
/// Verification must fully succeed before the store is touched; the
/// transition itself is guarded in the store, so a double submission gets
/// `Conflict` without disturbing `claimedAt`.
pub async fn claim_verify_tweet(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ClaimVerifyRequest>,
) -> ApiResult<ResponseJson<Value>> {
    let started = Instant::now();

    let agent = state
        .agents
        .get_by_claim_code(&code)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("unknown claim code {code}")))?;

    if agent.status == AgentStatus::Claimed {
        return Err(ApiError::Conflict("agent already claimed".into()));
    }

    let verification_code = agent
        .verification_code
        .clone()
        .ok_or_else(|| ApiError::Conflict("claim code is no longer usable".into()))?;

    let tweet = state
        .verifier
        .verify_claim(&request.tweet_url, &verification_code, &agent.name)
        .await?;

    let claimed = state
        .agents
        .claim(
            &code,
            &tweet.username,
            tweet.author_id.clone(),
            tweet.id.clone(),
            request.tweet_url.clone(),
            request.wallet.clone(),
        )
        .await?;

    info!("agent {} claimed by @{}", claimed.id, tweet.username);
    state
        .activity
        .log(NewActivity {
            activity_type: Some(ActivityType::Claim),
            api_key: Some(claimed.api_key.clone()),
            agent_id: Some(claimed.id.clone()),
            endpoint: format!("/claim/{code}/verify-tweet"),
            method: "POST".into(),
            status: 200,
            duration_ms: started.elapsed().as_millis() as u64,
            metadata: Some(json!({ "claimedByTwitter": tweet.username })),
            ip: Some(client_ip(&headers, peer)),
            ..Default::default()
        })
        .await;

    Ok(ResponseJson(json!({
        "success": true,
        "agent": claimed.public(),
        "message": format!("Agent \"{}\" claimed by @{}", claimed.name, tweet.username),
    })))
}

/// Create claim routes
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/claim/{code}/info", get(claim_info))
        .route("/claim/{code}/verify-tweet", post(claim_verify_tweet))
}
