//! Agent registration routes: direct registration with immediate tweet
//! verification, status lookup, the dry-run verification flow, and the
//! pre-creation step of the claim flow.
//!
//! Ordering inside each orchestrator is fixed: rate limit first, then input
//! validation, then tweet verification, and only after verification fully
//! succeeds does the store get touched. Nothing is ever partially persisted.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::Json as ResponseJson;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::{generate_api_key, generate_claim_code, generate_verification_code};
use crate::error::{ApiError, ApiResult};
use crate::routes::{client_ip, enforce_rate_limit};
use crate::server::AppState;
use crate::services::twitter::contains_ignore_case;
use crate::store::activity::NewActivity;
use crate::store::models::{Agent, AgentStatus, ActivityType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub tweet_url: String,
    pub verification_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTweetRequest {
    pub tweet_url: String,
    pub verification_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub api_key: Option<String>,
}

fn validate_name(name: &str) -> ApiResult<String> {
    let trimmed = name.trim();
    if trimmed.len() < 2 || trimmed.len() > 100 {
        return Err(ApiError::Validation(
            "agent name must be between 2 and 100 characters".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// POST /agents/register, direct registration.
///
/// The raw API key appears in this response and nowhere else, ever.
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<ResponseJson<Value>> {
    let started = Instant::now();
    enforce_rate_limit(&state, &headers, peer)?;

    let name = validate_name(&request.name)?;
    if request.verification_code.trim().is_empty() {
        return Err(ApiError::Validation("verification code is required".into()));
    }
    if request.tweet_url.trim().is_empty() {
        return Err(ApiError::Validation("tweet URL is required".into()));
    }

    let tweet = state
        .verifier
        .verify_registration(&request.tweet_url, &request.verification_code)
        .await?;

    let now = Utc::now();
    let api_key = generate_api_key();
    let agent = Agent {
        id: Uuid::new_v4().to_string(),
        name: name.clone(),
        api_key: api_key.clone(),
        wallet: String::new(),
        twitter_username: Some(tweet.username.clone()),
        tweet_id: Some(tweet.id.clone()),
        tweet_url: Some(request.tweet_url.clone()),
        verified: true,
        status: AgentStatus::Active,
        request_count: 0,
        last_used_at: None,
        claim_code: None,
        verification_code: None,
        created_at: now,
        verified_at: Some(now),
        claimed_at: None,
        claimed_by_twitter: None,
        claimed_by_twitter_id: None,
    };

    // Handle-uniqueness is enforced inside this call, under the store's
    // write lock.
    let agent = state.agents.insert_verified(agent).await?;

    info!("registered agent {} for @{}", agent.id, tweet.username);
    state
        .activity
        .log(NewActivity {
            activity_type: Some(ActivityType::Registration),
            api_key: Some(api_key.clone()),
            agent_id: Some(agent.id.clone()),
            endpoint: "/agents/register".into(),
            method: "POST".into(),
            status: 200,
            duration_ms: started.elapsed().as_millis() as u64,
            metadata: Some(json!({ "twitterUsername": tweet.username })),
            ip: Some(client_ip(&headers, peer)),
            ..Default::default()
        })
        .await;

    Ok(ResponseJson(json!({
        "success": true,
        "agent": agent.public(),
        "apiKey": api_key,
        "message": "Store this API key now. It cannot be shown or regenerated again.",
    })))
}

/// GET /agents/register?apiKey= status lookup. The key itself is the
/// credential; the response only ever carries the masked form.
pub async fn register_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<ResponseJson<Value>> {
    let key = query
        .api_key
        .ok_or_else(|| ApiError::Validation("apiKey query parameter is required".into()))?;
    let agent = state
        .agents
        .get_by_api_key(&key)
        .await
        .ok_or_else(|| ApiError::NotFound("no agent for that API key".into()))?;

    Ok(ResponseJson(json!({
        "success": true,
        "agent": agent.public(),
    })))
}

/// GET /agents/verify, registration instructions for UI rendering.
pub async fn verify_instructions(State(state): State<AppState>) -> ResponseJson<Value> {
    let handle = state.verifier.product_handle().to_string();
    ResponseJson(json!({
        "success": true,
        "instructions": {
            "steps": [
                "Pick a verification code (any short string).",
                format!("Post a tweet mentioning {handle} that contains your code."),
                "POST /agents/register with your agent name, the tweet URL, and the code.",
            ],
            "tweetTemplate": format!(
                "Registering my agent on {handle} with code <YOUR-CODE>"
            ),
            "requiredFields": ["name", "tweetUrl", "verificationCode"],
        },
    }))
}

/// POST /agents/verify, dry-run verification: resolves the tweet and
/// reports whether it contains the code, persisting nothing.
pub async fn verify_tweet(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<VerifyTweetRequest>,
) -> ApiResult<ResponseJson<Value>> {
    enforce_rate_limit(&state, &headers, peer)?;

    if request.verification_code.trim().is_empty() {
        return Err(ApiError::Validation("verification code is required".into()));
    }

    let tweet = state.verifier.fetch_tweet(&request.tweet_url).await?;
    let contains_code = contains_ignore_case(&tweet.text, &request.verification_code);

    Ok(ResponseJson(json!({
        "success": contains_code,
        "containsCode": contains_code,
        "tweet": tweet,
    })))
}

/// POST /agents/create, pre-creation of a claimable agent.
///
/// Produces a `pending_claim` record with a public claim code and a secret
/// verification code, for handing off to whoever will claim it.
pub async fn create_claimable(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<CreateAgentRequest>,
) -> ApiResult<ResponseJson<Value>> {
    let started = Instant::now();
    enforce_rate_limit(&state, &headers, peer)?;

    let name = validate_name(&request.name)?;
    let api_key = generate_api_key();
    let claim_code = generate_claim_code();
    let verification_code = generate_verification_code();

    let agent = Agent {
        id: Uuid::new_v4().to_string(),
        name: name.clone(),
        api_key: api_key.clone(),
        wallet: String::new(),
        twitter_username: None,
        tweet_id: None,
        tweet_url: None,
        verified: false,
        status: AgentStatus::PendingClaim,
        request_count: 0,
        last_used_at: None,
        claim_code: Some(claim_code.clone()),
        verification_code: Some(verification_code.clone()),
        created_at: Utc::now(),
        verified_at: None,
        claimed_at: None,
        claimed_by_twitter: None,
        claimed_by_twitter_id: None,
    };

    let agent = state.agents.create(agent).await?;

    info!("pre-created claimable agent {} ({})", agent.id, claim_code);
    state
        .activity
        .log(NewActivity {
            activity_type: Some(ActivityType::Registration),
            api_key: Some(api_key.clone()),
            agent_id: Some(agent.id.clone()),
            endpoint: "/agents/create".into(),
            method: "POST".into(),
            status: 200,
            duration_ms: started.elapsed().as_millis() as u64,
            ip: Some(client_ip(&headers, peer)),
            ..Default::default()
        })
        .await;

    let handle = state.verifier.product_handle();
    Ok(ResponseJson(json!({
        "success": true,
        "agent": agent.public(),
        "apiKey": api_key,
        "claimCode": claim_code,
        "verificationCode": verification_code,
        "claimUrl": format!("/claim/{claim_code}/info"),
        "tweetTemplate": format!(
            "Claiming my agent {name} on {handle} with code {verification_code}"
        ),
        "message": "Store this API key now. It cannot be shown or regenerated again.",
    })))
}

/// Create agent routes
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/agents/register", post(register).get(register_status))
        .route("/agents/verify", post(verify_tweet).get(verify_instructions))
        .route("/agents/create", post(create_claimable))
}
