//! Activity log routes. Bearer-authenticated; every caller only ever sees
//! its own records, already masked and redacted at write time.

use axum::extract::{Query, State};
use axum::response::Json as ResponseJson;
use axum::routing::get;
use axum::{Extension, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthAgent;
use crate::error::ApiResult;
use crate::server::AppState;
use crate::store::activity::ActivityQuery;
use crate::store::models::ActivityType;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitiesParams {
    pub stats: Option<bool>,
    #[serde(rename = "type")]
    pub activity_type: Option<ActivityType>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /activities, the caller's own log, or `?stats=true` for aggregates.
pub async fn list_activities(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAgent>,
    Query(params): Query<ActivitiesParams>,
) -> ApiResult<ResponseJson<Value>> {
    if params.stats.unwrap_or(false) {
        let stats = state.activity.stats(Some(&auth.id)).await;
        return Ok(ResponseJson(json!({ "success": true, "stats": stats })));
    }

    // Ownership is pinned to the caller's agent id; the rest pass through.
    // Masked keys can collide across agents, so they are display-only.
    let query = ActivityQuery {
        activity_type: params.activity_type,
        agent_id: Some(auth.id.clone()),
        endpoint: params.endpoint,
        method: params.method,
        from: params.from,
        to: params.to,
        status_min: params.status_min,
        status_max: params.status_max,
        offset: params.offset,
        limit: params.limit,
    };
    let page = state.activity.query(&query).await;

    Ok(ResponseJson(json!({
        "success": true,
        "activities": page.activities,
        "total": page.total,
        "offset": page.offset,
        "limit": page.limit,
    })))
}

/// Create activity routes (auth layered on in `server`)
pub fn create_routes() -> Router<AppState> {
    Router::new().route("/activities", get(list_activities))
}
