//! Authenticated caller identity injected by the auth middleware.

use serde::Serialize;

/// Placed in request extensions once the Bearer API key checks out.
/// Deliberately carries the agent identity only, never the key itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAgent {
    pub id: String,
    pub name: String,
}
