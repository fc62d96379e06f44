//! Persisted record types for the agent and activity stores.
//!
//! All wire and on-disk JSON is camelCase. The raw API key only ever leaves
//! the process once, in the registration response; every later read goes
//! through [`Agent::public`] which masks it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of an agent record.
///
/// Transitions are one-directional: `PendingClaim -> Claimed` (terminal) on
/// the claim path, `Pending -> Active` on the direct path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    PendingClaim,
    Claimed,
    Active,
}

/// An API-key-holding identity bound to one Twitter/X handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Primary store key, format `solskill_<48 hex>`. Never regenerable.
    pub api_key: String,
    /// Payment address; empty until claimed.
    #[serde(default)]
    pub wallet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_url: Option<String>,
    pub verified: bool,
    pub status: AgentStatus,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Public, shareable token identifying a pre-created agent (claim path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_code: Option<String>,
    /// Must appear verbatim in the claim tweet. Single-use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by_twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by_twitter_id: Option<String>,
}

impl Agent {
    /// Redacted view safe to return from any read endpoint.
    pub fn public(&self) -> AgentPublic {
        AgentPublic {
            id: self.id.clone(),
            name: self.name.clone(),
            api_key: mask_api_key(&self.api_key),
            wallet: self.wallet.clone(),
            twitter_username: self.twitter_username.clone(),
            tweet_url: self.tweet_url.clone(),
            verified: self.verified,
            status: self.status,
            request_count: self.request_count,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            verified_at: self.verified_at,
            claimed_at: self.claimed_at,
            claimed_by_twitter: self.claimed_by_twitter.clone(),
        }
    }
}

/// Agent as exposed by read endpoints: the key is masked, claim secrets
/// are absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPublic {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub wallet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweet_url: Option<String>,
    pub verified: bool,
    pub status: AgentStatus,
    pub request_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by_twitter: Option<String>,
}

/// Mask an API key down to its prefix and last four characters.
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= 14 || !key.is_ascii() {
        return "solskill_…".to_string();
    }
    format!("{}…{}", &key[..9], &key[key.len() - 4..])
}

/// Category of a logged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ApiCall,
    Deposit,
    Withdraw,
    Borrow,
    Repay,
    Swap,
    Registration,
    Claim,
    Error,
}

/// One immutable request/response log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_serializes_camel_case() {
        let agent = Agent {
            id: "a1".into(),
            name: "Nova".into(),
            api_key: "solskill_00".into(),
            wallet: String::new(),
            twitter_username: Some("nova_bot".into()),
            tweet_id: None,
            tweet_url: None,
            verified: true,
            status: AgentStatus::Active,
            request_count: 3,
            last_used_at: None,
            claim_code: None,
            verification_code: None,
            created_at: Utc::now(),
            verified_at: None,
            claimed_at: None,
            claimed_by_twitter: None,
            claimed_by_twitter_id: None,
        };
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["apiKey"], "solskill_00");
        assert_eq!(json["twitterUsername"], "nova_bot");
        assert_eq!(json["requestCount"], 3);
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn public_view_masks_key() {
        let key = format!("solskill_{}", "ab".repeat(24));
        let masked = mask_api_key(&key);
        assert!(masked.starts_with("solskill_"));
        assert!(!masked.contains(&"ab".repeat(24)));
        assert!(masked.ends_with("abab"));
    }

    #[test]
    fn short_key_masks_fully() {
        assert_eq!(mask_api_key("solskill_x"), "solskill_…");
    }
}
