//! File-backed credential store for agent records.
//!
//! Agents live in one JSON document keyed by API key, with a second
//! claims-by-code document acting as a secondary index for the claim flow.
//! Both are held fully in memory behind a single `RwLock` and written back
//! wholesale on every mutation via temp-file + rename, so a crash never
//! leaves a half-written document.
//!
//! Uniqueness checks ("one verified agent per handle", "claim once") run
//! inside the write lock, which closes the reference implementation's
//! check-then-act race within a process. Across processes the file is still
//! last-writer-wins; single-process deployment is assumed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::store::models::{Agent, AgentStatus};

pub const API_KEY_PREFIX: &str = "solskill_";

const AGENTS_FILE: &str = "agents.json";
const CLAIMS_FILE: &str = "claims.json";

struct Inner {
    /// api_key -> agent
    agents: HashMap<String, Agent>,
    /// claim_code -> api_key
    claims: HashMap<String, String>,
}

pub struct AgentStore {
    agents_path: PathBuf,
    claims_path: PathBuf,
    inner: RwLock<Inner>,
}

impl AgentStore {
    /// Open (or create) the store under the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let agents_path = data_dir.join(AGENTS_FILE);
        let claims_path = data_dir.join(CLAIMS_FILE);

        let agents = load_json(&agents_path)?.unwrap_or_default();
        let claims = load_json(&claims_path)?.unwrap_or_default();

        Ok(Self {
            agents_path,
            claims_path,
            inner: RwLock::new(Inner { agents, claims }),
        })
    }

    /// Insert a new agent. Fails if the key is already present, which the
    /// 24-byte key entropy makes effectively unreachable.
    pub async fn create(&self, agent: Agent) -> Result<Agent, ApiError> {
        let mut inner = self.inner.write().await;
        if inner.agents.contains_key(&agent.api_key) {
            return Err(ApiError::Conflict("api key already exists".into()));
        }
        if let Some(code) = &agent.claim_code {
            inner.claims.insert(code.clone(), agent.api_key.clone());
        }
        inner.agents.insert(agent.api_key.clone(), agent.clone());
        self.persist(&inner)?;
        Ok(agent)
    }

    /// Insert a freshly verified agent, enforcing at most one verified agent
    /// per Twitter handle. The check and the insert share one critical
    /// section.
    pub async fn insert_verified(&self, agent: Agent) -> Result<Agent, ApiError> {
        let handle = agent
            .twitter_username
            .as_deref()
            .ok_or_else(|| ApiError::Validation("verified agent requires a handle".into()))?
            .to_lowercase();

        let mut inner = self.inner.write().await;
        let taken = inner.agents.values().any(|a| {
            a.verified
                && a.twitter_username
                    .as_deref()
                    .is_some_and(|h| h.to_lowercase() == handle)
        });
        if taken {
            return Err(ApiError::Conflict(format!(
                "an agent is already registered for @{handle}"
            )));
        }
        if inner.agents.contains_key(&agent.api_key) {
            return Err(ApiError::Conflict("api key already exists".into()));
        }
        inner.agents.insert(agent.api_key.clone(), agent.clone());
        self.persist(&inner)?;
        Ok(agent)
    }

    pub async fn get_by_api_key(&self, key: &str) -> Option<Agent> {
        self.inner.read().await.agents.get(key).cloned()
    }

    /// Case-insensitive exact match scan over stored handles.
    pub async fn get_by_twitter_handle(&self, handle: &str) -> Option<Agent> {
        let wanted = handle.trim_start_matches('@').to_lowercase();
        self.inner
            .read()
            .await
            .agents
            .values()
            .find(|a| {
                a.twitter_username
                    .as_deref()
                    .is_some_and(|h| h.to_lowercase() == wanted)
            })
            .cloned()
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Agent> {
        self.inner
            .read()
            .await
            .agents
            .values()
            .find(|a| a.id == id)
            .cloned()
    }

    pub async fn get_by_claim_code(&self, code: &str) -> Option<Agent> {
        let inner = self.inner.read().await;
        let key = inner.claims.get(code)?;
        inner.agents.get(key).cloned()
    }

    /// Merge-patch an agent via closure; last-writer-wins.
    pub async fn update<F>(&self, key: &str, patch: F) -> Result<Option<Agent>, ApiError>
    where
        F: FnOnce(&mut Agent),
    {
        let mut inner = self.inner.write().await;
        let Some(agent) = inner.agents.get_mut(key) else {
            return Ok(None);
        };
        patch(agent);
        let updated = agent.clone();
        self.persist(&inner)?;
        Ok(Some(updated))
    }

    /// True iff the key carries the required prefix, a record exists, and
    /// the agent is verified.
    pub async fn validate(&self, key: &str) -> bool {
        if !key.starts_with(API_KEY_PREFIX) {
            return false;
        }
        self.inner
            .read()
            .await
            .agents
            .get(key)
            .is_some_and(|a| a.verified)
    }

    /// Best-effort usage telemetry; a persist failure is logged, not
    /// surfaced, so it never fails the request it rode in on.
    pub async fn increment_usage(&self, key: &str) {
        let mut inner = self.inner.write().await;
        let Some(agent) = inner.agents.get_mut(key) else {
            return;
        };
        agent.request_count += 1;
        agent.last_used_at = Some(Utc::now());
        if let Err(e) = self.persist(&inner) {
            tracing::warn!("failed to persist usage counters: {:#}", e);
        }
    }

    /// One-way `pending_claim -> claimed` transition, guarded against double
    /// submission: a second call for the same code gets `Conflict` and the
    /// original `claimedAt` stays untouched.
    pub async fn claim(
        &self,
        code: &str,
        handle: &str,
        twitter_user_id: Option<String>,
        tweet_id: String,
        tweet_url: String,
        wallet: Option<String>,
    ) -> Result<Agent, ApiError> {
        let mut inner = self.inner.write().await;
        let key = inner
            .claims
            .get(code)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("unknown claim code {code}")))?;
        let agent = inner
            .agents
            .get_mut(&key)
            .ok_or_else(|| ApiError::NotFound("agent record missing for claim code".into()))?;

        if agent.status == AgentStatus::Claimed {
            return Err(ApiError::Conflict("agent already claimed".into()));
        }

        let now = Utc::now();
        agent.status = AgentStatus::Claimed;
        agent.verified = true;
        agent.verified_at = Some(now);
        agent.claimed_at = Some(now);
        agent.twitter_username = Some(handle.trim_start_matches('@').to_string());
        agent.claimed_by_twitter = agent.twitter_username.clone();
        agent.claimed_by_twitter_id = twitter_user_id;
        agent.tweet_id = Some(tweet_id);
        agent.tweet_url = Some(tweet_url);
        agent.verification_code = None;
        if let Some(wallet) = wallet {
            agent.wallet = wallet;
        }

        let claimed = agent.clone();
        self.persist(&inner)?;
        Ok(claimed)
    }

    /// Number of stored agents (diagnostics).
    pub async fn len(&self) -> usize {
        self.inner.read().await.agents.len()
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        write_json(&self.agents_path, &inner.agents)?;
        write_json(&self.claims_path, &inner.claims)?;
        Ok(())
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Atomic whole-document replace: write a sibling temp file, then rename
/// over the target.
pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let raw = serde_json::to_vec_pretty(value).context("failed to serialize document")?;
    fs::write(&tmp, raw).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::AgentStatus;
    use pretty_assertions::assert_eq;

    fn agent(key: &str, handle: Option<&str>, verified: bool) -> Agent {
        Agent {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Test Agent".into(),
            api_key: key.to_string(),
            wallet: String::new(),
            twitter_username: handle.map(|h| h.to_string()),
            tweet_id: None,
            tweet_url: None,
            verified,
            status: if verified { AgentStatus::Active } else { AgentStatus::Pending },
            request_count: 0,
            last_used_at: None,
            claim_code: None,
            verification_code: None,
            created_at: Utc::now(),
            verified_at: None,
            claimed_at: None,
            claimed_by_twitter: None,
            claimed_by_twitter_id: None,
        }
    }

    fn store() -> (tempfile::TempDir, AgentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn lookup_is_idempotent() {
        let (_dir, store) = store();
        store
            .create(agent("solskill_aa", Some("nova"), true))
            .await
            .unwrap();
        let first = store.get_by_api_key("solskill_aa").await.unwrap();
        let second = store.get_by_api_key("solskill_aa").await.unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn handle_lookup_is_case_insensitive() {
        let (_dir, store) = store();
        store
            .create(agent("solskill_aa", Some("NovaBot"), true))
            .await
            .unwrap();
        assert!(store.get_by_twitter_handle("novabot").await.is_some());
        assert!(store.get_by_twitter_handle("@NOVABOT").await.is_some());
        assert!(store.get_by_twitter_handle("other").await.is_none());
    }

    #[tokio::test]
    async fn insert_verified_rejects_duplicate_handle() {
        let (_dir, store) = store();
        store
            .insert_verified(agent("solskill_aa", Some("nova"), true))
            .await
            .unwrap();
        let err = store
            .insert_verified(agent("solskill_bb", Some("Nova"), true))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unverified_agent_does_not_block_handle() {
        let (_dir, store) = store();
        store
            .create(agent("solskill_aa", Some("nova"), false))
            .await
            .unwrap();
        store
            .insert_verified(agent("solskill_bb", Some("nova"), true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn validate_requires_prefix_and_verified() {
        let (_dir, store) = store();
        store
            .create(agent("solskill_aa", Some("nova"), true))
            .await
            .unwrap();
        store
            .create(agent("solskill_bb", Some("beta"), false))
            .await
            .unwrap();
        assert!(store.validate("solskill_aa").await);
        assert!(!store.validate("solskill_bb").await);
        assert!(!store.validate("sk_wrongprefix").await);
        assert!(!store.validate("solskill_missing").await);
    }

    #[tokio::test]
    async fn claim_is_single_use() {
        let (_dir, store) = store();
        let mut a = agent("solskill_aa", None, false);
        a.status = AgentStatus::PendingClaim;
        a.claim_code = Some("abc123".into());
        a.verification_code = Some("VFY-1".into());
        store.create(a).await.unwrap();

        let claimed = store
            .claim(
                "abc123",
                "nova",
                Some("42".into()),
                "111".into(),
                "https://x.com/nova/status/111".into(),
                Some("So1WalletAddr".into()),
            )
            .await
            .unwrap();
        assert_eq!(claimed.status, AgentStatus::Claimed);
        assert_eq!(claimed.claimed_by_twitter.as_deref(), Some("nova"));
        assert_eq!(claimed.wallet, "So1WalletAddr");
        let first_claimed_at = claimed.claimed_at;

        let err = store
            .claim("abc123", "other", None, "222".into(), "u".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let unchanged = store.get_by_claim_code("abc123").await.unwrap();
        assert_eq!(unchanged.claimed_at, first_claimed_at);
        assert_eq!(unchanged.claimed_by_twitter.as_deref(), Some("nova"));
    }

    #[tokio::test]
    async fn claim_unknown_code_is_not_found() {
        let (_dir, store) = store();
        let err = store
            .claim("nope", "nova", None, "1".into(), "u".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = AgentStore::open(dir.path()).unwrap();
            let mut a = agent("solskill_aa", Some("nova"), true);
            a.claim_code = Some("code1".into());
            store.create(a).await.unwrap();
            store.increment_usage("solskill_aa").await;
        }
        let reopened = AgentStore::open(dir.path()).unwrap();
        let loaded = reopened.get_by_api_key("solskill_aa").await.unwrap();
        assert_eq!(loaded.request_count, 1);
        assert!(loaded.last_used_at.is_some());
        assert!(reopened.get_by_claim_code("code1").await.is_some());
    }

    #[tokio::test]
    async fn update_merges_patch() {
        let (_dir, store) = store();
        store
            .create(agent("solskill_aa", Some("nova"), true))
            .await
            .unwrap();
        let updated = store
            .update("solskill_aa", |a| a.wallet = "So1anaAddr".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.wallet, "So1anaAddr");
        assert!(store.update("missing", |_| {}).await.unwrap().is_none());
    }
}
