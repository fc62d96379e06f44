//! Social verification client.
//!
//! Resolves a tweet by ID or URL and checks its text against the content
//! contract of the registration and claim flows. Fetching goes through an
//! ordered provider chain: the official lookup API (needs a bearer
//! credential, may be absent or rate-limited) first, then the public
//! syndication endpoint as a best-effort fallback. Each provider reports a
//! tri-state outcome and the chain stops at the first fetched tweet or the
//! first definitive failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::TwitterConfig;
use crate::error::ApiError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Hosts recognized when extracting a tweet ID from a URL: canonical
/// domains, the mobile subdomain, and embed-mirror domains.
const TWEET_HOSTS: &[&str] = &[
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
    "x.com",
    "www.x.com",
    "vxtwitter.com",
    "fxtwitter.com",
];

/// Tweet text plus author, normalized across provider response shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetData {
    pub id: String,
    pub text: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

/// Tri-state provider outcome: fetched, definitively failed (stop the
/// chain), or unavailable (try the next provider).
pub enum ProviderResult {
    Fetched(TweetData),
    Failed(ApiError),
    Unavailable(ApiError),
}

#[async_trait]
pub trait TweetProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, tweet_id: &str) -> ProviderResult;
}

/// Official v2 tweet lookup with a bearer credential.
pub struct ApiProvider {
    client: Client,
    base_url: String,
    bearer_token: String,
}

impl ApiProvider {
    pub fn new(base_url: String, bearer_token: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            bearer_token,
        }
    }
}

#[async_trait]
impl TweetProvider for ApiProvider {
    fn name(&self) -> &'static str {
        "twitter-api"
    }

    async fn fetch(&self, tweet_id: &str) -> ProviderResult {
        let url = format!(
            "{}/tweets/{}?expansions=author_id&tweet.fields=text,author_id&user.fields=username",
            self.base_url, tweet_id
        );

        let response = match self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ProviderResult::Unavailable(e.into()),
        };

        match response.status() {
            StatusCode::NOT_FOUND => {
                ProviderResult::Failed(ApiError::NotFound(format!("tweet {tweet_id} not found")))
            }
            StatusCode::UNAUTHORIZED => ProviderResult::Unavailable(ApiError::AuthFailed(
                "twitter api rejected the bearer credential".into(),
            )),
            status if !status.is_success() => {
                let detail = response.text().await.unwrap_or_default();
                ProviderResult::Unavailable(ApiError::Upstream {
                    status: status.as_u16(),
                    detail: truncate(&detail, 200),
                })
            }
            _ => {
                let body: Value = match response.json().await {
                    Ok(v) => v,
                    Err(e) => return ProviderResult::Unavailable(e.into()),
                };
                // `errors` without `data` means the tweet is gone or protected
                if body.get("data").is_none() {
                    return ProviderResult::Failed(ApiError::NotFound(format!(
                        "tweet {tweet_id} not found"
                    )));
                }
                let text = body["data"]["text"].as_str().unwrap_or_default().to_string();
                let author_id = body["data"]["author_id"].as_str().map(str::to_string);
                let user = &body["includes"]["users"][0];
                ProviderResult::Fetched(TweetData {
                    id: tweet_id.to_string(),
                    text,
                    username: user["username"].as_str().unwrap_or_default().to_string(),
                    author_name: user["name"].as_str().map(str::to_string),
                    author_id,
                })
            }
        }
    }
}

/// Public, unauthenticated syndication endpoint. Different response shape,
/// no reliability guarantees.
pub struct SyndicationProvider {
    client: Client,
    base_url: String,
}

impl SyndicationProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
        }
    }
}

#[async_trait]
impl TweetProvider for SyndicationProvider {
    fn name(&self) -> &'static str {
        "syndication"
    }

    async fn fetch(&self, tweet_id: &str) -> ProviderResult {
        let url = format!("{}/tweet-result?id={}&token=a", self.base_url, tweet_id);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return ProviderResult::Unavailable(e.into()),
        };

        match response.status() {
            StatusCode::NOT_FOUND => {
                ProviderResult::Failed(ApiError::NotFound(format!("tweet {tweet_id} not found")))
            }
            status if !status.is_success() => {
                ProviderResult::Unavailable(ApiError::Upstream {
                    status: status.as_u16(),
                    detail: "syndication endpoint error".into(),
                })
            }
            _ => {
                let body: Value = match response.json().await {
                    Ok(v) => v,
                    Err(e) => return ProviderResult::Unavailable(e.into()),
                };
                let text = body["text"].as_str().unwrap_or_default().to_string();
                if text.is_empty() {
                    return ProviderResult::Unavailable(ApiError::Upstream {
                        status: 502,
                        detail: "syndication response missing tweet text".into(),
                    });
                }
                ProviderResult::Fetched(TweetData {
                    id: tweet_id.to_string(),
                    text,
                    username: body["user"]["screen_name"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    author_name: body["user"]["name"].as_str().map(str::to_string),
                    author_id: body["user"]["id_str"].as_str().map(str::to_string),
                })
            }
        }
    }
}

/// Verification client over the provider chain.
pub struct TwitterVerifier {
    providers: Vec<Box<dyn TweetProvider>>,
    product_handle: String,
    /// Accept any tweet without fetching or checking it. Local/debug only.
    manual_mode: bool,
}

impl TwitterVerifier {
    pub fn from_config(cfg: &TwitterConfig) -> Self {
        let mut providers: Vec<Box<dyn TweetProvider>> = Vec::new();
        if let Some(token) = &cfg.bearer_token {
            providers.push(Box::new(ApiProvider::new(cfg.api_url.clone(), token.clone())));
        } else {
            tracing::warn!("TWITTER_BEARER_TOKEN not set; relying on syndication fallback only");
        }
        providers.push(Box::new(SyndicationProvider::new(cfg.syndication_url.clone())));

        if cfg.manual_verification {
            tracing::warn!(
                "MANUAL VERIFICATION ENABLED: tweets are accepted without any content check"
            );
        }

        Self {
            providers,
            product_handle: cfg.product_handle.clone(),
            manual_mode: cfg.manual_verification,
        }
    }

    pub fn new(
        providers: Vec<Box<dyn TweetProvider>>,
        product_handle: String,
        manual_mode: bool,
    ) -> Self {
        Self {
            providers,
            product_handle,
            manual_mode,
        }
    }

    pub fn product_handle(&self) -> &str {
        &self.product_handle
    }

    /// Resolve a tweet through the provider chain. Stops at the first
    /// fetched tweet or the first definitive failure; otherwise returns the
    /// last provider's error.
    pub async fn fetch_tweet(&self, url_or_id: &str) -> Result<TweetData, ApiError> {
        let tweet_id = extract_tweet_id(url_or_id)?;

        if self.manual_mode {
            return Ok(manual_tweet(&tweet_id, url_or_id));
        }

        let mut last_error: Option<ApiError> = None;
        for provider in &self.providers {
            match provider.fetch(&tweet_id).await {
                ProviderResult::Fetched(tweet) => {
                    tracing::debug!("tweet {} resolved via {}", tweet_id, provider.name());
                    return Ok(tweet);
                }
                ProviderResult::Failed(e) => {
                    tracing::debug!("provider {} failed definitively: {}", provider.name(), e);
                    return Err(e);
                }
                ProviderResult::Unavailable(e) => {
                    tracing::warn!("provider {} unavailable: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::Upstream {
            status: 502,
            detail: "no verification provider available".into(),
        }))
    }

    /// Registration contract: the tweet must contain the caller's
    /// verification code and mention the product handle.
    pub async fn verify_registration(
        &self,
        url_or_id: &str,
        code: &str,
    ) -> Result<TweetData, ApiError> {
        let tweet = self.fetch_tweet(url_or_id).await?;
        if self.manual_mode {
            return Ok(tweet);
        }
        if !contains_ignore_case(&tweet.text, code) {
            return Err(ApiError::Validation(
                "tweet does not contain the verification code".into(),
            ));
        }
        if !contains_ignore_case(&tweet.text, &self.product_handle) {
            return Err(ApiError::Validation(format!(
                "tweet must mention {}",
                self.product_handle
            )));
        }
        Ok(tweet)
    }

    /// Claim contract, stricter than registration so an old registration
    /// tweet cannot be replayed to claim a different agent: code, product
    /// handle, the literal "claiming", and the agent's name must all appear.
    pub async fn verify_claim(
        &self,
        url_or_id: &str,
        code: &str,
        agent_name: &str,
    ) -> Result<TweetData, ApiError> {
        let tweet = self.fetch_tweet(url_or_id).await?;
        if self.manual_mode {
            return Ok(tweet);
        }
        if !contains_ignore_case(&tweet.text, code) {
            return Err(ApiError::Validation(
                "tweet does not contain the verification code".into(),
            ));
        }
        if !contains_ignore_case(&tweet.text, &self.product_handle) {
            return Err(ApiError::Validation(format!(
                "tweet must mention {}",
                self.product_handle
            )));
        }
        if !contains_ignore_case(&tweet.text, "claiming") {
            return Err(ApiError::Validation(
                "tweet must say you are claiming the agent".into(),
            ));
        }
        if !contains_ignore_case(&tweet.text, agent_name) {
            return Err(ApiError::Validation(format!(
                "tweet must mention the agent name \"{agent_name}\""
            )));
        }
        Ok(tweet)
    }
}

/// Case-insensitive substring check used for every content requirement.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Extract the numeric tweet ID from a bare ID or any recognized URL shape
/// (`https://<host>/<user>/status/<digits>`, query strings and photo
/// suffixes tolerated).
pub fn extract_tweet_id(url_or_id: &str) -> Result<String, ApiError> {
    let trimmed = url_or_id.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(trimmed.to_string());
    }

    let parsed = Url::parse(trimmed)
        .map_err(|_| ApiError::InvalidUrl(trimmed.to_string()))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| ApiError::InvalidUrl(trimmed.to_string()))?;
    if !TWEET_HOSTS.contains(&host) {
        return Err(ApiError::InvalidUrl(trimmed.to_string()));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    let id = segments
        .iter()
        .position(|s| *s == "status" || *s == "statuses")
        .and_then(|i| segments.get(i + 1))
        .map(|s| s.chars().take_while(|c| c.is_ascii_digit()).collect::<String>())
        .filter(|s| !s.is_empty());

    id.ok_or_else(|| ApiError::InvalidUrl(trimmed.to_string()))
}

/// Best-effort author handle from the URL path (`/{user}/status/{id}`),
/// used only in manual mode where no tweet is actually fetched.
fn manual_tweet(tweet_id: &str, url_or_id: &str) -> TweetData {
    let username = Url::parse(url_or_id)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next().map(str::to_string))
        })
        .filter(|s| !s.is_empty() && s.as_str() != "status")
        .unwrap_or_else(|| "manual".to_string());

    TweetData {
        id: tweet_id.to_string(),
        text: "[manual verification enabled]".to_string(),
        username,
        author_name: None,
        author_id: None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct StaticProvider(TweetData);

    #[async_trait]
    impl TweetProvider for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }
        async fn fetch(&self, _tweet_id: &str) -> ProviderResult {
            ProviderResult::Fetched(self.0.clone())
        }
    }

    struct DownProvider;

    #[async_trait]
    impl TweetProvider for DownProvider {
        fn name(&self) -> &'static str {
            "down"
        }
        async fn fetch(&self, _tweet_id: &str) -> ProviderResult {
            ProviderResult::Unavailable(ApiError::Upstream {
                status: 503,
                detail: "down".into(),
            })
        }
    }

    struct GoneProvider;

    #[async_trait]
    impl TweetProvider for GoneProvider {
        fn name(&self) -> &'static str {
            "gone"
        }
        async fn fetch(&self, tweet_id: &str) -> ProviderResult {
            ProviderResult::Failed(ApiError::NotFound(format!("tweet {tweet_id} not found")))
        }
    }

    fn tweet(text: &str) -> TweetData {
        TweetData {
            id: "123".into(),
            text: text.into(),
            username: "nova_bot".into(),
            author_name: Some("Nova".into()),
            author_id: Some("42".into()),
        }
    }

    fn verifier(providers: Vec<Box<dyn TweetProvider>>) -> TwitterVerifier {
        TwitterVerifier::new(providers, "@solskill".into(), false)
    }

    #[test]
    fn extracts_bare_numeric_id() {
        assert_eq!(extract_tweet_id("1893021").unwrap(), "1893021");
        assert_eq!(extract_tweet_id("  1893021 ").unwrap(), "1893021");
    }

    #[test]
    fn extracts_id_from_known_url_shapes() {
        for url in [
            "https://twitter.com/nova/status/12345",
            "https://x.com/nova/status/12345",
            "https://mobile.twitter.com/nova/status/12345",
            "https://vxtwitter.com/nova/status/12345",
            "https://fxtwitter.com/nova/status/12345?s=20",
            "https://x.com/nova/statuses/12345/photo/1",
        ] {
            assert_eq!(extract_tweet_id(url).unwrap(), "12345", "failed for {url}");
        }
    }

    #[test]
    fn rejects_unknown_hosts_and_shapes() {
        for bad in [
            "https://example.com/nova/status/12345",
            "https://x.com/nova",
            "not a url",
            "",
            "12a45",
        ] {
            assert!(
                matches!(extract_tweet_id(bad), Err(ApiError::InvalidUrl(_))),
                "expected InvalidUrl for {bad:?}"
            );
        }
    }

    #[test]
    fn code_check_is_case_insensitive() {
        assert!(contains_ignore_case("Verifying with abc123!", "ABC123"));
        assert!(!contains_ignore_case("Verifying with abc12", "ABC123"));
    }

    #[tokio::test]
    async fn chain_falls_through_unavailable_providers() {
        let v = verifier(vec![
            Box::new(DownProvider),
            Box::new(StaticProvider(tweet("hello @solskill SKILL-AA"))),
        ]);
        let t = v.fetch_tweet("123").await.unwrap();
        assert_eq!(t.username, "nova_bot");
    }

    #[tokio::test]
    async fn chain_stops_at_definitive_failure() {
        let v = verifier(vec![
            Box::new(GoneProvider),
            Box::new(StaticProvider(tweet("should never be reached"))),
        ]);
        let err = v.fetch_tweet("123").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn exhausted_chain_returns_last_error() {
        let v = verifier(vec![Box::new(DownProvider), Box::new(DownProvider)]);
        let err = v.fetch_tweet("123").await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn registration_requires_code_and_mention() {
        let v = verifier(vec![Box::new(StaticProvider(tweet(
            "Registering my agent with skill-aa11 via @SolSkill",
        )))]);
        v.verify_registration("123", "SKILL-AA11").await.unwrap();

        let v = verifier(vec![Box::new(StaticProvider(tweet(
            "Registering with SKILL-AA11 but no mention",
        )))]);
        let err = v.verify_registration("123", "SKILL-AA11").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let v = verifier(vec![Box::new(StaticProvider(tweet("@solskill but no code")))]);
        let err = v.verify_registration("123", "SKILL-AA11").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn claim_requires_claiming_and_agent_name() {
        let good = "Claiming my agent Nova on @solskill with code SKILL-BB22";
        let v = verifier(vec![Box::new(StaticProvider(tweet(good)))]);
        v.verify_claim("123", "SKILL-BB22", "Nova").await.unwrap();

        let missing_claiming = "My agent Nova on @solskill with code SKILL-BB22";
        let v = verifier(vec![Box::new(StaticProvider(tweet(missing_claiming)))]);
        let err = v.verify_claim("123", "SKILL-BB22", "Nova").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let missing_name = "Claiming my agent on @solskill with code SKILL-BB22";
        let v = verifier(vec![Box::new(StaticProvider(tweet(missing_name)))]);
        let err = v.verify_claim("123", "SKILL-BB22", "Nova").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn manual_mode_accepts_anything_and_reads_handle_from_url() {
        let v = TwitterVerifier::new(vec![], "@solskill".into(), true);
        let t = v
            .verify_claim("https://x.com/nova_bot/status/999", "whatever", "Nova")
            .await
            .unwrap();
        assert_eq!(t.username, "nova_bot");
        assert_eq!(t.id, "999");
    }
}
