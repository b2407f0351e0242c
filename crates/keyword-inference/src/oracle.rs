//! LLM-backed relationship oracle.
//!
//! Sends the new keywords plus a bounded slice of the existing ones to a
//! chat endpoint and asks for a JSON list of relationships. Both
//! OpenAI-compatible and Anthropic endpoints are supported.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use keyword_topology::{RelationshipOracle, TopologyError};
use keyword_types::{
    InferenceSettings, RelationshipKind, RelationshipProposal, DEFAULT_RELATIONSHIP_WEIGHT,
};

use crate::error::InferenceError;
use crate::retry::{retry, RetryPolicy};

/// Smallest weight a proposal may carry.
pub const MIN_PROPOSAL_WEIGHT: f64 = 0.01;

/// Which wire format the endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(InferenceError::Config(format!(
                "unknown inference provider: {other}"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Configuration for [`LlmRelationshipOracle`].
#[derive(Debug, Clone)]
pub struct LlmOracleConfig {
    pub provider: Provider,
    /// API base URL without trailing slash
    pub base_url: String,
    pub model: String,
    pub api_key: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Existing keywords sent as context
    pub max_existing_keywords: usize,
}

impl LlmOracleConfig {
    /// Config for an OpenAI-compatible endpoint.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::for_provider(Provider::OpenAi, api_key, model)
    }

    /// Config for the Anthropic messages endpoint.
    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::for_provider(Provider::Anthropic, api_key, model)
    }

    fn for_provider(
        provider: Provider,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            max_existing_keywords: 50,
        }
    }

    /// Point the oracle at a different base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build from settings. `fallback_key` is used when the settings carry
    /// no key of their own.
    pub fn from_settings(
        settings: &InferenceSettings,
        fallback_key: Option<String>,
    ) -> Result<Self, InferenceError> {
        let provider: Provider = settings.provider.parse()?;
        let api_key = settings
            .api_key
            .clone()
            .or(fallback_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferenceError::Config("no API key configured".to_string()))?;

        let mut config = Self::for_provider(provider, api_key, settings.model.clone());
        if let Some(base_url) = &settings.api_base_url {
            config = config.with_base_url(base_url.clone());
        }
        config.timeout = Duration::from_secs(settings.timeout_secs);
        config.retry = RetryPolicy::with_attempts(settings.max_attempts);
        config.max_existing_keywords = settings.max_existing_keywords;
        Ok(config)
    }
}

/// Relationship oracle backed by a chat completion API.
pub struct LlmRelationshipOracle {
    client: Client,
    config: LlmOracleConfig,
}

impl LlmRelationshipOracle {
    pub fn new(config: LlmOracleConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferenceError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmOracleConfig {
        &self.config
    }

    fn build_prompt(&self, new: &[String], existing: &[String]) -> String {
        let existing: Vec<&str> = existing
            .iter()
            .take(self.config.max_existing_keywords)
            .map(String::as_str)
            .collect();
        let existing = if existing.is_empty() {
            "(none yet)".to_string()
        } else {
            existing.join(", ")
        };

        format!(
            r#"You maintain a topic map of blog keywords.

NEW KEYWORDS:
{new}

EXISTING KEYWORDS:
{existing}

For each new keyword, list the keywords (new or existing) it is closely
related to. Respond with JSON only:
{{
  "relationships": [
    {{
      "keyword": "new keyword",
      "related": ["existing keyword"],
      "relationship_type": "parent|child|sibling|related",
      "weight": 0.8
    }}
  ]
}}

Guidelines:
- "parent" means the keyword is broader than the related ones, "child" narrower
- weight is between 0.01 and 1.0, higher for stronger relationships
- only use keywords from the two lists above"#,
            new = new.join(", "),
        )
    }

    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        match self.config.provider {
            Provider::OpenAi => self.openai_request(prompt).await,
            Provider::Anthropic => self.anthropic_request(prompt).await,
        }
    }

    async fn openai_request(&self, prompt: &str) -> Result<String, InferenceError> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            response_format: ResponseFormat,
        }

        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            format_type: &'static str,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Api(e.to_string()))?;
        let response = check_status(response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| InferenceError::Parse("No choices in response".to_string()))
    }

    async fn anthropic_request(&self, prompt: &str) -> Result<String, InferenceError> {
        #[derive(Serialize)]
        struct MessagesRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<ChatMessage<'a>>,
        }

        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: String,
        }

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: 1024,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let url = format!("{}/messages", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Api(e.to_string()))?;
        let response = check_status(response).await?;

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        body.content
            .into_iter()
            .map(|c| c.text)
            .find(|t| !t.is_empty())
            .ok_or_else(|| InferenceError::Parse("No content in response".to_string()))
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(InferenceError::Config(format!(
            "HTTP {status}: credentials rejected"
        ))),
        StatusCode::TOO_MANY_REQUESTS => Err(InferenceError::Api("rate limit exceeded".into())),
        _ => Err(InferenceError::Api(format!("HTTP {status}: {body}"))),
    }
}

#[async_trait]
impl RelationshipOracle for LlmRelationshipOracle {
    fn name(&self) -> &str {
        match self.config.provider {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    #[instrument(skip_all, fields(provider = %self.config.provider, new = new.len()))]
    async fn propose(
        &self,
        new: &[String],
        existing: &[String],
    ) -> Result<Vec<RelationshipProposal>, TopologyError> {
        if new.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = self.build_prompt(new, existing);
        let text = retry(&self.config.retry, || self.complete(&prompt)).await?;
        let proposals = parse_proposals(&text)?;
        info!(count = proposals.len(), "Received relationship proposals");
        Ok(proposals)
    }
}

/// Pull the JSON payload out of a model reply that may wrap it in a code
/// block or surrounding prose.
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }

    let open = text.find(['{', '[']);
    let close = text.rfind(['}', ']']);
    match (open, close) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text.trim(),
    }
}

/// Parse a model reply into proposals.
///
/// Accepts `{"relationships": [...]}` or a bare array. Entries without a
/// keyword or related list are skipped, weights are clamped into
/// `[MIN_PROPOSAL_WEIGHT, 1.0]` and unknown kinds become `related`.
pub fn parse_proposals(text: &str) -> Result<Vec<RelationshipProposal>, InferenceError> {
    let value: Value = serde_json::from_str(extract_json(text))
        .map_err(|e| InferenceError::Parse(format!("Invalid relationship JSON: {e}")))?;

    let entries = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("relationships") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                return Err(InferenceError::Parse(
                    "Missing \"relationships\" array".to_string(),
                ))
            }
        },
        _ => {
            return Err(InferenceError::Parse(
                "Expected a JSON object or array".to_string(),
            ))
        }
    };

    let proposals: Vec<_> = entries.iter().filter_map(parse_entry).collect();
    if proposals.len() < entries.len() {
        debug!(
            skipped = entries.len() - proposals.len(),
            "Skipped malformed proposals"
        );
    }
    Ok(proposals)
}

fn parse_entry(entry: &Value) -> Option<RelationshipProposal> {
    let keyword = entry.get("keyword")?.as_str()?.trim();
    if keyword.is_empty() {
        return None;
    }

    let related: Vec<String> = match entry.get("related")? {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => return None,
    };
    if related.is_empty() {
        return None;
    }

    let relationship_type = entry
        .get("relationship_type")
        .or_else(|| entry.get("type"))
        .and_then(Value::as_str)
        .map(RelationshipKind::from_label)
        .unwrap_or_default();

    let weight = entry
        .get("weight")
        .and_then(Value::as_f64)
        .map(clamp_weight)
        .unwrap_or(DEFAULT_RELATIONSHIP_WEIGHT);

    Some(RelationshipProposal {
        keyword: keyword.to_string(),
        related,
        relationship_type,
        weight,
    })
}

fn clamp_weight(weight: f64) -> f64 {
    if weight.is_finite() {
        weight.clamp(MIN_PROPOSAL_WEIGHT, 1.0)
    } else {
        DEFAULT_RELATIONSHIP_WEIGHT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
            max_elapsed: None,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn openai_body(content: &str) -> Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Here you go: {\"a\":1} done"), "{\"a\":1}");
        assert_eq!(extract_json("prefix [1, 2] suffix"), "[1, 2]");
        assert_eq!(extract_json("  nothing  "), "nothing");
    }

    #[test]
    fn test_parse_wrapped_object() {
        let text = r#"{"relationships": [
            {"keyword": "wcag 2.2", "related": ["wcag"], "relationship_type": "child", "weight": 0.9}
        ]}"#;
        let proposals = parse_proposals(text).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].keyword, "wcag 2.2");
        assert_eq!(proposals[0].related, strings(&["wcag"]));
        assert_eq!(proposals[0].relationship_type, RelationshipKind::Child);
        assert_eq!(proposals[0].weight, 0.9);
    }

    #[test]
    fn test_parse_bare_array_normalizes_entries() {
        let text = r#"[
            {"keyword": "aria", "related": ["screen readers"], "relationship_type": "cousin", "weight": 7},
            {"keyword": "alt text", "related": "images", "weight": -1},
            {"keyword": "focus order", "related": ["keyboard navigation"]},
            {"related": ["orphan"]},
            {"keyword": "empty", "related": []},
            {"keyword": "no related"}
        ]"#;
        let proposals = parse_proposals(text).unwrap();
        assert_eq!(proposals.len(), 3);

        assert_eq!(proposals[0].relationship_type, RelationshipKind::Related);
        assert_eq!(proposals[0].weight, 1.0);

        assert_eq!(proposals[1].related, strings(&["images"]));
        assert_eq!(proposals[1].weight, MIN_PROPOSAL_WEIGHT);

        assert_eq!(proposals[2].weight, DEFAULT_RELATIONSHIP_WEIGHT);
        assert_eq!(proposals[2].relationship_type, RelationshipKind::Related);
    }

    #[test]
    fn test_parse_rejects_unexpected_shapes() {
        assert!(matches!(
            parse_proposals("not json at all"),
            Err(InferenceError::Parse(_))
        ));
        assert!(matches!(
            parse_proposals(r#"{"items": []}"#),
            Err(InferenceError::Parse(_))
        ));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = InferenceSettings {
            provider: "anthropic".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
            api_base_url: Some("http://localhost:9000/v1/".to_string()),
            max_attempts: 5,
            ..Default::default()
        };
        let config = LlmOracleConfig::from_settings(&settings, Some("sk-env".into())).unwrap();
        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.api_key.expose_secret(), "sk-env");
        assert_eq!(config.retry.max_attempts, 5);

        let missing = LlmOracleConfig::from_settings(&InferenceSettings::default(), None);
        assert!(matches!(missing, Err(InferenceError::Config(_))));
    }

    #[test]
    fn test_config_debug_hides_key() {
        let config = LlmOracleConfig::openai("sk-very-secret", "gpt-4o-mini");
        assert!(!format!("{config:?}").contains("sk-very-secret"));
    }

    #[test]
    fn test_prompt_truncates_existing() {
        let mut config = LlmOracleConfig::openai("k", "m");
        config.max_existing_keywords = 2;
        let oracle = LlmRelationshipOracle::new(config).unwrap();
        let prompt = oracle.build_prompt(
            &strings(&["aria"]),
            &strings(&["wcag", "ada", "section 508"]),
        );
        assert!(prompt.contains("wcag, ada"));
        assert!(!prompt.contains("section 508"));
    }

    #[tokio::test]
    async fn test_openai_round_trip() {
        let server = MockServer::start().await;
        let content = json!({
            "relationships": [
                {"keyword": "aria", "related": ["screen readers"], "relationship_type": "sibling", "weight": 0.6}
            ]
        })
        .to_string();
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&content)))
            .expect(1)
            .mount(&server)
            .await;

        let config = LlmOracleConfig::openai("sk-test", "gpt-4o-mini").with_base_url(server.uri());
        let oracle = LlmRelationshipOracle::new(config).unwrap();
        let proposals = oracle
            .propose(&strings(&["aria"]), &strings(&["screen readers"]))
            .await
            .unwrap();

        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].relationship_type, RelationshipKind::Sibling);
        assert_eq!(oracle.name(), "openai");
    }

    #[tokio::test]
    async fn test_anthropic_round_trip() {
        let server = MockServer::start().await;
        let text = "```json\n[{\"keyword\": \"ada\", \"related\": [\"wcag\"], \"relationship_type\": \"sibling\", \"weight\": 0.7}]\n```";
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "content": [{ "type": "text", "text": text }] })),
            )
            .mount(&server)
            .await;

        let config = LlmOracleConfig::anthropic("sk-ant", "claude-3-haiku-20240307")
            .with_base_url(server.uri());
        let oracle = LlmRelationshipOracle::new(config).unwrap();
        let proposals = oracle
            .propose(&strings(&["ada"]), &strings(&["wcag"]))
            .await
            .unwrap();

        assert_eq!(proposals[0].keyword, "ada");
        assert_eq!(proposals[0].weight, 0.7);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(openai_body(r#"{"relationships": []}"#)),
            )
            .mount(&server)
            .await;

        let config = LlmOracleConfig::openai("k", "m")
            .with_base_url(server.uri())
            .with_retry(fast_retry());
        let oracle = LlmRelationshipOracle::new(config).unwrap();
        let proposals = oracle.propose(&strings(&["aria"]), &[]).await.unwrap();
        assert!(proposals.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let config = LlmOracleConfig::openai("bad", "m")
            .with_base_url(server.uri())
            .with_retry(fast_retry());
        let oracle = LlmRelationshipOracle::new(config).unwrap();
        let err = oracle.propose(&strings(&["aria"]), &[]).await.unwrap_err();
        assert!(matches!(err, TopologyError::Inference(_)));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        let server = MockServer::start().await;
        let config = LlmOracleConfig::openai("k", "m").with_base_url(server.uri());
        let oracle = LlmRelationshipOracle::new(config).unwrap();
        assert!(oracle.propose(&[], &strings(&["wcag"])).await.unwrap().is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
