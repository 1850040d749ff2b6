//! Hosted chat-completion providers.
//!
//! The provider is resolved once from [`LlmSettings`]; a missing credential is
//! a configuration error at construction, never at first use.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use dxrag_core::config::LlmSettings;
use dxrag_core::error::{Error, Result};
use dxrag_core::traits::ChatModel;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Google,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 3] = [Self::OpenAi, Self::Anthropic, Self::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Google => "gemini-2.0-flash",
        }
    }

    /// Environment variable holding the credential.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }

    fn endpoint(&self, model: &str) -> String {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/chat/completions".to_string(),
            Self::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            Self::Google => format!("https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            other => Err(Error::Configuration(format!(
                "unknown LLM provider '{other}' (expected openai, anthropic or google)"
            ))),
        }
    }
}

pub struct Recommendation {
    pub use_case: &'static str,
    pub provider: LlmProvider,
    pub model: &'static str,
    pub description: &'static str,
}

/// Suggested provider/model pairings, shown by `dxrag models`.
pub const RECOMMENDATIONS: &[Recommendation] = &[
    Recommendation {
        use_case: "best_accuracy",
        provider: LlmProvider::OpenAi,
        model: "gpt-4o",
        description: "Strongest benchmark accuracy; suited to complex differentials",
    },
    Recommendation {
        use_case: "best_reasoning",
        provider: LlmProvider::Anthropic,
        model: "claude-sonnet-4-20250514",
        description: "Clear clinical reasoning and careful treatment personalisation",
    },
    Recommendation {
        use_case: "fastest_cheapest",
        provider: LlmProvider::Google,
        model: "gemini-2.0-flash",
        description: "Fast and inexpensive; fine for triage and simple cases",
    },
    Recommendation {
        use_case: "budget_accurate",
        provider: LlmProvider::OpenAi,
        model: "gpt-4o-mini",
        description: "Balanced cost and accuracy for routine cases",
    },
];

#[derive(Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl LlmConfig {
    /// Resolve provider, model and credential. `api_key` overrides the
    /// provider's environment variable.
    pub fn from_settings(settings: &LlmSettings, api_key: Option<String>) -> Result<Self> {
        let provider: LlmProvider = settings.provider.parse()?;
        let model = if settings.model.trim().is_empty() {
            provider.default_model().to_string()
        } else {
            settings.model.trim().to_string()
        };
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env::var(provider.api_key_env()).ok().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| Error::Configuration(format!("{} not found", provider.api_key_env())))?;
        Ok(Self {
            provider,
            model,
            api_key,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout_secs: settings.timeout_secs,
        })
    }
}

/// [`ChatModel`] over the provider's REST API. No retries.
pub struct HttpChatModel {
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpChatModel {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {e}")))?;
        info!(provider = %config.provider, model = %config.model, "Chat model ready");
        Ok(Self { config, client })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let c = &self.config;
        match c.provider {
            LlmProvider::OpenAi => json!({
                "model": c.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": c.temperature,
                "max_tokens": c.max_tokens,
            }),
            LlmProvider::Anthropic => json!({
                "model": c.model,
                "max_tokens": c.max_tokens,
                "temperature": c.temperature,
                "messages": [{ "role": "user", "content": prompt }],
            }),
            LlmProvider::Google => json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                "generationConfig": { "temperature": c.temperature, "maxOutputTokens": c.max_tokens },
            }),
        }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn provider(&self) -> &str {
        self.config.provider.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let c = &self.config;
        let request = self.client.post(c.provider.endpoint(&c.model)).json(&self.request_body(prompt));
        let request = match c.provider {
            LlmProvider::OpenAi => request.bearer_auth(&c.api_key),
            LlmProvider::Anthropic => {
                request.header("x-api-key", c.api_key.as_str()).header("anthropic-version", ANTHROPIC_VERSION)
            }
            LlmProvider::Google => request.header("x-goog-api-key", c.api_key.as_str()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::Generation(format!("{} request failed: {e}", c.provider)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("{} returned {status}: {body}", c.provider)));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("invalid {} response: {e}", c.provider)))?;
        let text = parse_completion(c.provider, body)?;
        debug!(provider = %c.provider, chars = text.len(), "Completion received");
        Ok(text)
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

/// Pull the completion text out of a provider response body.
fn parse_completion(provider: LlmProvider, body: Value) -> Result<String> {
    let malformed = |e: serde_json::Error| Error::Generation(format!("unexpected {provider} response shape: {e}"));
    let text = match provider {
        LlmProvider::OpenAi => {
            let r: OpenAiResponse = serde_json::from_value(body).map_err(malformed)?;
            r.choices.into_iter().next().and_then(|c| c.message.content)
        }
        LlmProvider::Anthropic => {
            let r: AnthropicResponse = serde_json::from_value(body).map_err(malformed)?;
            let text: String = r.content.into_iter().filter(|b| b.kind == "text").map(|b| b.text).collect();
            Some(text)
        }
        LlmProvider::Google => {
            let r: GeminiResponse = serde_json::from_value(body).map_err(malformed)?;
            r.candidates
                .into_iter()
                .next()
                .map(|c| c.content.parts.into_iter().map(|p| p.text).collect::<String>())
        }
    };
    text.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::Generation(format!("empty completion from {provider}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str, model: &str) -> LlmSettings {
        LlmSettings { provider: provider.into(), model: model.into(), ..LlmSettings::default() }
    }

    #[test]
    fn explicit_key_and_default_model() {
        let cfg = LlmConfig::from_settings(&settings("Anthropic", ""), Some("sk-test".into())).unwrap();
        assert_eq!(cfg.provider, LlmProvider::Anthropic);
        assert_eq!(cfg.model, "claude-sonnet-4-20250514");
        assert_eq!(cfg.max_tokens, 4096);
        assert!((cfg.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_provider_is_configuration_error() {
        let err = LlmConfig::from_settings(&settings("mistral", ""), Some("k".into())).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn debug_hides_key() {
        let cfg = LlmConfig::from_settings(&settings("openai", "gpt-4o-mini"), Some("sk-secret".into())).unwrap();
        assert!(!format!("{cfg:?}").contains("sk-secret"));
    }

    #[test]
    fn parses_each_provider_shape() {
        let openai = json!({ "choices": [{ "message": { "role": "assistant", "content": "A" } }] });
        assert_eq!(parse_completion(LlmProvider::OpenAi, openai).unwrap(), "A");

        let anthropic = json!({ "content": [{ "type": "text", "text": "B1" }, { "type": "text", "text": "B2" }] });
        assert_eq!(parse_completion(LlmProvider::Anthropic, anthropic).unwrap(), "B1B2");

        let gemini = json!({ "candidates": [{ "content": { "parts": [{ "text": "C" }] } }] });
        assert_eq!(parse_completion(LlmProvider::Google, gemini).unwrap(), "C");
    }

    #[test]
    fn empty_completion_is_generation_error() {
        let err = parse_completion(LlmProvider::Google, json!({ "candidates": [] })).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn request_body_uses_sampling_settings() {
        let cfg = LlmConfig::from_settings(&settings("google", ""), Some("k".into())).unwrap();
        let model = HttpChatModel::new(cfg).unwrap();
        let body = model.request_body("hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
    }
}
