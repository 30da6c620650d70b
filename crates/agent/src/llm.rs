use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use shelfwise_core::config::{LlmConfig, LlmProvider};

/// Text-in, text-out reasoning service. Implementations must fail rather than
/// hang; the HTTP client enforces this with a request timeout.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpCompletionClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build completion HTTP client")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            provider: config.provider,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        match self.provider {
            LlmProvider::OpenAi => json!({
                "model": &self.model,
                "messages": [{"role": "user", "content": prompt}],
            }),
            LlmProvider::Anthropic => json!({
                "model": &self.model,
                "max_tokens": MAX_TOKENS,
                "messages": [{"role": "user", "content": prompt}],
            }),
            LlmProvider::Ollama => json!({
                "model": &self.model,
                "prompt": prompt,
                "stream": false,
            }),
        }
    }
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut request = self.client.post(self.endpoint()).json(&self.request_body(prompt));

        let api_key = self.api_key.as_ref().map(|key| key.expose_secret().to_string());
        request = match (self.provider, api_key) {
            (LlmProvider::OpenAi, Some(key)) => request.bearer_auth(key),
            (LlmProvider::Anthropic, Some(key)) => request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            (_, _) => request,
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("{} completion request failed", self.provider.as_str()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {}: {}", self.provider.as_str(), status, body));
        }

        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("{} returned a non-JSON body", self.provider.as_str()))?;
        let text = completion_text(self.provider, &payload)?;

        debug!(
            event_name = "agent.completion.received",
            provider = self.provider.as_str(),
            model = %self.model,
            response_len = text.len(),
            "completion received"
        );
        Ok(text)
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn completion_text(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::OpenAi => payload.pointer("/choices/0/message/content"),
        LlmProvider::Anthropic => payload.pointer("/content/0/text"),
        LlmProvider::Ollama => payload.get("response"),
    };

    text.and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("empty response from {}", provider.as_str()))
}

/// Replays queued responses in order and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedCompletionService {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletionService {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let responses = responses.into_iter().map(|response| Ok(response.into())).collect();
        Self { responses: Mutex::new(responses), prompts: Mutex::default() }
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.lock_responses().push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, reason: impl Into<String>) {
        self.lock_responses().push_back(Err(reason.into()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).push(prompt.to_string());

        match self.lock_responses().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Err(anyhow!("scripted completion service has no responses left")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use shelfwise_core::config::{LlmConfig, LlmProvider};

    use super::{completion_text, CompletionService, HttpCompletionClient, ScriptedCompletionService};

    fn config(provider: LlmProvider, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("sk-test".to_string().into()),
            base_url: base_url.map(str::to_string),
            model: "test-model".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn endpoints_follow_provider_conventions() {
        let openai = HttpCompletionClient::from_config(&config(LlmProvider::OpenAi, None))
            .expect("client");
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");

        let ollama = HttpCompletionClient::from_config(&config(
            LlmProvider::Ollama,
            Some("http://localhost:11434/"),
        ))
        .expect("client");
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/generate");
        assert_eq!(ollama.request_body("hi")["stream"], json!(false));
    }

    #[test]
    fn completion_text_is_read_from_each_provider_shape() {
        let openai = json!({"choices": [{"message": {"content": "from openai"}}]});
        let anthropic = json!({"content": [{"type": "text", "text": "from anthropic"}]});
        let ollama = json!({"response": "from ollama", "done": true});

        assert_eq!(completion_text(LlmProvider::OpenAi, &openai).expect("text"), "from openai");
        assert_eq!(
            completion_text(LlmProvider::Anthropic, &anthropic).expect("text"),
            "from anthropic"
        );
        assert_eq!(completion_text(LlmProvider::Ollama, &ollama).expect("text"), "from ollama");
        assert!(completion_text(LlmProvider::OpenAi, &json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn scripted_service_replays_in_order_and_records_prompts() {
        let service = ScriptedCompletionService::new(["first"]);
        service.push_failure("upstream timeout");

        assert_eq!(service.complete("p1").await.expect("first"), "first");
        let failure = service.complete("p2").await.expect_err("scripted failure");
        assert!(failure.to_string().contains("upstream timeout"));
        assert!(service.complete("p3").await.is_err());
        assert_eq!(service.prompts(), vec!["p1", "p2", "p3"]);
    }
}
