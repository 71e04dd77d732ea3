//! Provider clients for the two hosted LLM APIs.
//!
//! Every call is a single attempt; failures surface as [`RagError::Api`]
//! carrying the provider's error payload.

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{Config, ProviderConfig};
use crate::error::{RagError, RagResult};

/// Hosted model provider, selected from the model name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    /// `gpt*` models go to OpenAI, `gemini*` models to Gemini
    pub fn for_model(model: &str) -> RagResult<Self> {
        let name = model.trim().trim_start_matches("models/").to_ascii_lowercase();
        if name.starts_with("gpt") {
            Ok(Self::OpenAi)
        } else if name.starts_with("gemini") {
            Ok(Self::Gemini)
        } else {
            Err(RagError::config(format!("unsupported model: {model}")))
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("OpenAI"),
            Self::Gemini => f.write_str("Gemini"),
        }
    }
}

/// Opaque text-completion service: prompt and model name in, text out
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> RagResult<String>;
}

/// Minimum-interval pacing between requests to one endpoint
pub struct RateLimiter {
    rate_limit_rps: f64,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(rate_limit_rps: f64) -> Self {
        Self {
            rate_limit_rps,
            last_request: Mutex::new(None),
        }
    }

    /// Sleep until the configured interval since the previous request has passed
    pub async fn wait(&self) {
        let mut last_request = self.last_request.lock().await;
        enforce_rate_limit(&mut last_request, self.rate_limit_rps).await;
    }
}

/// Enforce rate limiting for API requests
async fn enforce_rate_limit(last_request: &mut Option<Instant>, rate_limit_rps: f64) {
    if rate_limit_rps <= 0.0 || !rate_limit_rps.is_finite() {
        return;
    }

    let min_interval = Duration::from_secs_f64(1.0 / rate_limit_rps);

    if let Some(last_time) = *last_request {
        let elapsed = last_time.elapsed();
        if elapsed < min_interval {
            let sleep_duration = min_interval - elapsed;
            sleep(sleep_duration).await;
        }
    }

    *last_request = Some(Instant::now());
}

fn build_http_client(config: &ProviderConfig) -> RagResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| RagError::config(format!("failed to create HTTP client: {e}")))
}

/// OpenAI chat completions
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    temperature: f64,
    max_tokens: u32,
    limiter: RateLimiter,
}

impl OpenAiClient {
    pub fn new(config: &ProviderConfig, api_key: String) -> RagResult<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_endpoint);

        // one attempt per call, including 429 responses
        let no_retry = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        let client = Client::with_config(openai_config)
            .with_http_client(build_http_client(config)?)
            .with_backoff(no_retry);

        Ok(Self {
            client,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            limiter: RateLimiter::new(config.rate_limit_rps),
        })
    }

    /// Build the chat completion request
    fn build_request(&self, model: &str, prompt: &str) -> RagResult<CreateChatCompletionRequest> {
        let user_message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| RagError::api(Provider::OpenAi, None, format!("failed to build user message: {e}")))?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![user_message])
            .temperature(self.temperature as f32)
            .max_tokens(u16::try_from(self.max_tokens).unwrap_or(u16::MAX))
            .build()
            .map_err(|e| RagError::api(Provider::OpenAi, None, format!("failed to build request: {e}")))
    }

    /// Extract the text of the first choice
    fn extract_content(response: CreateChatCompletionResponse) -> RagResult<String> {
        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        match response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.unwrap_or_default()),
            None => Err(RagError::api(
                Provider::OpenAi,
                None,
                "response contained no choices",
            )),
        }
    }
}

fn map_openai_error(err: OpenAIError) -> RagError {
    match err {
        OpenAIError::ApiError(api_error) => RagError::api(Provider::OpenAi, None, api_error.message),
        OpenAIError::Reqwest(e) => {
            let status = e.status().map(|s| s.as_u16());
            RagError::api(Provider::OpenAi, status, e.to_string())
        }
        other => RagError::api(Provider::OpenAi, None, other.to_string()),
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, prompt: &str, model: &str) -> RagResult<String> {
        self.limiter.wait().await;

        let request = self.build_request(model, prompt)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        Self::extract_content(response)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiRequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Google Gemini `generateContent`
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
    limiter: RateLimiter,
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig, api_key: String) -> RagResult<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            api_base: config.api_endpoint.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            limiter: RateLimiter::new(config.rate_limit_rps),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim().trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    fn error_payload(body: &str) -> String {
        match serde_json::from_str::<GeminiErrorEnvelope>(body) {
            Ok(envelope) => match envelope.error.status {
                Some(status) => format!("{status}: {}", envelope.error.message),
                None => envelope.error.message,
            },
            Err(_) => body.to_string(),
        }
    }

    fn extract_text(response: GenerateContentResponse) -> RagResult<String> {
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            let feedback = response
                .prompt_feedback
                .map(|value| value.to_string())
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(RagError::api(
                Provider::Gemini,
                None,
                format!("empty response: {feedback}"),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &str, model: &str) -> RagResult<String> {
        self.limiter.wait().await;

        let body = GenerateContentRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiRequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::api(Provider::Gemini, e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::api(Provider::Gemini, Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(RagError::api(
                Provider::Gemini,
                Some(status.as_u16()),
                Self::error_payload(&text),
            ));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            RagError::api(
                Provider::Gemini,
                Some(status.as_u16()),
                format!("failed to parse response: {e}"),
            )
        })?;

        Self::extract_text(parsed)
    }
}

/// Routes each call to the provider that serves the requested model
pub struct LlmRouter {
    openai: Option<OpenAiClient>,
    gemini: Option<GeminiClient>,
    openai_key_var: String,
    gemini_key_var: String,
}

impl LlmRouter {
    /// Read the API keys named in the configuration from the environment, once
    pub fn from_env(config: &Config) -> RagResult<Self> {
        let read_key = |var: &str| {
            std::env::var(var)
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
        };
        let openai_key = read_key(&config.openai.env_var_api_key);
        let gemini_key = read_key(&config.gemini.env_var_api_key);

        if openai_key.is_none() {
            warn!(var = %config.openai.env_var_api_key, "OpenAI API key not set");
        }
        if gemini_key.is_none() {
            warn!(var = %config.gemini.env_var_api_key, "Gemini API key not set");
        }

        Self::with_api_keys(config, openai_key, gemini_key)
    }

    pub fn with_api_keys(
        config: &Config,
        openai_key: Option<String>,
        gemini_key: Option<String>,
    ) -> RagResult<Self> {
        let openai = openai_key
            .map(|key| OpenAiClient::new(&config.openai, key))
            .transpose()?;
        let gemini = gemini_key
            .map(|key| GeminiClient::new(&config.gemini, key))
            .transpose()?;

        Ok(Self {
            openai,
            gemini,
            openai_key_var: config.openai.env_var_api_key.clone(),
            gemini_key_var: config.gemini.env_var_api_key.clone(),
        })
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        match provider {
            Provider::OpenAi => self.openai.is_some(),
            Provider::Gemini => self.gemini.is_some(),
        }
    }

    fn client_for(&self, provider: Provider) -> RagResult<&dyn LanguageModel> {
        let (client, var): (Option<&dyn LanguageModel>, &str) = match provider {
            Provider::OpenAi => (
                self.openai.as_ref().map(|c| c as &dyn LanguageModel),
                self.openai_key_var.as_str(),
            ),
            Provider::Gemini => (
                self.gemini.as_ref().map(|c| c as &dyn LanguageModel),
                self.gemini_key_var.as_str(),
            ),
        };
        client.ok_or_else(|| {
            RagError::config(format!("{provider} API key not configured (set {var})"))
        })
    }
}

#[async_trait]
impl LanguageModel for LlmRouter {
    async fn complete(&self, prompt: &str, model: &str) -> RagResult<String> {
        let provider = Provider::for_model(model)?;
        debug!(%provider, model, prompt_chars = prompt.len(), "calling LLM");
        self.client_for(provider)?.complete(prompt, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant as TokioInstant;

    fn provider_config(endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            api_endpoint: endpoint.to_string(),
            env_var_api_key: "TEST_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 256,
            rate_limit_rps: 0.0,
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_provider_for_model() {
        assert_eq!(Provider::for_model("gpt-4").unwrap(), Provider::OpenAi);
        assert_eq!(Provider::for_model("GPT-4o-mini").unwrap(), Provider::OpenAi);
        assert_eq!(Provider::for_model("gemini-1.5-pro").unwrap(), Provider::Gemini);
        assert_eq!(Provider::for_model("models/gemini-pro").unwrap(), Provider::Gemini);
        assert!(matches!(
            Provider::for_model("claude-3"),
            Err(RagError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_enforce_rate_limit_no_limit() {
        let mut last_request = None;
        let start = TokioInstant::now();

        enforce_rate_limit(&mut last_request, 0.0).await;

        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(10)); // Should return immediately
    }

    #[tokio::test]
    async fn test_enforce_rate_limit_negative_limit() {
        let mut last_request = None;
        let start = TokioInstant::now();

        enforce_rate_limit(&mut last_request, -1.0).await;

        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(10)); // Should return immediately
    }

    #[tokio::test]
    async fn test_enforce_rate_limit_first_request() {
        let mut last_request = None;
        let start = TokioInstant::now();

        enforce_rate_limit(&mut last_request, 10.0).await;

        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(10)); // Should not sleep on first request
        assert!(last_request.is_some());
    }

    #[tokio::test]
    async fn test_enforce_rate_limit_with_sleep() {
        let mut last_request = Some(Instant::now());
        let start = TokioInstant::now();

        enforce_rate_limit(&mut last_request, 100.0).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(8));
    }

    #[tokio::test]
    async fn test_rate_limiter_paces_consecutive_calls() {
        let limiter = RateLimiter::new(50.0);
        let start = TokioInstant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_router_missing_key_is_config_error() {
        let config = Config::default();
        let router = LlmRouter::with_api_keys(&config, None, None).unwrap();

        assert!(!router.is_configured(Provider::OpenAi));
        let err = router.complete("hello", "gpt-4").await.unwrap_err();
        assert!(matches!(err, RagError::Config { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = router.complete("hello", "gemini-1.5-pro").await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_openai_client_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "created": 1700000000,
                    "model": "gpt-4",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "Payment of 100.00 EUR."},
                        "finish_reason": "stop",
                        "logprobs": null
                    }],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                }"#,
            )
            .create_async()
            .await;

        let client = OpenAiClient::new(&provider_config(&server.url()), "test-key".to_string()).unwrap();
        let text = client.complete("Summarize", "gpt-4").await.unwrap();

        assert_eq!(text, "Payment of 100.00 EUR.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_client_surfaces_api_error_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error", "param": null, "code": "invalid_api_key"}}"#,
            )
            .create_async()
            .await;

        let client = OpenAiClient::new(&provider_config(&server.url()), "bad".to_string()).unwrap();
        let err = client.complete("Summarize", "gpt-4").await.unwrap_err();

        match err {
            RagError::Api { provider, payload, .. } => {
                assert_eq!(provider, Provider::OpenAi);
                assert!(payload.contains("Incorrect API key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_openai_client_does_not_retry_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error": {"message": "Rate limit reached for requests", "type": "requests", "param": null, "code": "rate_limit_exceeded"}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiClient::new(&provider_config(&server.url()), "test-key".to_string()).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(8),
            client.complete("Summarize", "gpt-4"),
        )
        .await
        .expect("rate-limited call should fail without retrying");

        assert!(matches!(result, Err(RagError::Api { provider: Provider::OpenAi, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gemini_client_joins_candidate_parts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .match_header("x-goog-api-key", "g-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates": [{"content": {"role": "model", "parts": [{"text": "Statement balance "}, {"text": "is 10.00 GBP."}]}, "finishReason": "STOP"}]}"#,
            )
            .create_async()
            .await;

        let client = GeminiClient::new(&provider_config(&server.url()), "g-key".to_string()).unwrap();
        let text = client.complete("Summarize", "gemini-1.5-pro").await.unwrap();

        assert_eq!(text, "Statement balance is 10.00 GBP.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gemini_client_error_carries_status_and_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error": {"code": 403, "message": "Generative Language API has not been used in project", "status": "PERMISSION_DENIED"}}"#,
            )
            .create_async()
            .await;

        let client = GeminiClient::new(&provider_config(&server.url()), "g-key".to_string()).unwrap();
        let err = client.complete("Summarize", "gemini-1.5-pro").await.unwrap_err();

        match err {
            RagError::Api { provider, status, payload } => {
                assert_eq!(provider, Provider::Gemini);
                assert_eq!(status, Some(403));
                assert!(payload.starts_with("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_gemini_client_empty_candidates_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}"#)
            .create_async()
            .await;

        let client = GeminiClient::new(&provider_config(&server.url()), "g-key".to_string()).unwrap();
        let err = client.complete("Summarize", "gemini-1.5-pro").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_router_dispatches_by_model_prefix() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "routed"}]}}]}"#)
            .create_async()
            .await;

        let mut config = Config::default();
        config.gemini = provider_config(&server.url());
        let router = LlmRouter::with_api_keys(&config, None, Some("g-key".to_string())).unwrap();

        assert_eq!(router.complete("hi", "gemini-1.5-pro").await.unwrap(), "routed");
        assert!(router.complete("hi", "gpt-4").await.is_err());
    }
}
