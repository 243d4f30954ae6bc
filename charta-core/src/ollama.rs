//! Ollama HTTP client — text generation and model listing against a locally
//! hosted Ollama service.
//!
//! `generate` retries transient failures with backoff and jitter; the high-level
//! `ask` never fails and instead folds every failure into an `"Error: ..."`
//! string so the front-end always has a displayable message.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::OllamaConfig;
use crate::prompt;

/// Fixed answer returned when a generate call exceeds the 7-minute timeout.
pub const TIMEOUT_MESSAGE: &str =
    "Error: Request timed out after 7 minutes. Please try again with a simpler question or a different model.";

#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing response in API body")]
    MissingResponse,
}

impl OllamaError {
    /// Connection failures and server-side errors are worth retrying;
    /// timeouts (420 s each) and client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            OllamaError::Http(e) => e.is_connect() || e.is_request() && !e.is_timeout(),
            OllamaError::Api { code, .. } => *code >= 500,
            OllamaError::MissingResponse => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, OllamaError::Http(e) if e.is_timeout())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Client for the Ollama `/api/generate` and `/api/tags` endpoints.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
    base_url: String,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, OllamaError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: OllamaConfig, base_url: String) -> Result<Self, OllamaError> {
        let mut config = config;
        config.base_url = base_url;
        Self::new(config)
    }

    /// Generate a completion, retrying transient failures with backoff.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, OllamaError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::spawn(
            retry_strategy,
            || self.generate_once(model, prompt),
            OllamaError::is_transient,
        )
        .await
    }

    async fn generate_once(&self, model: &str, prompt: &str) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.generate_timeout_secs))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Ollama API error");
            return Err(OllamaError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response.json().await?;
        body.response.ok_or(OllamaError::MissingResponse)
    }

    /// Ask a question about a chart table. Never fails: every failure path is
    /// converted to an `"Error: ..."`-prefixed answer string.
    pub async fn ask(&self, question: &str, table_data: &str, title: &str, model: &str) -> String {
        let prompt = prompt::build_chart_prompt(question, table_data, title);

        match self.generate(model, &prompt).await {
            Ok(answer) => answer,
            Err(e) if e.is_timeout() => {
                tracing::error!("timeout while waiting for Ollama response");
                TIMEOUT_MESSAGE.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "error communicating with Ollama");
                format!("Error: {e}")
            }
        }
    }

    /// List installed model names via `/api/tags`.
    pub async fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.tags_timeout_secs))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OllamaError::Api {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: TagsResponse = response.json().await?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> OllamaConfig {
        OllamaConfig {
            base_url: String::new(),
            default_model: "llama3".to_string(),
            generate_timeout_secs: 2,
            tags_timeout_secs: 2,
            status_ttl_secs: 30,
            max_retries: 2,
            retry_delay_ms: 10,
        }
    }

    fn client_for(server: &MockServer) -> OllamaClient {
        OllamaClient::with_base_url(test_config(), server.uri()).expect("client")
    }

    #[tokio::test]
    async fn generate_posts_prompt_and_returns_response() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_json(serde_json::json!({
                "model": "llama3",
                "prompt": "say hi",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3",
                "response": "hi there"
            })))
            .mount(&mock_server)
            .await;

        let answer = client.generate("llama3", "say hi").await.expect("generate");
        assert_eq!(answer, "hi there");
    }

    #[tokio::test]
    async fn generate_retries_on_500_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "recovered"
            })))
            .mount(&mock_server)
            .await;

        let answer = client.generate("llama3", "hi").await.expect("retry");
        assert_eq!(answer, "recovered");
    }

    #[tokio::test]
    async fn generate_does_not_retry_client_errors() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client.generate("missing", "hi").await.unwrap_err();
        match err {
            OllamaError::Api { code, .. } => assert_eq!(code, 404),
            other => panic!("expected Api error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ask_converts_api_errors_to_error_strings() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
            .mount(&mock_server)
            .await;

        let answer = client.ask("total?", "| A |", "Chart", "missing").await;
        assert!(answer.starts_with("Error:"), "got: {answer}");
    }

    #[tokio::test]
    async fn ask_converts_timeouts_to_fixed_message() {
        let mock_server = MockServer::start().await;
        let mut config = test_config();
        config.generate_timeout_secs = 1;
        config.max_retries = 0;
        let client = OllamaClient::with_base_url(config, mock_server.uri()).expect("client");

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "late"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let answer = client.ask("slow?", "| A |", "Chart", "llama3").await;
        assert_eq!(answer, TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn list_models_parses_tag_names() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"name": "llama3", "size": 123},
                    {"name": "mistral", "size": 456}
                ]
            })))
            .mount(&mock_server)
            .await;

        let models = client.list_models().await.expect("tags");
        assert_eq!(models, vec!["llama3", "mistral"]);
    }

    #[tokio::test]
    async fn list_models_fails_on_error_status() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        assert!(client.list_models().await.is_err());
    }
}
