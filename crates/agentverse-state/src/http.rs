//! OpenAI-compatible HTTP client
//!
//! Implements [`LlmService`] over `POST {api_base}/chat/completions` and
//! [`EmbeddingService`] over `POST {api_base}/embeddings`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::service_traits::{EmbeddingService, LlmResponse, LlmService, ServiceResult};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API base URL, without trailing slash
    pub api_base: String,
    /// Bearer token (optional for local servers)
    pub api_key: Option<String>,
    /// Chat completion model
    pub chat_model: String,
    /// Embedding model
    pub embedding_model: String,
    /// Sampling temperature for chat completions
    pub temperature: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_base: std::env::var("AGENTVERSE_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("AGENTVERSE_API_KEY").ok(),
            chat_model: std::env::var("AGENTVERSE_CHAT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: std::env::var("AGENTVERSE_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            temperature: 0.7,
        }
    }
}

impl ClientConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for a specific endpoint
    pub fn new(api_base: &str) -> Self {
        ClientConfig {
            api_base: api_base.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Set authentication token
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_chat_model(mut self, model: &str) -> Self {
        self.chat_model = model.to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingList {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP client for chat and embedding endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> ServiceResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("agentverse-state/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(OpenAiClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> ServiceResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> ServiceResult<reqwest::Response> {
        let url = format!("{}/{}", self.config.api_base, path);
        let mut request = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, "Upstream request failed");
            return Err(ServiceError::Http(format!("{status}: {text}")));
        }
        Ok(response)
    }

    async fn chat(&self, prompt: &str, max_tokens: Option<usize>) -> ServiceResult<LlmResponse> {
        let mut body = json!({
            "model": self.config.chat_model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.config.temperature,
        });
        if let Some(limit) = max_tokens {
            body["max_tokens"] = json!(limit);
        }

        let completion: ChatCompletion = self.post("chat/completions", body).await?.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::InvalidResponse {
                service: "chat".to_string(),
                reason: "response carried no choices".to_string(),
            })?;

        debug!(model = %self.config.chat_model, chars = content.len(), "Chat completion received");
        Ok(LlmResponse::new(content))
    }
}

#[async_trait]
impl LlmService for OpenAiClient {
    async fn generate_response(&self, prompt: &str) -> ServiceResult<LlmResponse> {
        self.chat(prompt, None).await.map_err(into_llm_error)
    }

    async fn generate_with_limit(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> ServiceResult<LlmResponse> {
        self.chat(prompt, Some(max_tokens))
            .await
            .map_err(into_llm_error)
    }
}

#[async_trait]
impl EmbeddingService for OpenAiClient {
    async fn get_embedding(&self, text: &str) -> ServiceResult<Vec<f32>> {
        let mut vectors = self.get_embeddings(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ServiceError::embedding("empty embedding response"))
    }

    async fn get_embeddings(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": self.config.embedding_model,
            "input": texts,
        });

        let list: EmbeddingList = self
            .post("embeddings", body)
            .await
            .map_err(into_embedding_error)?
            .json()
            .await
            .map_err(|e| ServiceError::embedding(e.to_string()))?;

        let mut items = list.data;
        if items.len() != texts.len() {
            return Err(ServiceError::embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                items.len()
            )));
        }
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

fn into_llm_error(err: ServiceError) -> ServiceError {
    match err {
        ServiceError::Llm { .. } => err,
        other => ServiceError::llm(other.to_string()),
    }
}

fn into_embedding_error(err: ServiceError) -> ServiceError {
    match err {
        ServiceError::Embedding { .. } => err,
        other => ServiceError::embedding(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new_trims_trailing_slash() {
        let config = ClientConfig::new("http://localhost:8080/v1/");
        assert_eq!(config.api_base, "http://localhost:8080/v1");
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::new("http://localhost:8080")
            .with_api_key("secret")
            .with_chat_model("local-chat")
            .with_embedding_model("local-embed");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.chat_model, "local-chat");
        assert_eq!(config.embedding_model, "local-embed");
    }

    #[test]
    fn test_chat_completion_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"7"}}]}"#;
        let parsed: ChatCompletion = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("7"));
    }

    #[test]
    fn test_error_mapping_preserves_kind() {
        let err = into_llm_error(ServiceError::Http("503".to_string()));
        assert_eq!(err.kind(), "llm");
        let err = into_embedding_error(ServiceError::embedding("boom"));
        assert_eq!(err.to_string(), "Embedding failed: boom");
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        let client = OpenAiClient::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
        let vectors = client.get_embeddings(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
