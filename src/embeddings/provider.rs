use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{EmbedFuture, Embedder};
use crate::error::EmbeddingError;

/// Per-request timeout for embedding calls.
const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    Ollama,
}

impl Provider {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => "text-embedding-3-small",
            Provider::Ollama => "nomic-embed-text",
        }
    }

    pub fn requires_auth(&self) -> bool {
        match self {
            Provider::OpenAI => true,
            Provider::Ollama => false,
        }
    }

    pub fn env_var_name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Ollama => "",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Provider> {
        match s.to_lowercase().as_str() {
            "openai" | "gpt" => Some(Provider::OpenAI),
            "ollama" | "local" => Some(Provider::Ollama),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct EmbeddingClient {
    provider: Provider,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(provider: Provider, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            provider,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::builder()
                .timeout(EMBEDDING_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Embed a single text. Input is trimmed; empty input and a missing key
    /// are rejected before any request is sent.
    pub async fn create_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        if self.provider.requires_auth() && self.api_key.is_none() {
            return Err(EmbeddingError::MissingApiKey(self.provider));
        }

        let url = format!("{}/embeddings", self.endpoint);
        debug!(%url, model, chars = text.chars().count(), "requesting embedding");

        let mut req = self.client.post(&url).json(&serde_json::json!({
            "model": model,
            "input": text,
        }));
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(EmbeddingError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&body),
            });
        }

        parse_embedding_response(&body)
    }
}

impl Embedder for EmbeddingClient {
    fn embed<'a>(&'a self, text: &'a str, model: &'a str) -> EmbedFuture<'a> {
        Box::pin(self.create_embedding(text, model))
    }
}

/// Extract `data[0].embedding` from an embeddings API response body.
pub fn parse_embedding_response(body: &str) -> Result<Vec<f32>, EmbeddingError> {
    #[derive(Deserialize)]
    struct EmbeddingResponse {
        data: Vec<EmbeddingData>,
    }

    #[derive(Deserialize)]
    struct EmbeddingData {
        embedding: Vec<f32>,
    }

    let parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

    let embedding = parsed
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbeddingError::MalformedResponse("no embedding returned".into()))?;

    if embedding.is_empty() {
        return Err(EmbeddingError::MalformedResponse("embedding is empty".into()));
    }
    Ok(embedding)
}

/// Prefer the API's `error.message`, fall back to the raw body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "Failed to create embedding.".to_string()
            } else {
                trimmed.chars().take(300).collect()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding_response() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,-0.2,0.3]}],"model":"text-embedding-3-small"}"#;
        let v = parse_embedding_response(body).unwrap();
        assert_eq!(v, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_parse_embedding_response_missing_data() {
        let err = parse_embedding_response(r#"{"data":[]}"#).unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedResponse(_)));

        let err = parse_embedding_response("not json").unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_embedding_response_empty_vector() {
        let err = parse_embedding_response(r#"{"data":[{"embedding":[]}]}"#).unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedResponse(_)));
    }

    #[test]
    fn test_upstream_message_prefers_api_error() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(upstream_message(body), "Incorrect API key provided");
        assert_eq!(upstream_message("  "), "Failed to create embedding.");
        assert_eq!(upstream_message("gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_request() {
        let client = EmbeddingClient::new(Provider::OpenAI, "http://127.0.0.1:9", Some("k".into()));
        let err = client.create_embedding("   ", "m").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptyInput));
    }

    #[tokio::test]
    async fn test_missing_key_rejected_before_request() {
        let client = EmbeddingClient::new(Provider::OpenAI, "http://127.0.0.1:9", Some(" ".into()));
        let err = client.create_embedding("hello", "m").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::MissingApiKey(Provider::OpenAI)));
    }

    #[test]
    fn test_provider_from_str_loose() {
        assert_eq!(Provider::from_str_loose("OpenAI"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_str_loose("local"), Some(Provider::Ollama));
        assert_eq!(Provider::from_str_loose("gemini"), None);
        assert!(!Provider::Ollama.requires_auth());
    }
}
