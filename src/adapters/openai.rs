use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::types::ProviderConfig;
use crate::error::{Error, Result};
use crate::ports::llm::{Embedding, JsonCompletionRequest, LanguageModel};

/// OpenAI-compatible provider client: embeddings plus JSON-mode chat
/// completions.
#[derive(Debug)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiClient {
    /// Fails fast when no API key is configured; every downstream service
    /// depends on it.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "language-model provider API key not configured (set OPENAI_API_KEY)".into(),
                )
            })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        reason: format!("provider request to {path} timed out"),
                    }
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            warn!(?retry_after_secs, "Provider rate limited (429)");
            return Err(Error::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Network {
                reason: format!("provider returned HTTP {status}: {text}"),
            });
        }

        response.json::<R>().await.map_err(Error::Http)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: EmbeddingInput::Single(text),
        };
        let response: EmbeddingResponse = self.post("/embeddings", &request).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Network {
                reason: "provider returned no embedding data".into(),
            })?;
        Ok(Embedding {
            vector,
            token_count: response.usage.map_or(0, |u| u.total_tokens),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: EmbeddingInput::Batch(texts),
        };
        let response: EmbeddingResponse = self.post("/embeddings", &request).await?;
        if response.data.len() != texts.len() {
            return Err(Error::Network {
                reason: format!(
                    "provider returned {} embeddings for {} inputs",
                    response.data.len(),
                    texts.len()
                ),
            });
        }
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn complete_json(&self, request: &JsonCompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };
        let response: ChatResponse = self.post("/chat/completions", &body).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Network {
                reason: "provider returned no completion choices".into(),
            })
    }
}
