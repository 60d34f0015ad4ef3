use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub token_count: u32,
}

#[derive(Debug, Clone)]
pub struct JsonCompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// The language-model provider: embeddings plus JSON-mode completions.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Batch embedding; result order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// A completion constrained to emit a single JSON object; returns the
    /// raw JSON text.
    async fn complete_json(&self, request: &JsonCompletionRequest) -> Result<String>;
}
