//! Abstracción sobre Rig para los dos servicios del modelo de lenguaje:
//! embeddings de la descripción de la avería y completion del diagnóstico.
//!
//! El pipeline sólo ve los traits [`Embedder`] y [`Completer`]; `LlmManager`
//! es la implementación real contra OpenAI.

use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;
use rig::providers::openai;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{Stage, UpstreamError};
use crate::models::EmbeddingVector;

/// Convierte texto en un vector de dimensión fija.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, UpstreamError>;
}

/// Envía un prompt al modelo generativo y devuelve el texto libre de la respuesta.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u64) -> Result<String, UpstreamError>;
}

/// Gestor de LLMs y embeddings.
#[derive(Clone)]
pub struct LlmManager {
    client: Option<openai::Client>,
    pub embedding_model: String,
    pub chat_model: String,
}

impl std::fmt::Debug for LlmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmManager")
            .field("configured", &self.client.is_some())
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    ///
    /// Sin `OPENAI_API_KEY` no se crea cliente; el orquestador corta antes
    /// de llegar a usarlo.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            client: cfg.openai_api_key.as_deref().map(openai::Client::new),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        }
    }

    fn client(&self, stage: Stage) -> Result<&openai::Client, UpstreamError> {
        self.client
            .as_ref()
            .ok_or_else(|| UpstreamError::unavailable(stage, "OpenAI client not configured"))
    }
}

#[async_trait]
impl Embedder for LlmManager {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, UpstreamError> {
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = self.client(Stage::Embedding)?;
        let embedding_model = client.embedding_model(&self.embedding_model);

        let embeddings = embedding_model
            .embed_texts(vec![text.to_string()])
            .await
            .map_err(|e| classify(Stage::Embedding, e))?;

        let vector = embeddings
            .into_iter()
            .next()
            .map(|e| e.vec)
            .ok_or_else(|| UpstreamError::malformed(Stage::Embedding, "empty embedding response"))?;

        if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
            return Err(UpstreamError::malformed(
                Stage::Embedding,
                "embedding vector is empty or contains non-finite values",
            ));
        }

        debug!("Embedding generado ({} dimensiones) con {}", vector.len(), self.embedding_model);
        Ok(vector)
    }
}

#[async_trait]
impl Completer for LlmManager {
    async fn complete(&self, prompt: &str, max_tokens: u64) -> Result<String, UpstreamError> {
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = self.client(Stage::Completing)?;
        let agent = client.agent(&self.chat_model).max_tokens(max_tokens).build();

        let answer = agent
            .prompt(prompt)
            .await
            .map_err(|e| classify(Stage::Completing, e))?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(UpstreamError::malformed(Stage::Completing, "empty completion"));
        }

        debug!("Completion recibida ({} caracteres) de {}", answer.len(), self.chat_model);
        Ok(answer.to_string())
    }
}

/// Clasifica un error del proveedor. Rig no expone el código HTTP de forma
/// estructurada, así que se inspecciona el mensaje.
fn classify(stage: Stage, err: impl std::fmt::Display) -> UpstreamError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") {
        UpstreamError::RateLimited { stage, message }
    } else if lower.contains("json") || lower.contains("deserializ") {
        UpstreamError::Malformed { stage, message }
    } else {
        UpstreamError::Unavailable { stage, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_rate_limits_and_bad_payloads() {
        assert!(matches!(
            classify(Stage::Embedding, "HTTP 429 Too Many Requests"),
            UpstreamError::RateLimited { stage: Stage::Embedding, .. }
        ));
        assert!(matches!(
            classify(Stage::Completing, "JsonError: expected value at line 1"),
            UpstreamError::Malformed { stage: Stage::Completing, .. }
        ));
        assert!(matches!(
            classify(Stage::Completing, "error sending request: connection refused"),
            UpstreamError::Unavailable { .. }
        ));
    }

    #[test]
    fn manager_without_key_has_no_client() {
        let mut cfg = crate::config::test_config();
        cfg.openai_api_key = None;
        let manager = LlmManager::from_config(&cfg);

        assert!(matches!(
            manager.client(Stage::Embedding),
            Err(UpstreamError::Unavailable { stage: Stage::Embedding, .. })
        ));
    }
}
