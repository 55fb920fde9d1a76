//! Carga y gestión de configuración de la aplicación (proveedor LLM + índice vectorial).
//!
//! Las credenciales ausentes no abortan el arranque: se guardan como `None` y
//! el orquestador las vuelve a comprobar en cada consulta.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::error::DiagnosisError;

/// Backend que aloja el histórico de averías.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProvider {
    Pinecone,
    Neo4j,
}

impl IndexProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "neo4j" => Ok(Self::Neo4j),
            other => Err(anyhow!("Proveedor de índice vectorial no soportado: {other}")),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pinecone => "Pinecone",
            Self::Neo4j => "Neo4j",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PineconeConfig {
    pub api_key: Option<String>,
    pub index_name: String,
    pub namespace: String,
    pub index_host: Option<String>,
    pub control_url: String,
}

#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: Option<String>,
    pub vector_index: String,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,

    pub index_provider: IndexProvider,
    pub pinecone: PineconeConfig,
    pub neo4j: Neo4jConfig,

    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_max_tokens: u64,

    /// Espera máxima de cada etapa con red (embedding, recuperación, completion).
    pub stage_timeout: Duration,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let index_provider_str =
            env::var("VECTOR_INDEX_PROVIDER").unwrap_or_else(|_| "pinecone".to_string());
        let index_provider = IndexProvider::from_str(&index_provider_str)?;

        let pinecone = PineconeConfig {
            api_key: non_empty_var("PINECONE_API_KEY"),
            index_name: env::var("PINECONE_INDEX")
                .unwrap_or_else(|_| "vectorscan-faults".to_string()),
            namespace: env::var("PINECONE_NAMESPACE").unwrap_or_default(),
            index_host: non_empty_var("PINECONE_INDEX_HOST"),
            control_url: env::var("PINECONE_CONTROL_URL")
                .unwrap_or_else(|_| "https://api.pinecone.io".to_string()),
        };

        let neo4j = Neo4jConfig {
            uri: env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
            user: env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
            password: non_empty_var("NEO4J_PASSWORD"),
            vector_index: env::var("NEO4J_VECTOR_INDEX")
                .unwrap_or_else(|_| "faultEmbeddingIndex".to_string()),
        };

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-ada-002".to_string());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let llm_max_tokens = parse_var("LLM_MAX_TOKENS", 500)?;
        let stage_timeout = Duration::from_secs(parse_var("STAGE_TIMEOUT_SECS", 30)?);

        Ok(Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            index_provider,
            pinecone,
            neo4j,
            llm_embedding_model,
            llm_chat_model,
            llm_max_tokens,
            stage_timeout,
        })
    }

    /// Credencial del backend de índice seleccionado.
    pub fn index_credential(&self) -> Option<&str> {
        match self.index_provider {
            IndexProvider::Pinecone => self.pinecone.api_key.as_deref(),
            IndexProvider::Neo4j => self.neo4j.password.as_deref(),
        }
    }

    /// Comprueba que ambas credenciales externas estén presentes.
    ///
    /// Se invoca en cada consulta, antes de cualquier llamada de red.
    pub fn require_credentials(&self) -> Result<(), DiagnosisError> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.index_credential().is_none() {
            missing.push(match self.index_provider {
                IndexProvider::Pinecone => "PINECONE_API_KEY",
                IndexProvider::Neo4j => "NEO4J_PASSWORD",
            });
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DiagnosisError::Configuration(missing.join(", ")))
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {key}: '{raw}'")),
        _ => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        openai_api_key: Some("sk-test".to_string()),
        index_provider: IndexProvider::Pinecone,
        pinecone: PineconeConfig {
            api_key: Some("pc-test".to_string()),
            index_name: "vectorscan-faults".to_string(),
            namespace: String::new(),
            index_host: None,
            control_url: "https://api.pinecone.io".to_string(),
        },
        neo4j: Neo4jConfig {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: None,
            vector_index: "faultEmbeddingIndex".to_string(),
        },
        llm_embedding_model: "text-embedding-ada-002".to_string(),
        llm_chat_model: "gpt-4o-mini".to_string(),
        llm_max_tokens: 500,
        stage_timeout: Duration::from_secs(30),
    }
}
