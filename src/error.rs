//! Taxonomía de errores del pipeline de diagnóstico.
//!
//! Sólo `Configuration` y `Upstream` abortan una consulta. Una recuperación
//! vacía o una respuesta del LLM mal formada se absorben con valores por
//! defecto y nunca llegan aquí.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Etapas del pipeline, en orden de ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Retrieving,
    Assembling,
    Prompting,
    Completing,
    Parsing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::Assembling => "assembling",
            Stage::Prompting => "prompting",
            Stage::Completing => "completing",
            Stage::Parsing => "parsing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fallo de un proveedor externo (embeddings, índice o completion).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("{stage} provider unreachable: {message}")]
    Unavailable { stage: Stage, message: String },

    #[error("{stage} provider rate-limited the request: {message}")]
    RateLimited { stage: Stage, message: String },

    #[error("{stage} provider returned malformed data: {message}")]
    Malformed { stage: Stage, message: String },

    #[error("{stage} timed out after {limit:?}")]
    Timeout { stage: Stage, limit: Duration },
}

impl UpstreamError {
    pub fn unavailable(stage: Stage, err: impl fmt::Display) -> Self {
        Self::Unavailable { stage, message: err.to_string() }
    }

    pub fn malformed(stage: Stage, message: impl Into<String>) -> Self {
        Self::Malformed { stage, message: message.into() }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Unavailable { stage, .. }
            | Self::RateLimited { stage, .. }
            | Self::Malformed { stage, .. }
            | Self::Timeout { stage, .. } => *stage,
        }
    }
}

/// Error de una invocación del pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiagnosisError {
    /// Falta alguna credencial externa; no se ha hecho ninguna llamada de red.
    #[error("API keys not configured ({0}).")]
    Configuration(String),

    #[error("Fault description is required")]
    EmptyFault,

    #[error("Error during AI query: {0}.")]
    Upstream(#[from] UpstreamError),
}
