//! Diagnóstico de averías a bordo con RAG.
//!
//! Una descripción libre de la avería se convierte en embedding, se buscan
//! averías históricas parecidas en un índice vectorial (opcionalmente sólo
//! las de un buque), y un LLM redacta un diagnóstico estructurado a partir
//! de ese contexto.

pub mod app_state;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod neo4j_client;
pub mod parser;
pub mod pinecone;
pub mod prompt;
pub mod rag;
pub mod vector_store;

pub use app_state::AppState;
pub use error::{DiagnosisError, Stage, UpstreamError};
pub use models::{DiagnosisResponse, FaultQuery, QueryOutcome, ShipScope};
pub use rag::diagnose_fault;
