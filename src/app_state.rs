use std::sync::Arc;

use anyhow::Result;

use crate::{
    config::{AppConfig, IndexProvider},
    llm::{Completer, Embedder, LlmManager},
    neo4j_client::Neo4jFaultIndex,
    pinecone::PineconeFaultIndex,
    vector_store::FaultIndex,
};

/// Dependencias compartidas durante toda la vida del proceso.
///
/// Los clientes se crean una vez al arrancar y se comparten entre consultas
/// concurrentes; cada consulta sólo los usa por referencia.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn FaultIndex>,
    pub completer: Arc<dyn Completer>,
}

impl AppState {
    /// Construye los clientes reales (OpenAI + índice configurado). No hace llamadas de red.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let llm_manager = Arc::new(LlmManager::from_config(&config));

        let index: Arc<dyn FaultIndex> = match config.index_provider {
            IndexProvider::Pinecone => {
                Arc::new(PineconeFaultIndex::new(&config.pinecone, config.stage_timeout)?)
            }
            IndexProvider::Neo4j => Arc::new(Neo4jFaultIndex::new(&config.neo4j)),
        };

        Ok(Self {
            config,
            embedder: llm_manager.clone(),
            index,
            completer: llm_manager,
        })
    }

    /// Estado con colaboradores inyectados (stubs en pruebas, índices alternativos).
    pub fn with_services(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn FaultIndex>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
            completer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_each_index_backend_without_network() {
        let mut cfg = crate::config::test_config();
        let state = AppState::from_config(cfg.clone()).unwrap();
        assert_eq!(state.index.backend_name(), "Pinecone");

        cfg.index_provider = IndexProvider::Neo4j;
        let state = AppState::from_config(cfg).unwrap();
        assert_eq!(state.index.backend_name(), "Neo4j");
    }
}
