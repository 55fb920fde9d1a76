//! Backend Neo4j para [`FaultIndex`]: nodos `:Fault` con su embedding y un
//! índice vectorial sobre `:Fault(embedding)`.
//!
//! El filtro por buque se aplica dentro de la propia consulta Cypher.

use anyhow::Result;
use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{info, warn};
use url::Url;

use crate::config::Neo4jConfig;
use crate::error::{Stage, UpstreamError};
use crate::vector_store::{FaultIndex, IndexMatch, MetadataFilter};

/// Campos de metadatos que se leen de cada nodo `:Fault`.
const FAULT_FIELDS: [&str; 7] = ["equipment", "fault", "cause", "resolution", "date", "id", "ship"];

/// Candidatos extra que se piden al índice cuando hay filtro, ya que
/// `queryNodes` selecciona vecinos antes de aplicar el `WHERE`.
const FILTER_OVERSAMPLING: usize = 20;

pub async fn connect_from_config(cfg: &Neo4jConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let password = cfg.password.as_deref().unwrap_or_default();
    let graph = Graph::new(&addr, &cfg.user, password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Comprueba (sin crearlo) que el índice vectorial exista.
pub async fn verify_fault_vector_index(graph: &Graph, index_name: &str) -> Result<bool> {
    let mut cursor = graph
        .execute(
            query("SHOW VECTOR INDEXES YIELD name WHERE name = $name RETURN name")
                .param("name", index_name),
        )
        .await?;

    let exists = cursor.next().await?.is_some();
    if exists {
        info!("Índice vectorial '{index_name}' disponible.");
    } else {
        warn!("El índice vectorial '{index_name}' no existe; las consultas no devolverán resultados.");
    }
    Ok(exists)
}

/// Índice de averías sobre Neo4j. La conexión se abre en la primera consulta.
pub struct Neo4jFaultIndex {
    cfg: Neo4jConfig,
    graph: OnceCell<Graph>,
}

impl Neo4jFaultIndex {
    pub fn new(cfg: &Neo4jConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            graph: OnceCell::new(),
        }
    }

    async fn graph(&self) -> Result<&Graph, UpstreamError> {
        self.graph
            .get_or_try_init(|| async {
                let graph = connect_from_config(&self.cfg)
                    .await
                    .map_err(|e| UpstreamError::unavailable(Stage::Retrieving, e))?;
                if let Err(e) = verify_fault_vector_index(&graph, &self.cfg.vector_index).await {
                    warn!("No se pudo verificar el índice vectorial: {e}");
                }
                Ok::<Graph, UpstreamError>(graph)
            })
            .await
    }
}

/// Cypher de la búsqueda vectorial, con o sin filtro de igualdad.
fn search_cypher(filtered: bool) -> String {
    let returns = FAULT_FIELDS
        .iter()
        .map(|f| format!("toString(node.{f}) AS {f}"))
        .collect::<Vec<_>>()
        .join(", ");
    let where_clause = if filtered {
        "WHERE node[$filter_field] = $filter_value"
    } else {
        ""
    };

    format!(
        "CALL db.index.vector.queryNodes($index_name, $candidates, $embedding)
         YIELD node, score
         {where_clause}
         RETURN {returns}, score
         ORDER BY score DESC
         LIMIT $k"
    )
}

fn build_search_query(
    index_name: &str,
    vector: &[f64],
    top_k: usize,
    filter: Option<&MetadataFilter>,
) -> Query {
    let candidates = match filter {
        Some(_) => top_k * FILTER_OVERSAMPLING,
        None => top_k,
    };

    let mut q = query(&search_cypher(filter.is_some()))
        .param("index_name", index_name)
        .param("candidates", candidates as i64)
        .param("embedding", vector.to_vec())
        .param("k", top_k as i64);

    if let Some(f) = filter {
        q = q
            .param("filter_field", f.field.as_str())
            .param("filter_value", f.equals.as_str());
    }
    q
}

#[async_trait]
impl FaultIndex for Neo4jFaultIndex {
    fn backend_name(&self) -> &str {
        "Neo4j"
    }

    async fn query(
        &self,
        vector: &[f64],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>, UpstreamError> {
        let graph = self.graph().await?;
        let q = build_search_query(&self.cfg.vector_index, vector, top_k, filter);

        let mut cursor = graph
            .execute(q)
            .await
            .map_err(|e| UpstreamError::unavailable(Stage::Retrieving, e))?;

        let mut output = Vec::new();
        while let Some(row) = cursor
            .next()
            .await
            .map_err(|e| UpstreamError::unavailable(Stage::Retrieving, e))?
        {
            let score: f64 = row
                .get("score")
                .ok_or_else(|| UpstreamError::malformed(Stage::Retrieving, "Falta campo 'score' en resultado de Neo4j"))?;

            let mut metadata = Map::new();
            for field in FAULT_FIELDS {
                if let Some(value) = row.get::<String>(field) {
                    metadata.insert(field.to_string(), Value::String(value));
                }
            }

            let id = metadata
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            output.push(IndexMatch { id, score, metadata });
        }

        Ok(output)
    }
}
