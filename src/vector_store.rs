//! Recuperación de averías similares sobre un índice vectorial.
//!
//! API pública:
//!   - trait [`FaultIndex`], implementado por Pinecone, Neo4j y el índice en memoria.
//!   - `retrieve_similar_faults(&dyn FaultIndex, &[f64], &ShipScope)`.
//!
//! El ranking lo decide el índice; aquí no se reordena nada.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::UpstreamError;
use crate::models::{HistoricalFaultRecord, RetrievalResult, ScoredFault, ShipScope};

/// Número de averías históricas que se usan como contexto.
pub const TOP_K: usize = 3;

/// Atributo de metadatos que identifica el buque.
pub const SHIP_FIELD: &str = "ship";

/// Filtro de igualdad exacta sobre un atributo de metadatos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub field: String,
    pub equals: String,
}

impl MetadataFilter {
    /// Política de filtrado: sin filtro para `ShipScope::All`, igualdad sobre `ship` en otro caso.
    pub fn for_scope(scope: &ShipScope) -> Option<Self> {
        scope.ship().map(|ship| Self {
            field: SHIP_FIELD.to_string(),
            equals: ship.to_string(),
        })
    }

    /// Igualdad sensible a mayúsculas, sin coincidencias parciales.
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        matches!(metadata.get(&self.field), Some(Value::String(v)) if *v == self.equals)
    }
}

/// Coincidencia en bruto devuelta por un índice.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Map<String, Value>,
}

/// Índice vectorial de sólo lectura con filtrado por metadatos en el servidor.
#[async_trait]
pub trait FaultIndex: Send + Sync {
    /// Nombre legible del backend, para logs y el campo `status`.
    fn backend_name(&self) -> &str;

    /// Devuelve hasta `top_k` coincidencias, de mayor a menor similitud.
    async fn query(
        &self,
        vector: &[f64],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>, UpstreamError>;
}

/// Recupera las `TOP_K` averías más parecidas dentro del alcance indicado.
///
/// Un resultado vacío es válido: significa que no hay contexto disponible.
pub async fn retrieve_similar_faults(
    index: &dyn FaultIndex,
    vector: &[f64],
    scope: &ShipScope,
) -> Result<RetrievalResult, UpstreamError> {
    let filter = MetadataFilter::for_scope(scope);
    let matches = index.query(vector, TOP_K, filter.as_ref()).await?;

    debug!(
        "{} devolvió {} coincidencias (alcance: {})",
        index.backend_name(),
        matches.len(),
        scope
    );

    Ok(matches
        .into_iter()
        .take(TOP_K)
        .map(|m| ScoredFault {
            record: HistoricalFaultRecord::from_metadata(&m.metadata),
            score: m.score,
        })
        .collect())
}

// ---------------------------------------------------------------------
// Índice en memoria
// ---------------------------------------------------------------------

struct StoredFault {
    id: String,
    vector: Vec<f64>,
    metadata: Map<String, Value>,
}

/// Índice en memoria con similitud coseno por fuerza bruta.
///
/// Útil para pruebas y para trabajar sin conexión con un volcado del histórico.
pub struct InMemoryFaultIndex {
    faults: RwLock<Vec<StoredFault>>,
}

impl InMemoryFaultIndex {
    pub fn new() -> Self {
        Self {
            faults: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, id: impl Into<String>, vector: Vec<f64>, metadata: Map<String, Value>) {
        let id = id.into();
        let mut faults = self.faults.write().unwrap_or_else(|e| e.into_inner());
        faults.retain(|f| f.id != id);
        faults.push(StoredFault { id, vector, metadata });
    }

    pub fn len(&self) -> usize {
        self.faults.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryFaultIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaultIndex for InMemoryFaultIndex {
    fn backend_name(&self) -> &str {
        "in-memory"
    }

    async fn query(
        &self,
        vector: &[f64],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>, UpstreamError> {
        let faults = self.faults.read().unwrap_or_else(|e| e.into_inner());

        let mut scored: Vec<IndexMatch> = faults
            .iter()
            .filter(|f| filter.map_or(true, |flt| flt.matches(&f.metadata)))
            .map(|f| IndexMatch {
                id: f.id.clone(),
                score: cosine_sim(vector, &f.vector),
                metadata: f.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine_sim(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if mag_a < f64::EPSILON || mag_b < f64::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(ship: &str, equipment: &str) -> Map<String, Value> {
        json!({ "ship": ship, "equipment": equipment, "fault": "Trip" })
            .as_object()
            .cloned()
            .unwrap()
    }

    fn fleet_index() -> InMemoryFaultIndex {
        let index = InMemoryFaultIndex::new();
        index.insert("a", vec![1.0, 0.0], meta("Iona", "Generator 1"));
        index.insert("b", vec![0.9, 0.1], meta("iona", "Generator 2"));
        index.insert("c", vec![0.8, 0.2], meta("Iona II", "Boiler"));
        index.insert("d", vec![0.7, 0.3], meta("Aurora", "Purifier"));
        index.insert("e", vec![0.6, 0.4], meta("Iona", "Steering gear"));
        index
    }

    #[test]
    fn no_filter_for_fleet_scope() {
        assert_eq!(MetadataFilter::for_scope(&ShipScope::All), None);
        assert_eq!(
            MetadataFilter::for_scope(&ShipScope::Ship("Iona".into())),
            Some(MetadataFilter { field: "ship".into(), equals: "Iona".into() })
        );
    }

    #[tokio::test]
    async fn ship_scope_is_exact_and_case_sensitive() {
        let index = fleet_index();
        let result = retrieve_similar_faults(&index, &[1.0, 0.0], &ShipScope::Ship("Iona".into()))
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|f| f.record.ship.as_deref() == Some("Iona")));
        assert_eq!(result[0].record.equipment, "Generator 1");
    }

    #[tokio::test]
    async fn fleet_scope_returns_at_most_top_k_ranked() {
        let index = fleet_index();
        let result = retrieve_similar_faults(&index, &[1.0, 0.0], &ShipScope::All).await.unwrap();

        assert_eq!(result.len(), TOP_K);
        assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
        let ships: Vec<_> = result.iter().filter_map(|f| f.record.ship.clone()).collect();
        assert_eq!(ships, vec!["Iona", "iona", "Iona II"]);
    }

    #[test]
    fn empty_index_is_not_an_error() {
        let index = InMemoryFaultIndex::new();
        let result = tokio_test::block_on(retrieve_similar_faults(&index, &[1.0], &ShipScope::All));
        assert_eq!(result.unwrap(), Vec::new());
    }

    #[test]
    fn cosine_edge_cases() {
        assert!((cosine_sim(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_sim(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_sim(&[], &[]), 0.0);
        assert_eq!(cosine_sim(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
