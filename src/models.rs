//! Modelos de dominio: consulta de avería, registros históricos y respuesta de diagnóstico.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::DiagnosisError;

/// Valor por defecto para campos de metadatos ausentes en el índice.
pub const MISSING_FIELD: &str = "N/A";

/// Representación vectorial de un texto, tal y como la devuelve el proveedor.
pub type EmbeddingVector = Vec<f64>;

/// Alcance de la búsqueda: toda la flota o un buque concreto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipScope {
    All,
    Ship(String),
}

impl ShipScope {
    /// `None`, cadena en blanco o el centinela `"all"` (sin distinguir mayúsculas)
    /// significan sin restricción. El nombre del buque se guarda tal cual: el
    /// filtro es de igualdad exacta.
    pub fn from_option(scope: Option<&str>) -> Self {
        match scope {
            None => Self::All,
            Some(s) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("all") => Self::All,
            Some(s) => Self::Ship(s.to_string()),
        }
    }

    pub fn ship(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Ship(name) => Some(name.as_str()),
        }
    }
}

impl std::fmt::Display for ShipScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Ship(name) => f.write_str(name),
        }
    }
}

/// Consulta entrante. Vive lo que dura una invocación.
#[derive(Debug, Clone)]
pub struct FaultQuery {
    pub text: String,
    pub scope: ShipScope,
}

impl FaultQuery {
    pub fn new(text: &str, ship: Option<&str>) -> Result<Self, DiagnosisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DiagnosisError::EmptyFault);
        }
        Ok(Self {
            text: text.to_string(),
            scope: ShipScope::from_option(ship),
        })
    }
}

/// Avería histórica tal y como está almacenada en los metadatos del índice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalFaultRecord {
    pub equipment: String,
    pub fault: String,
    pub cause: String,
    pub resolution: String,
    pub date: String,
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship: Option<String>,
}

impl HistoricalFaultRecord {
    /// Construye el registro a partir de un mapa de metadatos abierto.
    /// Los números se convierten a texto; cualquier campo ausente toma su valor centinela.
    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        let field = |key: &str| metadata_string(metadata, key);
        let or_missing = |key: &str| field(key).unwrap_or_else(|| MISSING_FIELD.to_string());

        Self {
            equipment: or_missing("equipment"),
            fault: or_missing("fault"),
            cause: or_missing("cause"),
            resolution: or_missing("resolution"),
            date: or_missing("date"),
            id: field("id"),
            ship: field("ship"),
        }
    }
}

fn metadata_string(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_string(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Pinecone guarda los números como `f64`: `20230401.0` se muestra como `20230401`.
fn number_string(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

/// Registro recuperado junto con su similitud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFault {
    #[serde(flatten)]
    pub record: HistoricalFaultRecord,
    pub score: f64,
}

/// Resultado de la recuperación, ordenado por similitud descendente (máx. K).
pub type RetrievalResult = Vec<ScoredFault>;

/// Respuesta de diagnóstico devuelta al llamante. Los nombres de campo son contrato.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResponse {
    pub fault_title: String,
    pub diagnosis: String,
    pub troubleshooting_steps: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub similar_faults: RetrievalResult,
    pub status: String,
}

/// Carga útil de una invocación: diagnóstico completo o `{ "error": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Diagnosis(DiagnosisResponse),
    Error { error: String },
}

impl QueryOutcome {
    pub fn from_error(err: &DiagnosisError) -> Self {
        Self::Error { error: err.to_string() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ship_scope_sentinels() {
        assert_eq!(ShipScope::from_option(None), ShipScope::All);
        assert_eq!(ShipScope::from_option(Some("all")), ShipScope::All);
        assert_eq!(ShipScope::from_option(Some("All")), ShipScope::All);
        assert_eq!(ShipScope::from_option(Some("  ")), ShipScope::All);
        assert_eq!(ShipScope::from_option(Some(" ALL ")), ShipScope::All);
        assert_eq!(ShipScope::from_option(Some("Iona")), ShipScope::Ship("Iona".to_string()));
    }

    #[test]
    fn ship_names_are_kept_verbatim() {
        assert_eq!(ShipScope::from_option(Some(" Iona")), ShipScope::Ship(" Iona".to_string()));
        assert_eq!(ShipScope::from_option(Some("Iona ")).ship(), Some("Iona "));
    }

    #[test]
    fn fault_query_rejects_blank_text() {
        assert_eq!(FaultQuery::new("   ", None).unwrap_err(), DiagnosisError::EmptyFault);
        let q = FaultQuery::new("  Bilge pump tripped \n", Some("Iona")).unwrap();
        assert_eq!(q.text, "Bilge pump tripped");
        assert_eq!(q.scope.ship(), Some("Iona"));
    }

    #[test]
    fn record_defaults_missing_fields() {
        let metadata = json!({ "equipment": "ME Cylinder 3", "date": 20230401, "ship": "Iona" });
        let record = HistoricalFaultRecord::from_metadata(metadata.as_object().unwrap());

        assert_eq!(record.equipment, "ME Cylinder 3");
        assert_eq!(record.fault, MISSING_FIELD);
        assert_eq!(record.cause, MISSING_FIELD);
        assert_eq!(record.resolution, MISSING_FIELD);
        assert_eq!(record.date, "20230401");
        assert_eq!(record.id, None);
        assert_eq!(record.ship.as_deref(), Some("Iona"));
    }

    #[test]
    fn float_metadata_renders_without_spurious_fraction() {
        let metadata = json!({ "date": 20230401.0, "id": 17.0, "cause": 0.5, "resolution": -3 });
        let record = HistoricalFaultRecord::from_metadata(metadata.as_object().unwrap());

        assert_eq!(record.date, "20230401");
        assert_eq!(record.id.as_deref(), Some("17"));
        assert_eq!(record.cause, "0.5");
        assert_eq!(record.resolution, "-3");
    }

    #[test]
    fn error_outcome_serializes_only_the_error_key() {
        let outcome = QueryOutcome::from_error(&DiagnosisError::Configuration("OPENAI_API_KEY".into()));
        let value = serde_json::to_value(&outcome).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("error"));
        assert!(!obj.contains_key("fault_title"));
    }

    #[test]
    fn similar_faults_are_flattened_with_score() {
        let scored = ScoredFault {
            record: HistoricalFaultRecord {
                equipment: "Generator 2".into(),
                fault: "Overheat".into(),
                cause: "Fouled cooler".into(),
                resolution: "Cleaned cooler".into(),
                date: "2023-04-01".into(),
                id: Some("f1".into()),
                ship: None,
            },
            score: 0.91,
        };
        let value = serde_json::to_value(&scored).unwrap();

        assert_eq!(value["equipment"], "Generator 2");
        assert_eq!(value["id"], "f1");
        assert_eq!(value["score"], 0.91);
        assert!(value.get("ship").is_none());
    }
}
