//! Backend Pinecone para [`FaultIndex`] sobre su API REST.
//!
//! El host del índice se resuelve una sola vez por proceso a través del plano
//! de control (`GET /indexes/{name}`), salvo que venga fijado en la configuración.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::PineconeConfig;
use crate::error::{Stage, UpstreamError};
use crate::vector_store::{FaultIndex, IndexMatch, MetadataFilter};

const API_VERSION: &str = "2024-07";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f64],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

/// Índice Pinecone con el histórico de averías.
pub struct PineconeFaultIndex {
    http: reqwest::Client,
    api_key: Option<String>,
    index_name: String,
    namespace: String,
    control_url: String,
    host: OnceCell<String>,
    timeout: Duration,
}

impl PineconeFaultIndex {
    pub fn new(cfg: &PineconeConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            index_name: cfg.index_name.clone(),
            namespace: cfg.namespace.clone(),
            control_url: cfg.control_url.trim_end_matches('/').to_string(),
            host: OnceCell::new_with(cfg.index_host.as_deref().map(normalize_host)),
            timeout,
        })
    }

    fn transport_error(&self, err: &reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout { stage: Stage::Retrieving, limit: self.timeout }
        } else {
            UpstreamError::unavailable(Stage::Retrieving, err)
        }
    }

    fn api_key(&self) -> Result<&str, UpstreamError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| UpstreamError::unavailable(Stage::Retrieving, "PINECONE_API_KEY not set"))
    }

    async fn host(&self) -> Result<&str, UpstreamError> {
        self.host
            .get_or_try_init(|| self.describe_index())
            .await
            .map(String::as_str)
    }

    async fn describe_index(&self) -> Result<String, UpstreamError> {
        let url = format!("{}/indexes/{}", self.control_url, self.index_name);
        debug!("Resolviendo host del índice Pinecone '{}'", self.index_name);

        let response = self
            .http
            .get(&url)
            .header("Api-Key", self.api_key()?)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let described: DescribeIndexResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::malformed(Stage::Retrieving, e.to_string()))?;

        let host = normalize_host(&described.host);
        info!("Índice Pinecone '{}' servido desde {}", self.index_name, host);
        Ok(host)
    }
}

#[async_trait]
impl FaultIndex for PineconeFaultIndex {
    fn backend_name(&self) -> &str {
        "Pinecone"
    }

    async fn query(
        &self,
        vector: &[f64],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>, UpstreamError> {
        let url = format!("{}/query", self.host().await?);
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.namespace,
            filter: filter.map(pinecone_filter),
        };

        let response = self
            .http
            .post(&url)
            .header("Api-Key", self.api_key()?)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let parsed: QueryResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::malformed(Stage::Retrieving, e.to_string()))?;

        Ok(into_matches(parsed))
    }
}

/// `{"ship": {"$eq": "Iona"}}`
fn pinecone_filter(filter: &MetadataFilter) -> Value {
    let mut condition = Map::new();
    condition.insert(filter.field.clone(), json!({ "$eq": filter.equals }));
    Value::Object(condition)
}

fn into_matches(response: QueryResponse) -> Vec<IndexMatch> {
    response
        .matches
        .into_iter()
        .map(|m| IndexMatch {
            id: m.id,
            score: m.score,
            metadata: m.metadata.unwrap_or_default(),
        })
        .collect()
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("Pinecone API error {status}: {body}");
    Err(if status == StatusCode::TOO_MANY_REQUESTS {
        UpstreamError::RateLimited { stage: Stage::Retrieving, message }
    } else {
        UpstreamError::Unavailable { stage: Stage::Retrieving, message }
    })
}
