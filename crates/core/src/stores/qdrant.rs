use crate::http::{endpoint, ensure_success};
use crate::traits::VectorIndex;
use crate::{
    DistanceMetric, DocumentChunk, IndexSpec, QueryMatch, ServiceError, StoredVectorEntry,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "qdrant";
const NAMESPACE_FIELD: &str = "namespace";

pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: &str, collection: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            collection: collection.into(),
            api_key: None,
            client: Client::new(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, ServiceError> {
        let url = endpoint(&self.endpoint, path)?;
        let request = self.client.request(method, url);
        Ok(match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        })
    }

    /// Vector size of the collection, or `None` when it does not exist.
    async fn collection_size(&self) -> Result<Option<usize>, ServiceError> {
        let response = self
            .request(reqwest::Method::GET, &format!("collections/{}", self.collection))?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, BACKEND).await?;
        let parsed: Value = response.json().await?;

        parsed
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .map(|size| Some(size as usize))
            .ok_or_else(|| ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "collection info has no vector size".to_string(),
            })
    }
}

fn distance_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::Euclidean => "Euclid",
        DistanceMetric::DotProduct => "Dot",
    }
}

/// Qdrant only accepts integers or UUIDs as point ids, so the entry id is
/// hashed into a stable UUID and kept verbatim in the payload.
fn point_id(entry_id: &str) -> Uuid {
    let digest = Sha256::digest(entry_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), ServiceError> {
        if let Some(size) = self.collection_size().await? {
            if size != spec.dimension {
                return Err(ServiceError::DimensionMismatch {
                    expected: size,
                    actual: spec.dimension,
                });
            }
            return Ok(());
        }

        let response = self
            .request(reqwest::Method::PUT, &format!("collections/{}", self.collection))?
            .json(&json!({
                "vectors": {
                    "size": spec.dimension,
                    "distance": distance_name(spec.metric),
                }
            }))
            .send()
            .await?;
        ensure_success(response, BACKEND).await?;

        info!(
            collection = %self.collection,
            dimension = spec.dimension,
            "created qdrant collection"
        );
        Ok(())
    }

    async fn upsert(
        &self,
        entries: &[StoredVectorEntry],
        namespace: Option<&str>,
    ) -> Result<usize, ServiceError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let points = entries
            .iter()
            .map(|entry| {
                let chunk = &entry.metadata;
                json!({
                    "id": point_id(&entry.id).to_string(),
                    "vector": entry.embedding,
                    "payload": {
                        "entry_id": entry.id,
                        "text": chunk.text,
                        "source": chunk.source_id,
                        "page": chunk.page,
                        "chunk_index": chunk.chunk_index,
                        NAMESPACE_FIELD: namespace.unwrap_or_default(),
                    },
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("collections/{}/points?wait=true", self.collection),
            )?
            .json(&json!({ "points": points }))
            .send()
            .await?;
        ensure_success(response, BACKEND).await?;

        Ok(entries.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<QueryMatch>, ServiceError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("collections/{}/points/search", self.collection),
            )?
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": true,
                "filter": {
                    "must": [{
                        "key": NAMESPACE_FIELD,
                        "match": { "value": namespace.unwrap_or_default() }
                    }]
                },
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(collection = %self.collection, "searching a collection that does not exist");
            return Ok(Vec::new());
        }
        let response = ensure_success(response, BACKEND).await?;

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for hit in hits {
            let payload = hit.get("payload").cloned().unwrap_or(Value::Null);
            let id = payload
                .get("entry_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| match hit.get("id") {
                    Some(Value::String(id)) => Some(id.clone()),
                    Some(Value::Number(id)) => Some(id.to_string()),
                    _ => None,
                })
                .unwrap_or_default();

            result.push(QueryMatch {
                id,
                score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                metadata: DocumentChunk {
                    text: payload
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    source_id: payload
                        .get("source")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown")
                        .to_string(),
                    page: payload
                        .get("page")
                        .and_then(Value::as_u64)
                        .and_then(|page| u32::try_from(page).ok()),
                    chunk_index: payload
                        .get("chunk_index")
                        .and_then(Value::as_u64)
                        .unwrap_or_default(),
                },
            });
        }

        Ok(result)
    }
}
