use crate::http::{endpoint, ensure_success};
use crate::traits::VectorIndex;
use crate::{DocumentChunk, IndexSpec, QueryMatch, ServiceError, StoredVectorEntry};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const BACKEND: &str = "pinecone";

/// Serverless placement used when the index has to be created.
#[derive(Debug, Clone)]
pub struct ServerlessPlacement {
    pub cloud: String,
    pub region: String,
}

impl Default for ServerlessPlacement {
    fn default() -> Self {
        Self {
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

pub struct PineconeStore {
    control_url: Url,
    api_key: String,
    index_name: String,
    placement: ServerlessPlacement,
    client: Client,
    host: OnceCell<Url>,
}

impl PineconeStore {
    pub fn new(
        control_url: &str,
        api_key: impl Into<String>,
        index_name: impl Into<String>,
        placement: ServerlessPlacement,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            control_url: Url::parse(control_url)?,
            api_key: api_key.into(),
            index_name: index_name.into(),
            placement,
            client: Client::new(),
            host: OnceCell::new(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexDescription>, ServiceError> {
        let url = endpoint(&self.control_url, "indexes")?;
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = ensure_success(response, BACKEND).await?;
        let parsed: Value = response.json().await?;

        Ok(parsed
            .pointer("/indexes")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(IndexDescription::from_json).collect())
            .unwrap_or_default())
    }

    async fn describe_index(&self) -> Result<Option<IndexDescription>, ServiceError> {
        let url = endpoint(&self.control_url, &format!("indexes/{}", self.index_name))?;
        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, BACKEND).await?;
        let parsed: Value = response.json().await?;

        IndexDescription::from_json(&parsed)
            .map(Some)
            .ok_or_else(|| ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("unreadable index description: {parsed}"),
            })
    }

    /// Data-plane URL of the index, resolved once from the control plane.
    /// `None` when the index does not exist.
    async fn data_url(&self) -> Result<Option<Url>, ServiceError> {
        if let Some(host) = self.host.get() {
            return Ok(Some(host.clone()));
        }

        let Some(description) = self.describe_index().await? else {
            return Ok(None);
        };
        let host = description.data_url()?;
        Ok(Some(self.host.get_or_init(|| async { host }).await.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub host: String,
}

impl IndexDescription {
    fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            name: value.get("name")?.as_str()?.to_string(),
            dimension: usize::try_from(value.get("dimension")?.as_u64()?).ok()?,
            metric: value
                .get("metric")
                .and_then(Value::as_str)
                .unwrap_or("cosine")
                .to_string(),
            host: value
                .get("host")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn data_url(&self) -> Result<Url, ServiceError> {
        if self.host.is_empty() {
            return Err(ServiceError::NotReady(format!(
                "index {} has no host yet",
                self.name
            )));
        }
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            Ok(Url::parse(&self.host)?)
        } else {
            Ok(Url::parse(&format!("https://{}", self.host))?)
        }
    }
}

fn chunk_metadata(chunk: &DocumentChunk) -> Value {
    let mut metadata = Map::new();
    metadata.insert("text".to_string(), json!(chunk.text));
    metadata.insert("source".to_string(), json!(chunk.source_id));
    metadata.insert("chunk_index".to_string(), json!(chunk.chunk_index));
    // Pinecone rejects null metadata values.
    if let Some(page) = chunk.page {
        metadata.insert("page".to_string(), json!(page));
    }
    Value::Object(metadata)
}

/// Numbers come back as floats from the metadata store.
fn metadata_number(metadata: &Value, key: &str) -> Option<u64> {
    let value = metadata.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|number| *number >= 0.0).map(|number| number as u64))
}

fn chunk_from_metadata(metadata: &Value) -> DocumentChunk {
    DocumentChunk {
        text: metadata
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        source_id: metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        page: metadata_number(metadata, "page").and_then(|page| u32::try_from(page).ok()),
        chunk_index: metadata_number(metadata, "chunk_index").unwrap_or_default(),
    }
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), ServiceError> {
        let existing = self
            .list_indexes()
            .await?
            .into_iter()
            .find(|index| index.name == spec.name);

        if let Some(index) = existing {
            if index.dimension != spec.dimension {
                return Err(ServiceError::DimensionMismatch {
                    expected: index.dimension,
                    actual: spec.dimension,
                });
            }
            if index.metric != spec.metric.as_str() {
                warn!(
                    index = %spec.name,
                    existing = %index.metric,
                    requested = %spec.metric,
                    "index exists with a different metric; keeping it"
                );
            }
            debug!(index = %spec.name, "index already exists");
            return Ok(());
        }

        let url = endpoint(&self.control_url, "indexes")?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({
                "name": spec.name,
                "dimension": spec.dimension,
                "metric": spec.metric.as_str(),
                "spec": {
                    "serverless": {
                        "cloud": self.placement.cloud,
                        "region": self.placement.region,
                    }
                },
            }))
            .send()
            .await?;

        // Another caller created it between the listing and our request.
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        ensure_success(response, BACKEND).await?;

        info!(
            index = %spec.name,
            dimension = spec.dimension,
            metric = %spec.metric,
            "created pinecone index"
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

        let base = self.data_url().await?.ok_or_else(|| {
            ServiceError::NotReady(format!("index {} does not exist", self.index_name))
        })?;

        let vectors = entries
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "values": entry.embedding,
                    "metadata": chunk_metadata(&entry.metadata),
                })
            })
            .collect::<Vec<_>>();

        let mut body = json!({ "vectors": vectors });
        if let Some(namespace) = namespace {
            body["namespace"] = json!(namespace);
        }

        let response = self
            .authorized(self.client.post(endpoint(&base, "vectors/upsert")?))
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, BACKEND).await?;

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/upsertedCount")
            .and_then(Value::as_u64)
            .map_or(entries.len(), |count| count as usize))
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<QueryMatch>, ServiceError> {
        let Some(base) = self.data_url().await? else {
            warn!(index = %self.index_name, "querying an index that does not exist");
            return Ok(Vec::new());
        };

        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(namespace) = namespace {
            body["namespace"] = json!(namespace);
        }

        let response = self
            .authorized(self.client.post(endpoint(&base, "query")?))
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, BACKEND).await?;
        let parsed: Value = response.json().await?;

        let hits = parsed
            .pointer("/matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .iter()
            .map(|hit| QueryMatch {
                id: hit
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                metadata: chunk_from_metadata(hit.get("metadata").unwrap_or(&Value::Null)),
            })
            .collect())
    }
}
