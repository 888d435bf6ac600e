use crate::{ChatMessage, IndexSpec, QueryMatch, ServiceError, StoredVectorEntry};
use async_trait::async_trait;

/// Turns text into fixed-length vectors. The length is a property of the
/// model and must match the dimension the index was created with.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the index when absent. An existing index with another
    /// dimension is a configuration error and is left untouched.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), ServiceError>;

    /// Inserts or overwrites entries by id. Returns the number written.
    async fn upsert(
        &self,
        entries: &[StoredVectorEntry],
        namespace: Option<&str>,
    ) -> Result<usize, ServiceError>;

    /// Up to `top_k` nearest entries, most similar first. An empty or
    /// missing index yields an empty list.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<QueryMatch>, ServiceError>;
}
