use crate::error::{ConfigError, FeedbackError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One slice of a source document, the unit that gets embedded and cited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    pub source_id: String,
    pub page: Option<u32>,
    pub chunk_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredVectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentChunk,
}

impl StoredVectorEntry {
    pub fn new(metadata: DocumentChunk, embedding: Vec<f32>) -> Self {
        let id = format!(
            "{}-{}-{}",
            metadata.source_id,
            metadata.chunk_index,
            Uuid::new_v4()
        );
        Self {
            id,
            embedding,
            metadata,
        }
    }
}

/// A single nearest-neighbour hit. Hosted indexes do not return the stored
/// vector values by default, so only the id, score and metadata are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: DocumentChunk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dotproduct",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "dotproduct" | "dot" => Ok(DistanceMetric::DotProduct),
            other => Err(ConfigError::Invalid {
                name: "INDEX_METRIC",
                details: format!("unsupported metric {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceCitation {
    pub cite: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    /// Set when `answer` carries a pipeline error instead of model output.
    #[serde(default)]
    pub failed: bool,
}

impl AnswerRecord {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            answer: message.into(),
            sources: Vec::new(),
            failed: true,
        }
    }

    /// The model answered but nothing was retrieved to ground it.
    pub fn is_ungrounded(&self) -> bool {
        !self.failed && self.sources.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLabel {
    Yes,
    No,
}

impl FeedbackLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackLabel::Yes => "yes",
            FeedbackLabel::No => "no",
        }
    }
}

impl fmt::Display for FeedbackLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackLabel {
    type Err = FeedbackError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(FeedbackLabel::Yes),
            "no" => Ok(FeedbackLabel::No),
            other => Err(FeedbackError::UnknownLabel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackRow {
    pub id: Uuid,
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub label: FeedbackLabel,
    pub comment: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FineTuneRecord {
    pub prompt: String,
    pub completion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Positional slicing: every chunk starts `size - overlap` characters after the previous one.
    Fixed,
    /// Split on paragraph, line and word boundaries first, then merge pieces up to `size`.
    Recursive,
}

impl FromStr for ChunkStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(ChunkStrategy::Fixed),
            "recursive" => Ok(ChunkStrategy::Recursive),
            other => Err(ConfigError::Invalid {
                name: "CHUNK_STRATEGY",
                details: format!("unsupported strategy {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub strategy: ChunkStrategy,
    pub embed_batch_size: usize,
    pub upsert_batch_size: usize,
    pub namespace: Option<String>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 100,
            strategy: ChunkStrategy::Fixed,
            embed_batch_size: 100,
            upsert_batch_size: 100,
            namespace: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_not_reported_as_ungrounded() {
        let failure = AnswerRecord::failure("Unable to answer: request failed");
        assert!(failure.failed);
        assert!(!failure.is_ungrounded());

        let ungrounded = AnswerRecord {
            answer: "I could not find this in the provided context.".to_string(),
            sources: Vec::new(),
            failed: false,
        };
        assert!(ungrounded.is_ungrounded());
    }

    #[test]
    fn entry_ids_combine_source_position_and_uuid() {
        let chunk = DocumentChunk {
            text: "abc".to_string(),
            source_id: "paper.pdf".to_string(),
            page: Some(1),
            chunk_index: 3,
        };
        let first = StoredVectorEntry::new(chunk.clone(), vec![0.0; 4]);
        let second = StoredVectorEntry::new(chunk, vec![0.0; 4]);

        assert!(first.id.starts_with("paper.pdf-3-"));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("YES".parse::<FeedbackLabel>().ok(), Some(FeedbackLabel::Yes));
        assert_eq!(" no ".parse::<FeedbackLabel>().ok(), Some(FeedbackLabel::No));
        assert!("maybe".parse::<FeedbackLabel>().is_err());
    }

    #[test]
    fn metric_round_trips_through_text() {
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::Euclidean,
            DistanceMetric::DotProduct,
        ] {
            assert_eq!(metric.as_str().parse::<DistanceMetric>().ok(), Some(metric));
        }
    }
}
