use crate::prompt::build_messages;
use crate::traits::{CompletionModel, Embedder, VectorIndex};
use crate::{AnswerRecord, ServiceError};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_TOP_K: usize = 5;

/// Embeds a question, retrieves the nearest chunks and asks the completion
/// model for an answer that cites them.
pub struct AnswerPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    completion: Arc<dyn CompletionModel>,
    namespace: Option<String>,
}

impl AnswerPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            embedder,
            index,
            completion,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Never fails: any service error becomes the answer text, with no sources.
    pub async fn answer(&self, query: &str, top_k: usize) -> AnswerRecord {
        if query.trim().is_empty() {
            return AnswerRecord::failure("Unable to answer: the question is empty.");
        }

        match self.try_answer(query, top_k).await {
            Ok(record) => record,
            Err(error) => {
                warn!(%error, "answer pipeline failed");
                AnswerRecord::failure(format!("Unable to answer: {error}"))
            }
        }
    }

    async fn try_answer(&self, query: &str, top_k: usize) -> Result<AnswerRecord, ServiceError> {
        let vector = self.embedder.embed(query).await?;
        let matches = if top_k == 0 {
            Vec::new()
        } else {
            self.index
                .query(&vector, top_k, self.namespace.as_deref())
                .await?
        };

        // The model is still asked when nothing was retrieved; its answer
        // then has no grounding, which callers can see from the empty sources.
        if matches.is_empty() {
            warn!("no matching chunks found; answering without context");
        }

        let (messages, sources) = build_messages(query, &matches);
        let answer = self.completion.complete(&messages).await?;
        info!(
            sources = sources.len(),
            model = self.completion.model(),
            "answer generated"
        );

        Ok(AnswerRecord {
            answer,
            sources,
            failed: false,
        })
    }
}
