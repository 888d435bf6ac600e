use crate::traits::VectorIndex;
use crate::{DistanceMetric, IndexSpec, QueryMatch, ServiceError, StoredVectorEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process brute-force index with the same contract as the hosted ones.
/// Stands in for them in tests and local experiments.
#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    spec: Option<IndexSpec>,
    created: usize,
    namespaces: HashMap<String, Vec<StoredVectorEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times an index was actually created.
    pub fn created_count(&self) -> usize {
        self.lock().created
    }

    pub fn len(&self, namespace: Option<&str>) -> usize {
        self.lock()
            .namespaces
            .get(namespace.unwrap_or_default())
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, namespace: Option<&str>) -> bool {
        self.len(namespace) == 0
    }

    pub fn entries(&self, namespace: Option<&str>) -> Vec<StoredVectorEntry> {
        self.lock()
            .namespaces
            .get(namespace.unwrap_or_default())
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), ServiceError> {
        let mut state = self.lock();
        match &state.spec {
            Some(existing) if existing.dimension != spec.dimension => {
                Err(ServiceError::DimensionMismatch {
                    expected: existing.dimension,
                    actual: spec.dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                state.spec = Some(spec.clone());
                state.created += 1;
                Ok(())
            }
        }
    }

    async fn upsert(
        &self,
        entries: &[StoredVectorEntry],
        namespace: Option<&str>,
    ) -> Result<usize, ServiceError> {
        let mut state = self.lock();
        let dimension = state
            .spec
            .as_ref()
            .map(|spec| spec.dimension)
            .ok_or_else(|| ServiceError::NotReady("index has not been created".to_string()))?;

        if let Some(entry) = entries.iter().find(|entry| entry.embedding.len() != dimension) {
            return Err(ServiceError::DimensionMismatch {
                expected: dimension,
                actual: entry.embedding.len(),
            });
        }

        let stored = state
            .namespaces
            .entry(namespace.unwrap_or_default().to_string())
            .or_default();
        for entry in entries {
            match stored.iter_mut().find(|existing| existing.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => stored.push(entry.clone()),
            }
        }

        Ok(entries.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<QueryMatch>, ServiceError> {
        let state = self.lock();
        let Some(spec) = state.spec.as_ref() else {
            return Ok(Vec::new());
        };
        if vector.len() != spec.dimension {
            return Err(ServiceError::DimensionMismatch {
                expected: spec.dimension,
                actual: vector.len(),
            });
        }

        let Some(entries) = state.namespaces.get(namespace.unwrap_or_default()) else {
            return Ok(Vec::new());
        };

        let mut matches = entries
            .iter()
            .map(|entry| QueryMatch {
                id: entry.id.clone(),
                score: similarity(spec.metric, vector, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect::<Vec<_>>();

        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Higher is more similar for every metric, so euclidean distance is negated.
fn similarity(metric: DistanceMetric, left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    match metric {
        DistanceMetric::DotProduct => dot,
        DistanceMetric::Cosine => {
            let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
            let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();
            if left_norm == 0.0 || right_norm == 0.0 {
                0.0
            } else {
                dot / (left_norm * right_norm)
            }
        }
        DistanceMetric::Euclidean => -left
            .iter()
            .zip(right)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt(),
    }
}
