use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::{load_document, DocumentFormat, LoadedDocument};
use crate::traits::{Embedder, VectorIndex};
use crate::{DocumentChunk, IngestError, IngestionOptions, StoredVectorEntry};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Stages an ingestion run moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Idle,
    Loading,
    Splitting,
    Embedding,
    Upserting,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Idle => "idle",
            IngestStage::Loading => "loading",
            IngestStage::Splitting => "splitting",
            IngestStage::Embedding => "embedding",
            IngestStage::Upserting => "upserting",
        };
        f.write_str(name)
    }
}

/// Recursively lists the `.pdf` and `.txt` files under `folder`, sorted.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if DocumentFormat::from_path(entry.path()).is_ok() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub documents: usize,
    pub chunks: usize,
    pub upserted: usize,
    pub skipped_files: Vec<SkippedFile>,
}

/// Loads every supported file under `folder`. A missing folder is not an
/// error: it is logged and produces no documents.
pub fn load_folder(folder: &Path) -> (Vec<LoadedDocument>, Vec<SkippedFile>) {
    if !folder.is_dir() {
        warn!(folder = %folder.display(), "document folder does not exist; nothing to ingest");
        return (Vec::new(), Vec::new());
    }

    let mut documents = Vec::new();
    let mut skipped = Vec::new();
    for path in discover_documents(folder) {
        match load_document(&path) {
            Ok(document) => documents.push(document),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped document");
                skipped.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    (documents, skipped)
}

pub fn chunk_documents(
    documents: &[LoadedDocument],
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    for document in documents {
        let mut cursor = 0u64;
        for page in &document.pages {
            let (page_chunks, next) =
                build_chunks(&document.source_id, page.number, &page.text, config, cursor)?;
            cursor = next;
            chunks.extend(page_chunks);
        }
    }
    Ok(chunks)
}

/// Load, split, embed and upsert. Each stage runs to completion over the
/// whole batch before the next starts; nothing is rolled back on failure.
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    options: IngestionOptions,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            options,
        }
    }

    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        enter(IngestStage::Loading);
        let (documents, skipped_files) = load_folder(folder);

        let mut report = self.ingest_documents(&documents).await?;
        report.skipped_files = skipped_files;
        Ok(report)
    }

    /// Single-file ingestion. Unsupported file types are rejected before
    /// anything is read.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestionReport, IngestError> {
        DocumentFormat::from_path(path)?;
        enter(IngestStage::Loading);
        let document = load_document(path)?;
        self.ingest_documents(std::slice::from_ref(&document)).await
    }

    pub async fn ingest_documents(
        &self,
        documents: &[LoadedDocument],
    ) -> Result<IngestionReport, IngestError> {
        enter(IngestStage::Splitting);
        let chunks = chunk_documents(documents, ChunkingConfig::from(&self.options))?;
        info!(
            documents = documents.len(),
            chunk_count = chunks.len(),
            "documents split into chunks"
        );

        enter(IngestStage::Embedding);
        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.options.embed_batch_size.max(1)) {
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
            let vectors = self.embedder.embed_batch(&texts).await?;
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| StoredVectorEntry::new(chunk, vector)),
            );
        }

        enter(IngestStage::Upserting);
        let namespace = self.options.namespace.as_deref();
        let mut upserted = 0;
        for batch in entries.chunks(self.options.upsert_batch_size.max(1)) {
            upserted += self.index.upsert(batch, namespace).await?;
        }

        enter(IngestStage::Idle);
        info!(chunk_count = chunks.len(), upserted, "ingestion finished");

        Ok(IngestionReport {
            documents: documents.len(),
            chunks: chunks.len(),
            upserted,
            skipped_files: Vec::new(),
        })
    }
}

fn enter(stage: IngestStage) {
    info!(%stage, "ingestion stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PageText;
    use crate::stores::MemoryIndex;
    use crate::{ChunkStrategy, DistanceMetric, HashingEmbedder, IndexSpec};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    async fn pipeline(index: Arc<MemoryIndex>, options: IngestionOptions) -> IngestionPipeline {
        let embedder = HashingEmbedder { dimensions: 64 };
        index
            .ensure_index(&IndexSpec {
                name: "test".to_string(),
                dimension: 64,
                metric: DistanceMetric::Cosine,
            })
            .await
            .unwrap();
        IngestionPipeline::new(Arc::new(embedder), index, options)
    }

    #[test]
    fn discover_documents_is_recursive_and_filters_types() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.txt")).and_then(|mut file| file.write_all(b"text"))?;
        File::create(nested.join("c.docx")).and_then(|mut file| file.write_all(b"ignored"))?;

        let files = discover_documents(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn chunk_indices_continue_across_pages() {
        let document = LoadedDocument {
            source_id: "paper.pdf".to_string(),
            pages: vec![
                PageText {
                    number: Some(1),
                    text: "abcdef".to_string(),
                },
                PageText {
                    number: Some(2),
                    text: "ghij".to_string(),
                },
            ],
        };
        let config = ChunkingConfig {
            size: 4,
            overlap: 0,
            strategy: ChunkStrategy::Fixed,
        };

        let chunks = chunk_documents(&[document], config).unwrap();
        let positions = chunks
            .iter()
            .map(|chunk| (chunk.page, chunk.chunk_index))
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![(Some(1), 0), (Some(1), 1), (Some(2), 2)]);
    }

    #[tokio::test]
    async fn missing_folder_yields_an_empty_report() {
        let index = Arc::new(MemoryIndex::new());
        let pipeline = pipeline(index.clone(), IngestionOptions::default()).await;

        let report = pipeline
            .ingest_folder(Path::new("/definitely/not/here"))
            .await
            .unwrap();

        assert_eq!(report.documents, 0);
        assert_eq!(report.upserted, 0);
        assert!(index.is_empty(None));
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("notes.txt"), "Residual connections ease optimisation.")?;

        let index = Arc::new(MemoryIndex::new());
        let report = pipeline(index.clone(), IngestionOptions::default())
            .await
            .ingest_folder(dir.path())
            .await?;

        assert_eq!(report.documents, 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("broken.pdf")
        );
        assert_eq!(index.len(None), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_upload_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("slides.pptx");
        fs::write(&path, b"not a document")?;

        let index = Arc::new(MemoryIndex::new());
        let result = pipeline(index.clone(), IngestionOptions::default())
            .await
            .ingest_file(&path)
            .await;

        assert!(matches!(result, Err(IngestError::UnsupportedFileType(_))));
        assert!(index.is_empty(None));
        Ok(())
    }

    #[tokio::test]
    async fn reingesting_a_file_duplicates_entries() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Dropout regularises large networks.")?;

        let index = Arc::new(MemoryIndex::new());
        let options = IngestionOptions {
            namespace: Some("papers".to_string()),
            ..IngestionOptions::default()
        };
        let pipeline = pipeline(index.clone(), options).await;
        pipeline.ingest_file(&path).await?;
        pipeline.ingest_file(&path).await?;

        let entries = index.entries(Some("papers"));
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].id, entries[1].id);
        assert_eq!(entries[0].metadata, entries[1].metadata);
        Ok(())
    }

    #[tokio::test]
    async fn small_batches_still_upsert_everything() {
        let index = Arc::new(MemoryIndex::new());
        let options = IngestionOptions {
            chunk_size: 5,
            chunk_overlap: 0,
            embed_batch_size: 2,
            upsert_batch_size: 3,
            ..IngestionOptions::default()
        };
        let document = LoadedDocument {
            source_id: "long.txt".to_string(),
            pages: vec![PageText {
                number: None,
                text: "a".repeat(36),
            }],
        };

        let report = pipeline(index.clone(), options)
            .await
            .ingest_documents(&[document])
            .await
            .unwrap();

        assert_eq!(report.chunks, 8);
        assert_eq!(report.upserted, 8);
        assert_eq!(index.len(None), 8);
    }
}
