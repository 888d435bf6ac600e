use async_trait::async_trait;
use research_assistant_core::{
    export_positive, AnswerPipeline, ChatMessage, CompletionModel, DistanceMetric, Embedder,
    FeedbackLabel, FeedbackStore, FineTuneRecord, HashingEmbedder, IndexSpec, IngestionOptions,
    IngestionPipeline, LoadedDocument, MemoryIndex, PageText, ServiceError, VectorIndex,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::{Arc, Mutex};

const DIMENSIONS: usize = 256;

const PAGE_ONE: &str = "The transformer replaces recurrence with self-attention, letting every \
token attend to every other token in a single layer.";
const PAGE_TWO: &str = "Training used eight GPUs for three and a half days with a learning rate \
schedule that warms up linearly before decaying.";

#[derive(Default)]
struct EchoModel {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionModel for EchoModel {
    fn model(&self) -> &str {
        "echo"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let prompt = messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt);
        }
        Ok("Self-attention replaces recurrence [1].\nSources: 1".to_string())
    }
}

async fn index() -> Arc<MemoryIndex> {
    let index = Arc::new(MemoryIndex::new());
    index
        .ensure_index(&IndexSpec {
            name: "research-index".to_string(),
            dimension: DIMENSIONS,
            metric: DistanceMetric::Cosine,
        })
        .await
        .expect("index creation");
    index
}

fn two_page_paper() -> LoadedDocument {
    LoadedDocument {
        source_id: "attention.pdf".to_string(),
        pages: vec![
            PageText {
                number: Some(1),
                text: PAGE_ONE.to_string(),
            },
            PageText {
                number: Some(2),
                text: PAGE_TWO.to_string(),
            },
        ],
    }
}

#[tokio::test]
async fn two_page_document_round_trips_through_retrieval() {
    let index = index().await;
    let embedder = Arc::new(HashingEmbedder {
        dimensions: DIMENSIONS,
    });

    let pipeline =
        IngestionPipeline::new(embedder.clone(), index.clone(), IngestionOptions::default());
    let report = pipeline
        .ingest_documents(&[two_page_paper()])
        .await
        .expect("ingestion");
    assert_eq!(report.upserted, 2);

    let mut pages = index
        .entries(None)
        .iter()
        .map(|entry| entry.metadata.page)
        .collect::<Vec<_>>();
    pages.sort();
    assert_eq!(pages, vec![Some(1), Some(2)]);

    let vector = embedder.embed(PAGE_ONE).await.expect("embedding");
    let matches = index.query(&vector, 5, None).await.expect("query");
    assert_eq!(matches[0].metadata.page, Some(1));
    assert_eq!(matches[0].metadata.text, PAGE_ONE);
}

const PDF_PAGE_ONE: &str = "Self attention lets each token attend to all others.";
const PDF_PAGE_TWO: &str = "Training used eight GPUs for three and a half days.";

fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf written");
}

#[tokio::test]
async fn uploaded_pdf_is_indexed_page_by_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("attention.pdf");
    write_pdf(&path, &[PDF_PAGE_ONE, PDF_PAGE_TWO]);

    let index = index().await;
    let embedder = Arc::new(HashingEmbedder {
        dimensions: DIMENSIONS,
    });
    let pipeline =
        IngestionPipeline::new(embedder.clone(), index.clone(), IngestionOptions::default());
    let report = pipeline.ingest_file(&path).await.expect("pdf ingestion");
    assert_eq!(report.documents, 1);
    assert_eq!(report.upserted, 2);

    let mut entries = index
        .entries(None)
        .into_iter()
        .map(|entry| entry.metadata)
        .collect::<Vec<_>>();
    entries.sort_by_key(|chunk| chunk.page);
    assert_eq!(entries[0].page, Some(1));
    assert_eq!(entries[0].source_id, "attention.pdf");
    assert!(entries[0].text.contains("Self attention"));
    assert_eq!(entries[1].page, Some(2));
    assert!(entries[1].text.contains("eight GPUs"));

    let vector = embedder.embed(PDF_PAGE_ONE).await.expect("embedding");
    let matches = index.query(&vector, 2, None).await.expect("query");
    assert_eq!(matches[0].metadata.page, Some(1));
}

#[tokio::test]
async fn answer_cites_the_most_similar_page_first() {
    let index = index().await;
    let embedder = Arc::new(HashingEmbedder {
        dimensions: DIMENSIONS,
    });
    IngestionPipeline::new(embedder.clone(), index.clone(), IngestionOptions::default())
        .ingest_documents(&[two_page_paper()])
        .await
        .expect("ingestion");

    let model = Arc::new(EchoModel::default());
    let record = AnswerPipeline::new(embedder, index, model.clone())
        .answer(PAGE_ONE, 2)
        .await;

    assert_eq!(record.sources.len(), 2);
    assert_eq!(record.sources[0].cite, "[1] attention.pdf (page 1)");
    assert_eq!(record.sources[1].cite, "[2] attention.pdf (page 2)");
    assert!(record.answer.contains("[1]"));

    let prompts = model.prompts.lock().expect("prompts").clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(PAGE_ONE));
    assert!(prompts[0].contains("[1] attention.pdf (page 1)"));
}

#[tokio::test]
async fn positive_feedback_exports_one_redacted_line() {
    let store = FeedbackStore::in_memory().await.expect("store");
    store
        .record_positive("What is X?", "X is Y.", &[])
        .await
        .expect("positive feedback");
    store
        .record_negative("What is Z?", "Unknown.", &[], "wrong paper")
        .await
        .expect("negative feedback");

    let rows = store
        .rows_with_label(FeedbackLabel::Yes)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].label, FeedbackLabel::Yes);

    let mut output = Vec::new();
    let written = export_positive(&store, &mut output).await.expect("export");
    let text = String::from_utf8(output).expect("utf8");

    assert_eq!(written, 1);
    assert_eq!(text.lines().count(), 1);
    let record: FineTuneRecord = serde_json::from_str(text.trim_end()).expect("json line");
    assert!(record.prompt.contains("What is X?"));
    assert!(record.completion.contains("X is Y."));
}

#[tokio::test]
async fn exported_answers_do_not_leak_email_addresses() {
    let store = FeedbackStore::in_memory().await.expect("store");
    store
        .record_positive("How do I reach the author?", "contact me at a@b.com", &[])
        .await
        .expect("positive feedback");

    let mut output = Vec::new();
    export_positive(&store, &mut output).await.expect("export");
    let text = String::from_utf8(output).expect("utf8");

    assert!(!text.contains("a@b.com"));
    assert!(text.contains("[REDACTED_EMAIL]"));
}
