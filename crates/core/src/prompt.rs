use crate::{ChatMessage, QueryMatch, SourceCitation};

pub const SOURCE_EXCERPT_CHARS: usize = 200;

const SYSTEM_PROMPT: &str = "You are a careful research assistant. You answer questions about \
research papers using only the numbered context passages you are given, and you cite them.";

/// `[i] <source> (page <p>)`, numbered from 1 in retrieval order.
pub fn citation_label(rank: usize, hit: &QueryMatch) -> String {
    match hit.metadata.page {
        Some(page) => format!("[{rank}] {} (page {page})", hit.metadata.source_id),
        None => format!("[{rank}] {}", hit.metadata.source_id),
    }
}

pub fn build_sources(matches: &[QueryMatch]) -> Vec<SourceCitation> {
    matches
        .iter()
        .enumerate()
        .map(|(position, hit)| SourceCitation {
            cite: citation_label(position + 1, hit),
            content: Some(hit.metadata.text.chars().take(SOURCE_EXCERPT_CHARS).collect()),
        })
        .collect()
}

pub fn build_context(matches: &[QueryMatch]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(position, hit)| format!("[{}] {}", position + 1, hit.metadata.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(query: &str, sources: &[SourceCitation], context: &str) -> String {
    let citations = if sources.is_empty() {
        "(none)".to_string()
    } else {
        sources
            .iter()
            .map(|source| source.cite.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Sources:\n{citations}\n\n\
         Question:\n{query}\n\n\
         Context:\n{context}\n\n\
         Answer the question using only the context above. Do not rely on outside knowledge; \
         if the context does not contain the answer, say so. Cite the passages you use inline \
         by their numbers, for example [1], and end with a line \"Sources: \" listing every \
         source number you cited."
    )
}

pub fn build_messages(
    query: &str,
    matches: &[QueryMatch],
) -> (Vec<ChatMessage>, Vec<SourceCitation>) {
    let sources = build_sources(matches);
    let prompt = build_prompt(query, &sources, &build_context(matches));
    (
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
        sources,
    )
}
