use crate::error::IngestError;
use crate::models::{ChunkStrategy, DocumentChunk, IngestionOptions};
use std::collections::VecDeque;

const RECURSIVE_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
    pub strategy: ChunkStrategy,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            size: value.chunk_size,
            overlap: value.chunk_overlap,
            strategy: value.strategy,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig::from(&IngestionOptions::default())
    }
}

/// Splits `text` into chunks of at most `config.size` characters.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    Ok(match config.strategy {
        ChunkStrategy::Fixed => split_fixed(text, config.size, config.overlap),
        ChunkStrategy::Recursive => split_recursive(text, &RECURSIVE_SEPARATORS, config),
    })
}

fn split_fixed(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let position = separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");

    if separator.is_empty() {
        return split_fixed(text, config.size, config.overlap);
    }
    let remaining = &separators[position + 1..];

    let mut chunks = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();
    for piece in text.split(separator).filter(|piece| !piece.is_empty()) {
        if char_len(piece) <= config.size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            chunks.extend(merge_pieces(&fitting, separator, config));
            fitting.clear();
        }
        chunks.extend(split_recursive(piece, remaining, config));
    }
    if !fitting.is_empty() {
        chunks.extend(merge_pieces(&fitting, separator, config));
    }
    chunks
}

/// Greedily joins pieces up to the chunk size, carrying up to `overlap`
/// characters worth of trailing pieces into the next chunk.
fn merge_pieces(pieces: &[&str], separator: &str, config: ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut merged = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let piece_len = char_len(piece);
        let joiner = if window.is_empty() { 0 } else { separator_len };

        if total + piece_len + joiner > config.size && !window.is_empty() {
            push_joined(&mut merged, &window, separator);

            while let Some(front) = window.front() {
                let joiner = if window.is_empty() { 0 } else { separator_len };
                let over_overlap = total > config.overlap;
                let still_too_long = total + piece_len + joiner > config.size;
                if !(over_overlap || still_too_long) {
                    break;
                }
                let front_len = char_len(front);
                let removed = front_len + if window.len() > 1 { separator_len } else { 0 };
                total = total.saturating_sub(removed);
                window.pop_front();
            }
        }

        let joiner = if window.is_empty() { 0 } else { separator_len };
        total += piece_len + joiner;
        window.push_back(piece);
    }

    push_joined(&mut merged, &window, separator);
    merged
}

fn push_joined(target: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        target.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Chunks one page of a document. Returns the chunks and the next free
/// `chunk_index`, so numbering continues across the pages of a document.
pub fn build_chunks(
    source_id: &str,
    page: Option<u32>,
    page_text: &str,
    config: ChunkingConfig,
    first_index: u64,
) -> Result<(Vec<DocumentChunk>, u64), IngestError> {
    let mut cursor = first_index;
    let mut chunks = Vec::new();

    for text in split_text(page_text, config)? {
        if text.trim().is_empty() {
            continue;
        }
        chunks.push(DocumentChunk {
            text,
            source_id: source_id.to_string(),
            page,
            chunk_index: cursor,
        });
        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            size,
            overlap,
            strategy: ChunkStrategy::Fixed,
        }
    }

    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut text = String::new();
        for (index, chunk) in chunks.iter().enumerate() {
            if index == 0 {
                text.push_str(chunk);
            } else {
                text.extend(chunk.chars().skip(overlap));
            }
        }
        text
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_text("", fixed(10, 2)).unwrap().is_empty());
        let recursive = ChunkingConfig {
            strategy: ChunkStrategy::Recursive,
            ..fixed(10, 2)
        };
        assert!(split_text("", recursive).unwrap().is_empty());
    }

    #[test]
    fn fixed_chunks_respect_size_overlap_and_reconstruct() {
        let text = "Attention is all you need, said the paper, and the field listened. \
                    Überall: transformers, encoders, decoders, ÿ and ß included.";
        for (size, overlap) in [(1, 0), (7, 0), (7, 3), (16, 15), (50, 10), (500, 100)] {
            let chunks = split_text(text, fixed(size, overlap)).unwrap();

            assert!(chunks.iter().all(|chunk| chunk.chars().count() <= size));
            for pair in chunks.windows(2) {
                let tail: String = {
                    let chars: Vec<char> = pair[0].chars().collect();
                    chars[chars.len() - overlap..].iter().collect()
                };
                let head: String = pair[1].chars().take(overlap).collect();
                assert_eq!(tail, head, "size={size} overlap={overlap}");
            }
            assert_eq!(reconstruct(&chunks, overlap), text);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "one two three four five six seven eight nine ten";
        let config = fixed(12, 4);
        assert_eq!(split_text(text, config).unwrap(), split_text(text, config).unwrap());
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let result = split_text("abc", fixed(4, 4));
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
        let result = split_text("abc", fixed(0, 0));
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn recursive_chunks_prefer_paragraph_boundaries() {
        let config = ChunkingConfig {
            size: 40,
            overlap: 0,
            strategy: ChunkStrategy::Recursive,
        };
        let text = "First paragraph is short.\n\nSecond paragraph is also short.\n\n\
                    A third paragraph that is long enough to be split across words for sure.";
        let chunks = split_text(text, config).unwrap();

        assert_eq!(chunks[0], "First paragraph is short.");
        assert_eq!(chunks[1], "Second paragraph is also short.");
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 40));
        assert!(chunks.len() > 3);
    }

    #[test]
    fn recursive_chunks_carry_word_overlap() {
        let config = ChunkingConfig {
            size: 20,
            overlap: 6,
            strategy: ChunkStrategy::Recursive,
        };
        let chunks = split_text("alpha beta gamma delta epsilon zeta eta", config).unwrap();

        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 20));
        assert_eq!(chunks[0], "alpha beta gamma");
        assert!(chunks[1].starts_with("gamma"));
    }

    #[test]
    fn recursive_falls_back_to_positional_slicing_for_unbroken_text() {
        let config = ChunkingConfig {
            size: 4,
            overlap: 1,
            strategy: ChunkStrategy::Recursive,
        };
        let chunks = split_text("abcdefghij", config).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn build_chunks_numbers_continue_from_cursor() {
        let (chunks, next) =
            build_chunks("paper.pdf", Some(2), "abcdefghij", fixed(4, 0), 5).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(next, 8);
        assert_eq!(chunks[0].chunk_index, 5);
        assert_eq!(chunks[2].chunk_index, 7);
        assert!(chunks.iter().all(|chunk| chunk.page == Some(2)));
        assert!(chunks.iter().all(|chunk| chunk.source_id == "paper.pdf"));
    }
}
