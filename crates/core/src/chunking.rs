use crate::error::IngestError;
use crate::models::{Chunk, Document, IngestionOptions};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        let config = Self {
            max_chars,
            overlap_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_size,
            overlap_chars: value.chunk_overlap,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Splits on blank lines. Paragraphs that fit are kept whole; longer ones are
/// cut into `max_chars` windows advancing by `max_chars - overlap_chars`.
pub fn chunk_by_paragraph(text: &str, config: ChunkingConfig) -> Vec<String> {
    let normalized = normalize_line_endings(text);
    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);

    let mut chunks = Vec::new();
    for paragraph in normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
    {
        let chars: Vec<char> = paragraph.chars().collect();
        if chars.len() <= config.max_chars {
            chunks.push(paragraph.to_string());
            continue;
        }

        let mut start = 0;
        while start < chars.len() {
            let end = (start + config.max_chars).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }

    chunks
}

/// Chunks every document and carries its citation metadata onto each chunk.
pub fn build_chunks(
    documents: &[Document],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;
    for document in documents {
        let title = document.title();
        for text in chunk_by_paragraph(&document.text, config) {
            chunks.push(Chunk {
                chunk_id: make_chunk_id(&document.source, document.page, cursor, &text),
                chunk_index: cursor,
                text,
                title: title.clone(),
                source: document.source.clone(),
                page: document.page,
                category: document.category.clone(),
                kind: document.kind,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(source: &str, page: Option<u32>, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.unwrap_or(0).to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentKind;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig::new(max_chars, overlap_chars).unwrap()
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(ChunkingConfig::new(10, 10).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(10, 9).is_ok());
    }

    #[test]
    fn short_paragraphs_stay_whole() {
        let text = "제1조(목적) 이 법은 근로조건의 기준을 정한다.\r\n\r\n제2조(정의) 용어의 뜻은 다음과 같다.";
        let chunks = chunk_by_paragraph(text, config(100, 10));
        assert_eq!(
            chunks,
            vec![
                "제1조(목적) 이 법은 근로조건의 기준을 정한다.",
                "제2조(정의) 용어의 뜻은 다음과 같다.",
            ]
        );
    }

    #[test]
    fn paragraph_at_exact_size_is_one_chunk() {
        let paragraph = "x".repeat(20);
        assert_eq!(chunk_by_paragraph(&paragraph, config(20, 5)), vec![paragraph]);
    }

    #[test]
    fn long_paragraph_is_windowed_with_overlap() {
        let paragraph: String = ('a'..='z').collect();
        let chunks = chunk_by_paragraph(&paragraph, config(10, 4));

        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "ghijklmnop");
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 10));

        let starts: Vec<usize> = chunks
            .iter()
            .map(|chunk| paragraph.find(chunk.as_str()).unwrap())
            .collect();
        assert!(starts.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(starts, vec![0, 6, 12, 18]);
    }

    #[test]
    fn no_window_is_contained_in_the_previous_one() {
        let paragraph: String = ('a'..='z').collect();
        let chunks = chunk_by_paragraph(&paragraph, config(10, 4));

        assert_eq!(chunks.last().map(String::as_str), Some("stuvwxyz"));
        assert!(chunks.windows(2).all(|pair| !pair[0].contains(pair[1].as_str())));
    }

    #[test]
    fn windows_count_characters_not_bytes() {
        let paragraph = "가".repeat(25);
        let chunks = chunk_by_paragraph(&paragraph, config(10, 0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].chars().count(), 5);
    }

    #[test]
    fn chunks_carry_document_metadata() {
        let documents = vec![Document {
            text: "one\n\ntwo".to_string(),
            source: "/corpus/rules.pdf".to_string(),
            page: Some(7),
            kind: DocumentKind::ComplexTableRow,
            category: Some("남군".to_string()),
        }];

        let chunks = build_chunks(&documents, config(50, 5)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[1].title, "rules.pdf");
        assert_eq!(chunks[1].page, Some(7));
        assert_eq!(chunks[1].category.as_deref(), Some("남군"));
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
    }
}
