use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Text,
    TableRow,
    ComplexTableRow,
}

/// One retrievable unit produced by ingestion: a text file, a page of PDF
/// prose, or a single sentence synthesized from a table row or cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    pub kind: DocumentKind,
    pub category: Option<String>,
}

impl Document {
    pub fn text(text: impl Into<String>, source: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            page,
            kind: DocumentKind::Text,
            category: None,
        }
    }

    /// File name of the source, used as the citation title.
    pub fn title(&self) -> String {
        std::path::Path::new(&self.source)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.source.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub text: String,
    pub title: String,
    pub source: String,
    pub page: Option<u32>,
    pub category: Option<String>,
    pub kind: DocumentKind,
}

/// Raw nearest-neighbour result. `score` is the inner product of two unit
/// vectors, so it is a cosine similarity in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub score: f32,
    pub chunk: Chunk,
}

impl Hit {
    /// Cosine similarity mapped onto [0, 1].
    pub fn accuracy(&self) -> f64 {
        ((f64::from(self.score) + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

/// Presentation form of a hit handed to callers and to answer generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedPassage {
    pub score: f64,
    pub title: String,
    pub source: String,
    pub page: Option<u32>,
    pub category: Option<String>,
    pub text: String,
}

impl From<Hit> for RetrievedPassage {
    fn from(hit: Hit) -> Self {
        let score = (hit.accuracy() * 1_000.0).round() / 1_000.0;
        Self {
            score,
            title: hit.chunk.title,
            source: hit.chunk.source,
            page: hit.chunk.page,
            category: hit.chunk.category,
            text: hit.chunk.text,
        }
    }
}

pub const DEFAULT_CATEGORY_PATTERN: &str = r"남자\s*군무원|여자\s*군무원|남군|여군";

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Matches the category label that precedes each table of a table family.
    pub category_pattern: String,
    /// Tried in order after UTF-8 fails.
    pub legacy_encodings: Vec<&'static Encoding>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 150,
            category_pattern: DEFAULT_CATEGORY_PATTERN.to_string(),
            legacy_encodings: vec![encoding_rs::EUC_KR],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> Chunk {
        Chunk {
            chunk_id: "c".to_string(),
            chunk_index: 0,
            text: "text".to_string(),
            title: "a.txt".to_string(),
            source: "/corpus/a.txt".to_string(),
            page: Some(2),
            category: None,
            kind: DocumentKind::Text,
        }
    }

    #[test]
    fn accuracy_maps_cosine_onto_unit_interval() {
        let hit = |score| Hit { score, chunk: chunk() };
        assert_eq!(hit(1.0).accuracy(), 1.0);
        assert_eq!(hit(-1.0).accuracy(), 0.0);
        assert_eq!(hit(0.0).accuracy(), 0.5);
    }

    #[test]
    fn passage_score_is_rounded_to_three_decimals() {
        let passage = RetrievedPassage::from(Hit {
            score: 0.123_456,
            chunk: chunk(),
        });
        assert_eq!(passage.score, 0.562);
        assert_eq!(passage.page, Some(2));
        assert_eq!(passage.title, "a.txt");
    }

    #[test]
    fn document_title_is_file_name() {
        let document = Document::text("x", "/data/raw/law.txt", None);
        assert_eq!(document.title(), "law.txt");
    }
}
