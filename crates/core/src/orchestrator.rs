use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::index::{FlatIndex, VectorIndex};
use crate::ingest::{load_documents_best_effort, IngestionReport};
use crate::models::{Chunk, Hit, IngestionOptions, RetrievedPassage};
use crate::IngestError;
use std::path::Path;

/// Answers queries against a built index using the embedder that built it.
/// Holds no mutable state, so one instance can serve concurrent callers.
pub struct Retriever<V, E>
where
    V: VectorIndex,
    E: Embedder,
{
    index: V,
    embedder: E,
}

impl<E: Embedder> Retriever<FlatIndex, E> {
    pub fn build(chunks: Vec<Chunk>, embedder: E) -> Result<Self, SearchError> {
        let index = FlatIndex::build(chunks, &embedder)?;
        Ok(Self::new(index, embedder))
    }

    /// Reads, chunks and indexes a corpus folder in one pass.
    pub fn from_folder(
        folder: &Path,
        options: &IngestionOptions,
        embedder: E,
    ) -> Result<(Self, IngestionReport), SearchError> {
        let config = ChunkingConfig::from(options);
        config.validate()?;

        let report = load_documents_best_effort(folder, options)?;
        if report.documents.is_empty() {
            return Err(IngestError::NoDocuments(folder.display().to_string()).into());
        }

        let chunks = build_chunks(&report.documents, config)?;
        let retriever = Self::build(chunks, embedder)?;
        Ok((retriever, report))
    }
}

impl<V, E> Retriever<V, E>
where
    V: VectorIndex,
    E: Embedder,
{
    pub fn new(index: V, embedder: E) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    /// Raw hits with inner-product scores in [-1, 1], best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Hit>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }
        if self.index.is_empty() {
            return Err(SearchError::NotReady("index has no vectors".to_string()));
        }

        let query_vector = self.embedder.embed(query)?;
        self.index.search_vector(&query_vector, k)
    }

    /// Hits rescaled to [0, 1] and flattened for presentation.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>, SearchError> {
        Ok(self
            .search(query, k)?
            .into_iter()
            .map(RetrievedPassage::from)
            .collect())
    }
}

/// Context block handed to answer generation: one block per passage, in the
/// order given, each with a title line, a source line and the passage text.
pub fn format_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|passage| {
            let page = passage
                .page
                .map(|page| format!(" (p.{page})"))
                .unwrap_or_default();
            format!(
                "제목: {}\n출처: {}{}\n{}\n",
                passage.title, passage.source, page, passage.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{DocumentKind, DEFAULT_CATEGORY_PATTERN};
    use std::fs;
    use tempfile::tempdir;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            title: format!("{id}.txt"),
            source: format!("/corpus/{id}.txt"),
            page: None,
            category: None,
            kind: DocumentKind::Text,
        }
    }

    fn write_table_pdf(path: &Path, lines: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
        crate::extractor::fixtures::write_pdf(path, &[Some(lines)])
    }

    #[test]
    fn search_on_empty_index_is_not_ready() {
        let retriever = Retriever::new(FlatIndex::default(), CharacterNgramEmbedder::default());
        let result = retriever.search("연차", 3);
        assert!(matches!(result, Err(SearchError::NotReady(_))));
    }

    #[test]
    fn empty_query_is_rejected() {
        let retriever =
            Retriever::build(vec![chunk("a", "연차 유급휴가")], CharacterNgramEmbedder::default())
                .unwrap();
        assert!(matches!(retriever.search("  ", 1), Err(SearchError::Request(_))));
    }

    #[test]
    fn retrieved_scores_are_ordered_and_rescaled() {
        let retriever = Retriever::build(
            vec![
                chunk("a", "연차 유급휴가는 15일이다."),
                chunk("b", "퇴직금은 계속근로기간 1년에 대하여 30일분 이상이다."),
                chunk("c", "연차 유급휴가의 사용 촉진"),
            ],
            CharacterNgramEmbedder::default(),
        )
        .unwrap();

        let passages = retriever.retrieve("연차 유급휴가", 10).unwrap();

        assert_eq!(passages.len(), 3);
        assert!(passages.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert!(passages
            .iter()
            .all(|passage| (0.0..=1.0).contains(&passage.score)));
        assert_ne!(passages[0].title, "b.txt");
    }

    #[test]
    fn concurrent_retrieval_shares_one_index() {
        let retriever = Retriever::build(
            vec![chunk("a", "근로시간"), chunk("b", "휴게시간")],
            CharacterNgramEmbedder::default(),
        )
        .unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| retriever.retrieve("근로시간", 1).unwrap()))
                .collect();
            for handle in handles {
                let passages = handle.join().unwrap();
                assert_eq!(passages[0].title, "a.txt");
            }
        });
    }

    #[test]
    fn context_lists_title_source_and_text_per_passage() {
        let passages = vec![
            RetrievedPassage {
                score: 0.9,
                title: "law.pdf".to_string(),
                source: "/corpus/law.pdf".to_string(),
                page: Some(3),
                category: None,
                text: "제60조 연차 유급휴가".to_string(),
            },
            RetrievedPassage {
                score: 0.7,
                title: "notes.txt".to_string(),
                source: "/corpus/notes.txt".to_string(),
                page: None,
                category: None,
                text: "메모".to_string(),
            },
        ];

        assert_eq!(
            format_context(&passages),
            "제목: law.pdf\n출처: /corpus/law.pdf (p.3)\n제60조 연차 유급휴가\n\n제목: notes.txt\n출처: /corpus/notes.txt\n메모\n"
        );
    }

    #[test]
    fn end_to_end_text_and_table_corpus() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("fox.txt"), "A brown fox jumps.")?;
        write_table_pdf(&dir.path().join("scores.pdf"), &["Name | Score", "Kim | 90"])?;

        let options = IngestionOptions {
            category_pattern: DEFAULT_CATEGORY_PATTERN.to_string(),
            ..IngestionOptions::default()
        };
        let (retriever, report) =
            Retriever::from_folder(dir.path(), &options, CharacterNgramEmbedder::default())?;

        assert!(report.skipped_files.is_empty());
        assert_eq!(retriever.index().len(), 2);

        let fox = retriever.retrieve("fox", 2)?;
        assert_eq!(fox[0].text, "A brown fox jumps.");
        assert_eq!(fox[0].title, "fox.txt");

        let kim = retriever.retrieve("Kim", 2)?;
        assert_eq!(
            kim[0].text,
            "'Name'이(가) 'Kim'인 경우, 세부 내용은 다음과 같습니다: Score: 90."
        );
        assert_eq!(kim[0].page, Some(1));
        Ok(())
    }
}
