pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod tables;

pub use answer::{
    answer_question, build_prompt, generator_from_config, Answer, AnswerGenerator, LlmBackend,
    LlmConfig, OllamaGenerator, OpenRouterGenerator,
};
pub use chunking::{build_chunks, chunk_by_paragraph, normalize_whitespace, ChunkingConfig};
#[cfg(feature = "fastembed")]
pub use embeddings::FastTextEmbedder;
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use extractor::{extract_page_contents, ExtractedPdf, PageContent, PdfExtractor, Table};
pub use index::{FlatIndex, VectorIndex};
pub use ingest::{
    discover_corpus_files, load_documents, load_documents_best_effort, read_text_file,
    IngestionReport, SkippedFile,
};
pub use models::{
    Chunk, Document, DocumentKind, Hit, IngestionOptions, RetrievedPassage,
    DEFAULT_CATEGORY_PATTERN,
};
pub use orchestrator::{format_context, Retriever};
pub use tables::{format_time_ranges, translate_table_family, FamilyOutcome};
