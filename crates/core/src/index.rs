use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{Chunk, Hit};
use tracing::info;

const UNIT_NORM_TOLERANCE: f32 = 1e-3;

pub trait VectorIndex {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensions(&self) -> usize;

    /// Top-`k` chunks by inner product, highest first. Asking for more hits
    /// than are stored returns everything.
    fn search_vector(&self, query_vector: &[f32], k: usize) -> Result<Vec<Hit>, SearchError>;
}

/// Exhaustive inner-product index over unit vectors, stored row-major in
/// one contiguous buffer. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimensions: usize,
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl FlatIndex {
    /// Embeds all chunks in one batch and indexes the result.
    pub fn build<E: Embedder + ?Sized>(chunks: Vec<Chunk>, embedder: &E) -> Result<Self, SearchError> {
        if chunks.is_empty() {
            return Err(SearchError::EmptyCorpus);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        let index = Self::from_embeddings(chunks, embeddings)?;

        info!(
            chunks = index.chunks.len(),
            dimensions = index.dimensions,
            "vector index built"
        );
        Ok(index)
    }

    pub fn from_embeddings(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, SearchError> {
        if chunks.is_empty() {
            return Err(SearchError::EmptyCorpus);
        }
        if chunks.len() != embeddings.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings[0].len();
        if dimensions == 0 {
            return Err(SearchError::InvalidVector("zero-dimensional embedding".to_string()));
        }

        let mut vectors = Vec::with_capacity(dimensions * embeddings.len());
        for (position, embedding) in embeddings.into_iter().enumerate() {
            if embedding.len() != dimensions {
                return Err(SearchError::DimensionMismatch {
                    expected: dimensions,
                    actual: embedding.len(),
                });
            }
            check_unit_norm(&embedding).map_err(|norm| {
                SearchError::InvalidVector(format!(
                    "chunk {} ({}) has norm {norm:.4}",
                    position, chunks[position].chunk_id
                ))
            })?;
            vectors.extend(embedding);
        }

        Ok(Self {
            dimensions,
            vectors,
            chunks,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

fn check_unit_norm(vector: &[f32]) -> Result<(), f32> {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if (norm - 1.0).abs() <= UNIT_NORM_TOLERANCE {
        Ok(())
    } else {
        Err(norm)
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.chunks.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn search_vector(&self, query_vector: &[f32], k: usize) -> Result<Vec<Hit>, SearchError> {
        if self.chunks.is_empty() {
            return Err(SearchError::NotReady("index has no vectors".to_string()));
        }
        if k == 0 {
            return Err(SearchError::Request("k must be at least 1".to_string()));
        }
        if query_vector.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimensions)
            .map(|vector| dot(vector, query_vector).clamp(-1.0, 1.0))
            .enumerate()
            .collect();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| Hit {
                score,
                chunk: self.chunks[position].clone(),
            })
            .collect())
    }
}
