use crate::error::SearchError;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Produces unit-length vectors, so an inner product between two outputs is
/// their cosine similarity. Chunks and queries go through the same call.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| SearchError::Embedding("embedder returned no vector".to_string()))
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        (**self).embed_batch(texts)
    }
}

impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        (**self).embed_batch(texts)
    }
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Hashes character trigrams into a fixed number of buckets. Deterministic
/// and model-free.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        if chars.is_empty() {
            return vector;
        }

        // Texts shorter than a trigram hash as a single token.
        let tokens: Vec<String> = if chars.len() < 3 {
            vec![chars.iter().collect()]
        } else {
            chars.windows(3).map(|window| window.iter().collect()).collect()
        };

        for token in tokens {
            let bucket = (fnv1a(&token) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(feature = "fastembed")]
pub use transformer::FastTextEmbedder;

#[cfg(feature = "fastembed")]
mod transformer {
    use super::{l2_normalize, Embedder};
    use crate::error::SearchError;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Multilingual sentence embeddings. The model is loaded on the first
    /// call and kept for the lifetime of this instance.
    pub struct FastTextEmbedder {
        model_name: EmbeddingModel,
        dimensions: usize,
        model: Mutex<Option<TextEmbedding>>,
    }

    impl FastTextEmbedder {
        pub fn new() -> Self {
            Self::with_model(EmbeddingModel::MultilingualE5Small, 384)
        }

        pub fn with_model(model_name: EmbeddingModel, dimensions: usize) -> Self {
            Self {
                model_name,
                dimensions,
                model: Mutex::new(None),
            }
        }
    }

    impl Default for FastTextEmbedder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Embedder for FastTextEmbedder {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let mut guard = self
                .model
                .lock()
                .map_err(|_| SearchError::Embedding("embedding model lock poisoned".to_string()))?;

            if guard.is_none() {
                tracing::info!(model = ?self.model_name, "loading embedding model");
                let options =
                    InitOptions::new(self.model_name.clone()).with_show_download_progress(true);
                let loaded = TextEmbedding::try_new(options)
                    .map_err(|error| SearchError::Embedding(error.to_string()))?;
                *guard = Some(loaded);
            }

            let model = guard
                .as_mut()
                .ok_or_else(|| SearchError::Embedding("embedding model not loaded".to_string()))?;
            let mut vectors = model
                .embed(texts.to_vec(), None)
                .map_err(|error| SearchError::Embedding(error.to_string()))?;

            for vector in &mut vectors {
                l2_normalize(vector);
            }
            Ok(vectors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CharacterNgramEmbedder, Embedder};

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|value| value * value).sum::<f32>().sqrt()
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("근로기준법 연차 유급휴가").unwrap();
        let second = embedder.embed("근로기준법 연차 유급휴가").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").unwrap();
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn vectors_have_unit_norm() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec![
            "A brown fox jumps.".to_string(),
            "'Name'이(가) 'Kim'인 경우, 세부 내용은 다음과 같습니다: Score: 90.".to_string(),
            "가".to_string(),
            "ok".to_string(),
        ];
        for vector in embedder.embed_batch(&texts).unwrap() {
            assert!((norm(&vector) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn batch_and_single_calls_agree() {
        let embedder = CharacterNgramEmbedder::default();
        let batch = embedder.embed_batch(&["조세특례".to_string()]).unwrap();
        assert_eq!(batch[0], embedder.embed("조세특례").unwrap());
    }
}
