//! The default in-process `Embedder` (spec §6.2, §9 "no fabricated
//! dependencies"): a small deterministic hashed bag-of-words embedding.
//! Production deployments swap in a real sentence-embedding model behind
//! the same trait; this default exists so the system is usable, and
//! testable, with zero external services.

use async_trait::async_trait;
use flowforge_core::{Embedder, Result};
use sha2::{Digest, Sha256};

const DIMENSION: usize = 256;

pub struct LocalHashEmbedder {
    dimension: usize,
}

impl Default for LocalHashEmbedder {
    fn default() -> Self {
        Self { dimension: DIMENSION }
    }
}

impl LocalHashEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let mut hasher = Sha256::new();
            hasher.update(token.as_bytes());
            let digest = hasher.finalize();
            let bucket = (u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
                as usize)
                % self.dimension;
            let sign = if digest[4] % 2 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for LocalHashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_yields_identical_vectors() {
        let embedder = LocalHashEmbedder::default();
        let a = embedder.embed(&["ChatOpenAI wraps OpenAI".to_string()]).await.unwrap();
        let b = embedder.embed(&["ChatOpenAI wraps OpenAI".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_yields_different_vectors() {
        let embedder = LocalHashEmbedder::default();
        let a = embedder.embed(&["chat model".to_string()]).await.unwrap();
        let b = embedder.embed(&["vector store".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }
}
