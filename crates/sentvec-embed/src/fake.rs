use std::hash::{Hash, Hasher};

use anyhow::Result;
use sentvec_core::{Embedder, SentenceInput};
use twox_hash::XxHash64;

/// Feature-hashing embedder: whitespace tokens land in `dim` buckets via
/// xxhash, the vector is L2-normalized. Same text, same vector.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str { "hashing" }

    fn dim(&self) -> Option<usize> { Some(self.dim) }

    fn embed_batch(&self, inputs: &[SentenceInput]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|input| self.embed_text(&input.to_text())).collect())
    }
}
