use crate::types::SentenceInput;

/// A connected, ready-to-query embedding backend.
///
/// Implementations must return exactly one vector per input, in input order.
pub trait Embedder: Send + Sync {
    /// Short label used in logs (e.g. `served:127.0.0.1:8125`).
    fn name(&self) -> &str;
    /// Vector dimensionality when the backend knows it up front.
    fn dim(&self) -> Option<usize>;
    fn embed_batch(&self, inputs: &[SentenceInput]) -> anyhow::Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn name(&self) -> &str { (**self).name() }
    fn dim(&self) -> Option<usize> { (**self).dim() }
    fn embed_batch(&self, inputs: &[SentenceInput]) -> anyhow::Result<Vec<Vec<f32>>> { (**self).embed_batch(inputs) }
}
