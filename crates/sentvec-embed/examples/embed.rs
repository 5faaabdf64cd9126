use std::path::PathBuf;

use sentvec_core::{Embedder, Tokenization};
use sentvec_embed::{LocalBertEmbedder, LocalOptions};

fn main() -> anyhow::Result<()> {
    let dir = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("models/bert-base-uncased"));
    let embedder = LocalBertEmbedder::load(&dir, LocalOptions::default())?;
    let inputs = vec![Tokenization::Raw.apply("hello world"), Tokenization::Raw.apply("rust embeddings")];
    let embs = embedder.embed_batch(&inputs)?;
    println!("B={} dim={:?}", embs.len(), embedder.dim());
    Ok(())
}
