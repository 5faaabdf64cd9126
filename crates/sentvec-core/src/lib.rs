#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod pairs;
pub mod pipeline;
pub mod scoring;
pub mod traits;
pub mod types;

/// Printed on stdout by every entry point after a fully successful run.
pub const SUCCESS_MARKER: &str = "SCRIPTOK";

/// `SENTVEC_USE_FAKE_EMBEDDINGS=1` swaps every backend for the hashing embedder.
pub const FAKE_EMBEDDINGS_ENV: &str = "SENTVEC_USE_FAKE_EMBEDDINGS";

pub fn fake_embeddings_requested() -> bool {
    std::env::var(FAKE_EMBEDDINGS_ENV)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub use error::Error;
pub use traits::Embedder;
pub use types::{PoolingLayers, PoolingStrategy, SentenceInput, SentencePair, SessionState, Tokenization, VectorPair};
