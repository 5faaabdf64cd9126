//! The sentence-pair vectorization pipeline.
//!
//! Both sentences of a record go to the backend in one batch (index 0 is
//! sentence1, index 1 is sentence2). Records are processed strictly in order,
//! one at a time.
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::output::{format_vector_line, BulkDocument};
use crate::pairs::{PairLine, PairReader};
use crate::traits::Embedder;
use crate::types::{SentencePair, Tokenization, VectorPair};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines: usize,
    pub records: usize,
    pub skipped: usize,
}

/// Embeds one record with a single batched backend call.
pub fn embed_pair(embedder: &dyn Embedder, pair: &SentencePair, tokenization: Tokenization) -> Result<VectorPair> {
    let inputs = [tokenization.apply(&pair.sentence1), tokenization.apply(&pair.sentence2)];
    let vectors = embedder.embed_batch(&inputs).with_context(|| format!("backend {} failed to embed pair", embedder.name()))?;
    if vectors.len() != inputs.len() {
        return Err(Error::BatchSize { expected: inputs.len(), actual: vectors.len() }.into());
    }
    let mut it = vectors.into_iter();
    match (it.next(), it.next()) {
        (Some(vector1), Some(vector2)) => Ok(VectorPair { vector1, vector2 }),
        _ => Err(Error::BatchSize { expected: 2, actual: 0 }.into()),
    }
}

fn for_each_record<R, F>(reader: R, embedder: &dyn Embedder, tokenization: Tokenization, mut sink: F) -> Result<PipelineStats>
where
    R: BufRead,
    F: FnMut(&SentencePair, VectorPair) -> Result<()>,
{
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} pairs {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    let mut stats = PipelineStats::default();
    for line in PairReader::new(reader) {
        let line = line.context("failed to read sentence pairs")?;
        stats.lines += 1;
        match line {
            PairLine::Skipped { line } => { stats.skipped += 1; debug!(line, "skipping blank or malformed line"); }
            PairLine::Record(pair) => {
                let vectors = embed_pair(embedder, &pair, tokenization)?;
                sink(&pair, vectors)?;
                stats.records += 1;
                pb.inc(1);
            }
        }
    }
    pb.finish_and_clear();
    Ok(stats)
}

/// Writes one `v1<TAB>v2` line per record and flushes after each, so lines
/// already written survive a later backend failure.
pub fn run_streaming<R: BufRead, W: Write>(reader: R, writer: &mut W, embedder: &dyn Embedder, tokenization: Tokenization) -> Result<PipelineStats> {
    info!(backend = embedder.name(), ?tokenization, "streaming sentence pairs");
    let stats = for_each_record(reader, embedder, tokenization, |_, vectors| {
        writeln!(writer, "{}", format_vector_line(&vectors.vector1, &vectors.vector2)).context("failed to write vectors")?;
        writer.flush().context("failed to flush vectors")?;
        Ok(())
    })?;
    info!(records = stats.records, skipped = stats.skipped, "streaming finished");
    Ok(stats)
}

/// Adds every record of `reader` to `document` as `sentence -> vector`.
pub fn accumulate_bulk<R: BufRead>(reader: R, embedder: &dyn Embedder, tokenization: Tokenization, document: &mut BulkDocument) -> Result<PipelineStats> {
    let before = document.overwritten();
    let stats = for_each_record(reader, embedder, tokenization, |pair, vectors| {
        document.insert(&pair.sentence1, vectors.vector1);
        document.insert(&pair.sentence2, vectors.vector2);
        Ok(())
    })?;
    let overwritten = document.overwritten() - before;
    if overwritten > 0 {
        warn!(overwritten, "duplicate sentences replaced earlier vectors (last write wins)");
    }
    info!(records = stats.records, skipped = stats.skipped, keys = document.len(), "bulk accumulation finished");
    Ok(stats)
}
