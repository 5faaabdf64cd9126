//! Reads streaming-format vector files back and scores each pair by cosine
//! similarity.
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::Error;
use crate::types::VectorPair;

fn parse_vector(field: &str, line: usize) -> Result<Vec<f32>> {
    field
        .split(',')
        .map(|x| {
            x.trim().parse::<f32>().map_err(|e| anyhow::Error::from(Error::MalformedVectors { line, reason: format!("'{x}': {e}") }))
        })
        .collect()
}

/// Parses one `v1<TAB>v2` line. `line` is 1-based and only used in errors.
pub fn parse_vector_line(text: &str, line: usize) -> Result<VectorPair> {
    let mut fields = text.trim_end_matches(['\r', '\n']).split('\t');
    let (Some(first), Some(second)) = (fields.next(), fields.next()) else {
        return Err(Error::MalformedVectors { line, reason: "expected two tab-separated vectors".into() }.into());
    };
    Ok(VectorPair { vector1: parse_vector(first, line)?, vector2: parse_vector(second, line)? })
}

pub fn read_vector_file(path: &Path) -> Result<Vec<VectorPair>> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut pairs = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        pairs.push(parse_vector_line(&line, i + 1)?);
    }
    if pairs.is_empty() {
        anyhow::bail!("the vectors file {} has not been loaded: no vector pairs", path.display());
    }
    Ok(pairs)
}

/// Cosine similarity; 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        anyhow::bail!("vector dimensions differ: {} vs {}", a.len(), b.len());
    }
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y; na += x * x; nb += y * y;
    }
    if na == 0.0 || nb == 0.0 { return Ok(0.0); }
    Ok(dot / (na.sqrt() * nb.sqrt()))
}

pub fn score_vector_file(path: &Path) -> Result<Vec<f64>> {
    read_vector_file(path)?
        .iter()
        .enumerate()
        .map(|(i, pair)| cosine_similarity(&pair.vector1, &pair.vector2).with_context(|| format!("pair on line {}", i + 1)))
        .collect()
}
