use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sentvec_core::scoring::score_vector_file;

/// Cosine similarity of every vector pair in a streaming vectors file.
#[derive(Parser, Debug)]
#[command(name = "sentvec-score")]
struct Cli {
    vectors_file: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    sentvec_core::logging::init();
    let scores = score_vector_file(&cli.vectors_file)?;
    let mut out = BufWriter::new(io::stdout().lock());
    for score in &scores {
        writeln!(out, "{score}")?;
    }
    out.flush()?;
    Ok(())
}
