use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sentvec_embed::WordPieceTokenizer;

/// Print the WordPiece tokens of a sentence, space separated.
#[derive(Parser, Debug)]
#[command(name = "sentvec-wordpiece")]
struct Cli {
    vocab_file: PathBuf,
    sentence: String,
    /// Keep case and accents (cased vocabularies).
    #[arg(long)]
    cased: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    sentvec_core::logging::init();
    let tokenizer = WordPieceTokenizer::from_vocab(&cli.vocab_file, !cli.cased)?;
    println!("{}", tokenizer.tokenize_line(&cli.sentence)?);
    Ok(())
}
