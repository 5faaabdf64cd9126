use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sentvec_core::{PoolingStrategy, Tokenization};
use sentvec_serve::BackendSpec;

/// Embed tab-separated sentence pairs with a BERT model loaded in-process.
#[derive(Parser, Debug)]
#[command(name = "sentvec-model")]
struct Cli {
    /// Directory with config.json, tokenizer.json and the model weights.
    model_path: PathBuf,
    input: PathBuf,
    output: PathBuf,
    #[arg(long, default_value = "REDUCE_MEAN")]
    pooling_strategy: PoolingStrategy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = sentvec_cli::init()?;
    let spec = BackendSpec::Local { model_dir: cli.model_path, pooling: cli.pooling_strategy };
    sentvec_cli::stream_file(spec, &settings, &cli.input, &cli.output, Tokenization::Raw)?;
    sentvec_cli::report_success();
    Ok(())
}
