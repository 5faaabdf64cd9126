use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sentvec_core::{PoolingLayers, PoolingStrategy, Tokenization};
use sentvec_serve::{BackendSpec, ServedPort};

/// Embed tab-separated sentence pairs with a BERT serving backend.
#[derive(Parser, Debug)]
#[command(name = "sentvec-bert")]
struct Cli {
    /// REDUCE_MEAN, REDUCE_MAX, REDUCE_MEAN_MAX, FIRST_TOKEN (CLS_TOKEN) or LAST_TOKEN (SEP_TOKEN).
    pooling_strategy: PoolingStrategy,
    /// Comma-separated encoder layers, e.g. `-4,-3,-2,-1`.
    #[arg(allow_hyphen_values = true)]
    pooling_layers: PoolingLayers,
    model_dir: PathBuf,
    input: PathBuf,
    output: PathBuf,
    /// `0` starts a fresh server; any other port uses a running one.
    port: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = sentvec_cli::init()?;
    let spec = BackendSpec::Served {
        server: ServedPort::parse(&cli.port)?,
        model_dir: cli.model_dir,
        pooling: cli.pooling_strategy,
        layers: cli.pooling_layers,
    };
    sentvec_cli::stream_file(spec, &settings, &cli.input, &cli.output, Tokenization::Whitespace)?;
    sentvec_cli::report_success();
    Ok(())
}
