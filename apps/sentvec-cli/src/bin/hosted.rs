use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sentvec_core::Tokenization;
use sentvec_serve::BackendSpec;

/// Embed tab-separated sentence pairs with a hosted sentence encoder.
#[derive(Parser, Debug)]
#[command(name = "sentvec-hosted")]
struct Cli {
    /// Base URL of an OpenAI-compatible embeddings service.
    module_url: String,
    input: PathBuf,
    output: PathBuf,
    /// Overrides `hosted.model` from the configuration.
    #[arg(long)]
    model: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = sentvec_cli::init()?;
    let model = cli.model.unwrap_or_else(|| settings.hosted.model.clone());
    let spec = BackendSpec::Hosted { url: cli.module_url, model };
    sentvec_cli::stream_file(spec, &settings, &cli.input, &cli.output, Tokenization::Raw)?;
    sentvec_cli::report_success();
    Ok(())
}
