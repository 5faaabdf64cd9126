use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sentvec_core::config::{resolve_with_base, Settings};
use sentvec_core::output::{create_bulk_output_dir, BulkDocument, BULK_FILE_NAME};
use sentvec_core::pipeline::accumulate_bulk;
use sentvec_core::{Embedder, Tokenization};
use sentvec_serve::{BackendSession, BackendSpec, ServedPort};
use tracing::info;

/// Embed whole datasets for several models into `embeddings.json` files.
///
/// One fresh server per model, models processed one after another.
#[derive(Parser, Debug)]
#[command(name = "sentvec-bulk")]
struct Cli {
    /// Model directory names under the model root (repeatable).
    #[arg(long = "model")]
    models: Vec<String>,
    /// Dataset file names under the dataset root (repeatable).
    #[arg(long = "dataset")]
    datasets: Vec<String>,
    #[arg(long)]
    model_root: Option<String>,
    #[arg(long)]
    dataset_root: Option<String>,
    #[arg(long)]
    output_root: Option<String>,
}

struct Plan {
    models: Vec<String>,
    datasets: Vec<String>,
    model_root: PathBuf,
    dataset_root: PathBuf,
    output_root: PathBuf,
}

impl Plan {
    fn from_cli(cli: Cli, settings: &Settings) -> Result<Self> {
        let base = std::env::current_dir().context("cannot determine working directory")?;
        let bulk = &settings.bulk;
        let pick = |given: Vec<String>, configured: &Vec<String>| if given.is_empty() { configured.clone() } else { given };
        let plan = Self {
            models: pick(cli.models, &bulk.models),
            datasets: pick(cli.datasets, &bulk.datasets),
            model_root: resolve_with_base(&base, cli.model_root.as_deref().unwrap_or(&bulk.model_root)),
            dataset_root: resolve_with_base(&base, cli.dataset_root.as_deref().unwrap_or(&bulk.dataset_root)),
            output_root: resolve_with_base(&base, cli.output_root.as_deref().unwrap_or(&bulk.output_root)),
        };
        if plan.models.is_empty() { bail!("no models given (use --model or bulk.models)"); }
        if plan.datasets.is_empty() { bail!("no datasets given (use --dataset or bulk.datasets)"); }
        Ok(plan)
    }
}

fn embed_dataset(embedder: &dyn Embedder, plan: &Plan, model: &str, dataset: &str) -> Result<()> {
    let dir = create_bulk_output_dir(&plan.output_root, dataset, model)?;
    let input = plan.dataset_root.join(dataset);
    let reader = BufReader::new(File::open(&input).with_context(|| format!("cannot open dataset {}", input.display()))?);
    let mut document = BulkDocument::new();
    accumulate_bulk(reader, embedder, Tokenization::Whitespace, &mut document)?;
    let path = dir.join(BULK_FILE_NAME);
    document.write_to(&path)?;
    info!(model, dataset, keys = document.len(), path = %path.display(), "bulk embeddings written");
    Ok(())
}

fn run_model(plan: &Plan, model: &str, settings: &Settings) -> Result<()> {
    let spec = BackendSpec::Served {
        server: ServedPort::SelfManaged,
        model_dir: plan.model_root.join(model),
        pooling: settings.served.pooling_strategy,
        layers: settings.served.pooling_layers.clone(),
    };
    let mut session = BackendSession::open(spec.resolve(settings), settings)?;
    session.run(|embedder| {
        for dataset in &plan.datasets {
            embed_dataset(embedder, plan, model, dataset).with_context(|| format!("model {model}, dataset {dataset}"))?;
        }
        Ok(())
    })?;
    session.close()
}

fn bulk_settings(mut settings: Settings) -> Settings {
    settings.served.max_seq_len = settings.bulk.max_seq_len.clone();
    settings.served.mask_cls_sep = settings.bulk.mask_cls_sep;
    settings
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = bulk_settings(sentvec_cli::init()?);
    let plan = Plan::from_cli(cli, &settings)?;
    for model in &plan.models {
        run_model(&plan, model, &settings)?;
    }
    sentvec_cli::report_success();
    Ok(())
}
