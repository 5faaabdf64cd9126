//! Plumbing shared by the `sentvec-*` binaries.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sentvec_core::config::{Config, Settings};
use sentvec_core::pipeline::{run_streaming, PipelineStats};
use sentvec_core::{logging, Tokenization, SUCCESS_MARKER};
use sentvec_serve::{BackendSession, BackendSpec};
use tracing::info;

/// Logging plus layered settings; every binary starts here.
pub fn init() -> Result<Settings> {
    logging::init();
    Config::load()?.settings()
}

/// Embeds every pair of `input` into `output` through one backend session.
pub fn stream_file(spec: BackendSpec, settings: &Settings, input: &Path, output: &Path, tokenization: Tokenization) -> Result<PipelineStats> {
    let reader = BufReader::new(File::open(input).with_context(|| format!("cannot open input {}", input.display()))?);

    let mut session = BackendSession::open(spec.resolve(settings), settings)?;
    // created only once the backend is up so a failed start keeps old results
    let stats = session.run(|embedder| {
        let file = File::create(output).with_context(|| format!("cannot create output {}", output.display()))?;
        let mut writer = BufWriter::new(file);
        let stats = run_streaming(reader, &mut writer, embedder, tokenization)?;
        writer.flush().context("failed to flush output")?;
        Ok(stats)
    })?;
    session.close()?;
    info!(records = stats.records, skipped = stats.skipped, output = %output.display(), "vectors written");
    Ok(stats)
}

pub fn report_success() {
    println!("{SUCCESS_MARKER}");
}
