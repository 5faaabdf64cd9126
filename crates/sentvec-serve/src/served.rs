//! Client for the BERT serving front end's HTTP `/encode` route.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sentvec_core::{Embedder, Error, SentenceInput};
use tracing::debug;

use crate::lifecycle::Endpoint;

pub struct ServedClient {
    client: Client,
    endpoint: String,
    name: String,
    next_id: AtomicU64,
}

impl ServedClient {
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build serving HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/encode", endpoint.base_url()),
            name: format!("served@{}", endpoint.http_addr()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
    id: u64,
    texts: &'a [SentenceInput],
    is_tokenized: bool,
}

#[derive(Debug, Deserialize)]
struct EncodeResponse {
    #[serde(default)]
    id: Option<u64>,
    result: Vec<Vec<f32>>,
    #[serde(default)]
    status: Option<u16>,
}

impl Embedder for ServedClient {
    fn name(&self) -> &str { &self.name }

    fn dim(&self) -> Option<usize> { None }

    fn embed_batch(&self, inputs: &[SentenceInput]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = EncodeRequest { id, texts: inputs, is_tokenized: inputs.iter().all(SentenceInput::is_tokenized) };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("encode request to {} failed", self.endpoint))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Backend(format!("encode request failed ({status}): {body}")).into());
        }
        let parsed: EncodeResponse = resp.json().context("failed to parse encode response")?;
        if let Some(code) = parsed.status.filter(|c| *c != 200) {
            return Err(Error::Backend(format!("server reported status {code}")).into());
        }
        debug!(id, echoed = ?parsed.id, rows = parsed.result.len(), "encoded batch");
        if parsed.result.len() != inputs.len() {
            return Err(Error::BatchSize { expected: inputs.len(), actual: parsed.result.len() }.into());
        }
        Ok(parsed.result)
    }
}
