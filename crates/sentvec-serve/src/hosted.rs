//! Hosted sentence encoder behind an OpenAI-compatible `/embeddings` route.
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sentvec_core::{Embedder, Error, SentenceInput};

pub struct HostedEncoder {
    client: Client,
    endpoint: String,
    model: String,
}

impl HostedEncoder {
    pub fn new(module_url: &str, model: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!module_url.trim().is_empty(), "missing module URL");
        anyhow::ensure!(!model.trim().is_empty(), "missing hosted model name");
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let auth = format!("Bearer {key}");
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth).context("invalid API key")?);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build hosted encoder HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", module_url.trim().trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl Embedder for HostedEncoder {
    fn name(&self) -> &str { &self.model }

    fn dim(&self) -> Option<usize> { None }

    fn embed_batch(&self, inputs: &[SentenceInput]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest { model: &self.model, input: inputs.iter().map(SentenceInput::to_text).collect() };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("embeddings request to {} failed", self.endpoint))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Backend(format!("embeddings request failed ({status}): {body}")).into());
        }
        let mut parsed: EmbeddingResponse = resp.json().context("failed to parse embeddings response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(Error::BatchSize { expected: inputs.len(), actual: parsed.data.len() }.into());
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}
