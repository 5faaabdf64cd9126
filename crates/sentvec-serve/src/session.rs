use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use sentvec_core::config::Settings;
use sentvec_core::{fake_embeddings_requested, Embedder, PoolingLayers, PoolingStrategy, SessionState};
use sentvec_embed::{DevicePreference, HashingEmbedder, LocalBertEmbedder, LocalOptions};
use tracing::info;

use crate::hosted::HostedEncoder;
use crate::lifecycle::{wait_until_ready, Endpoint, ProcessLauncher, ServedPort, ServerConfig, ServerGuard, ServerLauncher};
use crate::served::ServedClient;

/// Which backend one invocation talks to.
#[derive(Debug, Clone)]
pub enum BackendSpec {
    Served { server: ServedPort, model_dir: PathBuf, pooling: PoolingStrategy, layers: PoolingLayers },
    Local { model_dir: PathBuf, pooling: PoolingStrategy },
    Hosted { url: String, model: String },
    Hashing { dim: usize },
}

impl BackendSpec {
    /// Swaps in the hashing embedder when `SENTVEC_USE_FAKE_EMBEDDINGS` is set.
    pub fn resolve(self, settings: &Settings) -> Self {
        if fake_embeddings_requested() && !matches!(self, Self::Hashing { .. }) {
            info!(dim = settings.local.hashing_dim, "using hashing embedder instead of the configured backend");
            return Self::Hashing { dim: settings.local.hashing_dim };
        }
        self
    }
}

/// One backend connection for one pipeline run.
///
/// `CONFIGURED -> BACKEND_READY -> STREAMING -> FLUSHED -> CLOSED`. A server
/// started here is stopped on close, or on drop if the run failed.
pub struct BackendSession {
    state: SessionState,
    embedder: Box<dyn Embedder>,
    guard: Option<ServerGuard>,
}

impl BackendSession {
    pub fn open(spec: BackendSpec, settings: &Settings) -> Result<Self> {
        Self::open_with(spec, settings, &ProcessLauncher)
    }

    pub fn open_with(spec: BackendSpec, settings: &Settings, launcher: &dyn ServerLauncher) -> Result<Self> {
        let mut state = SessionState::Configured;
        info!(%state, ?spec, "opening backend session");
        let mut guard = None;
        let embedder: Box<dyn Embedder> = match spec {
            BackendSpec::Served { server, model_dir, pooling, layers } => {
                let served = &settings.served;
                let request_timeout = Duration::from_secs(served.request_timeout_secs);
                let endpoint = match server {
                    ServedPort::SelfManaged => {
                        let endpoint = Endpoint::new(&served.host, served.default_port, served.http_port);
                        let config = ServerConfig::from_settings(served, &model_dir, endpoint.clone(), pooling, layers);
                        guard = Some(ServerGuard::start(launcher, &config)?);
                        endpoint
                    }
                    ServedPort::External(port) => {
                        let endpoint = Endpoint::external(&served.host, port);
                        wait_until_ready(&endpoint.http_addr(), None, Duration::from_secs(served.startup_timeout_secs))
                            .with_context(|| format!("external server at {} is not reachable", endpoint.http_addr()))?;
                        endpoint
                    }
                };
                Box::new(ServedClient::connect(&endpoint, request_timeout)?)
            }
            BackendSpec::Local { model_dir, pooling } => {
                let local = &settings.local;
                let options = LocalOptions {
                    device: local.device.parse::<DevicePreference>()?,
                    pooling,
                    layers: PoolingLayers::last(),
                    max_seq_len: local.max_seq_len,
                    normalize: local.normalize,
                };
                Box::new(LocalBertEmbedder::load(&model_dir, options)?)
            }
            BackendSpec::Hosted { url, model } => {
                let hosted = &settings.hosted;
                Box::new(HostedEncoder::new(&url, &model, hosted.api_key.as_deref(), Duration::from_secs(hosted.timeout_secs))?)
            }
            BackendSpec::Hashing { dim } => Box::new(HashingEmbedder::new(dim)),
        };
        state = SessionState::BackendReady;
        info!(%state, backend = embedder.name(), "backend ready");
        Ok(Self { state, embedder, guard })
    }

    pub fn state(&self) -> SessionState { self.state }

    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }

    /// Runs the pipeline body against the backend. The session stays
    /// `STREAMING` if `body` fails.
    pub fn run<T>(&mut self, body: impl FnOnce(&dyn Embedder) -> Result<T>) -> Result<T> {
        self.state = SessionState::Streaming;
        let out = body(self.embedder.as_ref())?;
        self.state = SessionState::Flushed;
        Ok(out)
    }

    /// Stops a server this session started and waits for its ports.
    pub fn close(mut self) -> Result<()> {
        self.state = SessionState::Closed;
        if let Some(guard) = self.guard.take() {
            guard.stop()?;
        }
        info!(state = %self.state, "backend session closed");
        Ok(())
    }
}
