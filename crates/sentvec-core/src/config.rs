use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::types::{PoolingLayers, PoolingStrategy};

/// Env var naming the config profile (`dev`, `prod`, `test`).
pub const ENV_PROFILE: &str = "SENTVEC_ENV";
pub const ENV_PREFIX: &str = "SENTVEC_";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var(ENV_PROFILE).unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("sentvec.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("sentvec.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("sentvec.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("sentvec.test.toml")),
            _ => {}
        }
        // The profile selector itself is not a setting.
        figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["ENV", "LOG", "USE_FAKE_EMBEDDINGS"]).split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }
}

/// Every tunable of the entry points. All fields have defaults, so an absent
/// `sentvec.toml` is fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub served: ServedSettings,
    pub local: LocalSettings,
    pub hosted: HostedSettings,
    pub bulk: BulkSettings,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.served.default_port == 0 || self.served.default_port == u16::MAX {
            anyhow::bail!("served.default_port must leave room for port_out (got {})", self.served.default_port);
        }
        if self.served.startup_timeout_secs == 0 {
            anyhow::bail!("served.startup_timeout_secs must be positive");
        }
        if self.local.hashing_dim == 0 {
            anyhow::bail!("local.hashing_dim must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServedSettings {
    /// Server launcher executable.
    pub program: String,
    pub host: String,
    /// Port used when the caller asks for a fresh server (`"0"`).
    pub default_port: u16,
    /// HTTP front end the client talks to.
    pub http_port: u16,
    pub startup_timeout_secs: u64,
    /// Upper bound for a graceful stop and for the ports to be released.
    pub shutdown_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Asked to shut the server down before it is killed.
    pub terminate_program: Option<String>,
    pub pooling_strategy: PoolingStrategy,
    pub pooling_layers: PoolingLayers,
    /// Passed through verbatim, e.g. `"NONE"` or `"25"`.
    pub max_seq_len: Option<String>,
    pub mask_cls_sep: bool,
    pub cpu: bool,
    pub num_worker: Option<u32>,
}

impl Default for ServedSettings {
    fn default() -> Self {
        Self {
            program: "bert-serving-start".to_string(),
            host: "127.0.0.1".to_string(),
            default_port: 5555,
            http_port: 8125,
            startup_timeout_secs: 300,
            shutdown_timeout_secs: 30,
            request_timeout_secs: 600,
            terminate_program: Some("bert-serving-terminate".to_string()),
            pooling_strategy: PoolingStrategy::ReduceMean,
            pooling_layers: PoolingLayers::default(),
            max_seq_len: None,
            mask_cls_sep: false,
            cpu: true,
            num_worker: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// `auto`, `cpu`, `metal` or `cuda`.
    pub device: String,
    pub max_seq_len: usize,
    pub normalize: bool,
    pub hashing_dim: usize,
}

impl Default for LocalSettings {
    fn default() -> Self { Self { device: "auto".to_string(), max_seq_len: 512, normalize: false, hashing_dim: 768 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostedSettings {
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HostedSettings {
    fn default() -> Self {
        Self { model: "universal-sentence-encoder".to_string(), api_key: None, timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    pub model_root: String,
    pub models: Vec<String>,
    pub dataset_root: String,
    pub datasets: Vec<String>,
    pub output_root: String,
    pub max_seq_len: Option<String>,
    pub mask_cls_sep: bool,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            model_root: "BertPretrainedModels".to_string(),
            models: Vec::new(),
            dataset_root: "preprocessedDatasets".to_string(),
            datasets: Vec::new(),
            output_root: "generatedEmbeddings".to_string(),
            max_seq_len: Some("NONE".to_string()),
            mask_cls_sep: true,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
