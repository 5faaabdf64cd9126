//! Domain types shared by the pipeline and the embedding backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One input record: two stripped sentences read from a `s1<TAB>s2` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePair {
    pub sentence1: String,
    pub sentence2: String,
}

/// What a backend receives for one sentence.
///
/// Serializes untagged so a served backend sees either a plain string or a
/// list of tokens, which is how the serving front end tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SentenceInput {
    Text(String),
    Tokens(Vec<String>),
}

impl SentenceInput {
    pub fn is_tokenized(&self) -> bool {
        matches!(self, SentenceInput::Tokens(_))
    }

    /// Flattened text form; tokens are joined with single spaces.
    pub fn to_text(&self) -> String {
        match self {
            SentenceInput::Text(text) => text.clone(),
            SentenceInput::Tokens(tokens) => tokens.join(" "),
        }
    }
}

/// How sentences are handed to the backend for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tokenization {
    #[default]
    Raw,
    Whitespace,
}

impl Tokenization {
    pub fn apply(self, sentence: &str) -> SentenceInput {
        match self {
            Tokenization::Raw => SentenceInput::Text(sentence.to_string()),
            Tokenization::Whitespace => {
                let mut tokens: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
                // the server rejects an empty token list
                if tokens.is_empty() { tokens.push(String::new()); }
                SentenceInput::Tokens(tokens)
            }
        }
    }
}

/// The two vectors produced for one `SentencePair`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPair {
    pub vector1: Vec<f32>,
    pub vector2: Vec<f32>,
}

/// Pooling strategies understood by the BERT serving front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PoolingStrategy {
    None,
    #[default]
    ReduceMean,
    ReduceMax,
    ReduceMeanMax,
    FirstToken,
    LastToken,
}

impl PoolingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolingStrategy::None => "NONE",
            PoolingStrategy::ReduceMean => "REDUCE_MEAN",
            PoolingStrategy::ReduceMax => "REDUCE_MAX",
            PoolingStrategy::ReduceMeanMax => "REDUCE_MEAN_MAX",
            PoolingStrategy::FirstToken => "FIRST_TOKEN",
            PoolingStrategy::LastToken => "LAST_TOKEN",
        }
    }
}

impl fmt::Display for PoolingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(PoolingStrategy::None),
            "REDUCE_MEAN" => Ok(PoolingStrategy::ReduceMean),
            "REDUCE_MAX" => Ok(PoolingStrategy::ReduceMax),
            "REDUCE_MEAN_MAX" => Ok(PoolingStrategy::ReduceMeanMax),
            "FIRST_TOKEN" | "CLS_TOKEN" => Ok(PoolingStrategy::FirstToken),
            "LAST_TOKEN" | "SEP_TOKEN" => Ok(PoolingStrategy::LastToken),
            other => Err(Error::InvalidConfig(format!("unknown pooling strategy '{other}'"))),
        }
    }
}

impl TryFrom<String> for PoolingStrategy {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<PoolingStrategy> for String {
    fn from(value: PoolingStrategy) -> Self { value.as_str().to_string() }
}

/// Encoder layers to pool from, counted from the top when negative.
///
/// Given on the command line as `-4,-3,-2,-1`; the serving front end wants
/// them as separate arguments, see [`PoolingLayers::to_args`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PoolingLayers(Vec<i32>);

impl PoolingLayers {
    pub fn new(layers: Vec<i32>) -> crate::error::Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig("pooling layer list is empty".into()));
        }
        Ok(Self(layers))
    }

    /// Just the final encoder layer.
    pub fn last() -> Self { Self(vec![-1]) }

    pub fn layers(&self) -> &[i32] { &self.0 }

    pub fn is_last_layer_only(&self) -> bool { self.0 == [-1] }

    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(i32::to_string).collect()
    }
}

impl Default for PoolingLayers {
    fn default() -> Self { Self(vec![-2]) }
}

impl fmt::Display for PoolingLayers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

impl FromStr for PoolingLayers {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let layers = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<i32>()
                    .map_err(|_| Error::InvalidConfig(format!("pooling layer '{part}' is not an integer")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(layers)
    }
}

impl TryFrom<String> for PoolingLayers {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<PoolingLayers> for String {
    fn from(value: PoolingLayers) -> Self {
        value.0.iter().map(i32::to_string).collect::<Vec<_>>().join(",")
    }
}

/// Lifecycle of one pipeline invocation against a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configured,
    BackendReady,
    Streaming,
    Flushed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Configured => "CONFIGURED",
            SessionState::BackendReady => "BACKEND_READY",
            SessionState::Streaming => "STREAMING",
            SessionState::Flushed => "FLUSHED",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}
