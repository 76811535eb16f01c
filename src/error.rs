//! Error taxonomy of the build pipeline.
//!
//! Only `GenerationError::Transport` is retried. Everything else either
//! sends the build down the fallback path or degrades persistence; none of
//! these reach the UI as a failed build.

/// Failures talking to the generative-language service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
  /// Network failure or timeout before a response arrived. Retryable.
  #[error("transport error: {reason}")]
  Transport { reason: String },

  /// The service answered with a non-success status or an unusable completion.
  #[error("upstream error{}: {message}", fmt_status(.status))]
  Upstream { status: Option<u16>, message: String },
}

impl GenerationError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, GenerationError::Transport { .. })
  }
}

impl From<reqwest::Error> for GenerationError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      GenerationError::Upstream { status: e.status().map(|s| s.as_u16()), message: e.to_string() }
    } else {
      GenerationError::Transport { reason: e.to_string() }
    }
  }
}

fn fmt_status(status: &Option<u16>) -> String {
  status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// The response text did not yield a complete, valid activity payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
  #[error("no JSON value found in response")]
  NoJson,

  #[error("unbalanced delimiters: {opening} opening vs {closing} closing braces")]
  Ambiguous { opening: usize, closing: usize },

  #[error("malformed JSON: {reason}")]
  Malformed { reason: String },

  #[error("missing or empty field `{field}`")]
  MissingField { field: String },

  #[error("`{field}` must be a non-empty list")]
  EmptyList { field: String },

  #[error("invalid item {index} in `{field}`: {reason}")]
  InvalidItem { field: String, index: usize, reason: String },
}

/// Local key-value store failures. Never surfaced past `ActivityStore`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
  #[error("capacity exceeded writing {key}: needs {needed} bytes, {available} available")]
  CapacityExceeded { key: String, needed: usize, available: usize },

  #[error("failed to serialize value for {key}: {reason}")]
  Serialize { key: String, reason: String },
}

/// Why a single activity took the fallback path.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
  #[error(transparent)]
  Generation(#[from] GenerationError),

  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error("no strategy registered for activity type {0}")]
  UnknownType(String),
}

/// Batch-level rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
  #[error("a batch is already running")]
  AlreadyRunning,

  #[error("batch is empty")]
  EmptyBatch,

  #[error("batch task ended abnormally: {0}")]
  Interrupted(String),
}
