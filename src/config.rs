//! Loading builder configuration from TOML.
//!
//! Every section and field is optional; missing values take the defaults
//! below. Connection secrets (API key) only come from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub generation: GenerationSettings,
  #[serde(default)]
  pub storage: StorageSettings,
  #[serde(default)]
  pub batch: BatchSettings,
}

/// Sampling options forwarded to the generation service. They only affect
/// the remote sampler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
  pub temperature: f32,
  pub max_output_tokens: u32,
  pub top_p: f32,
  pub top_k: u32,
}

impl Default for SamplingConfig {
  fn default() -> Self {
    Self { temperature: 0.7, max_output_tokens: 8192, top_p: 0.95, top_k: 40 }
  }
}

impl SamplingConfig {
  /// Clamp out-of-range values instead of letting the remote service reject
  /// the request.
  pub fn normalized(mut self) -> Self {
    if !(0.0..=1.0).contains(&self.temperature) || self.temperature.is_nan() {
      let clamped = if self.temperature.is_nan() { 0.7 } else { self.temperature.clamp(0.0, 1.0) };
      warn!(target: "generation", temperature = self.temperature, clamped, "temperature out of range");
      self.temperature = clamped;
    }
    if self.max_output_tokens == 0 {
      warn!(target: "generation", "maxOutputTokens must be > 0; using default");
      self.max_output_tokens = SamplingConfig::default().max_output_tokens;
    }
    self
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
  pub base_url: String,
  pub model: String,
  pub timeout_secs: u64,
  pub max_retries: u32,
  pub backoff_ms: u64,
  pub sampling: SamplingConfig,
}

impl Default for GenerationSettings {
  fn default() -> Self {
    Self {
      base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
      model: "gemini-1.5-flash".into(),
      timeout_secs: 30,
      max_retries: 3,
      backoff_ms: 1000,
      sampling: SamplingConfig::default(),
    }
  }
}

impl GenerationSettings {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn backoff(&self) -> Duration {
    Duration::from_millis(self.backoff_ms)
  }

  /// Apply GEMINI_BASE_URL / GEMINI_MODEL overrides.
  pub fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
      self.base_url = url;
    }
    if let Ok(model) = std::env::var("GEMINI_MODEL") {
      self.model = model;
    }
    self
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
  pub capacity_bytes: usize,
  /// Usage ratio above which startup cleanup runs.
  pub cleanup_threshold: f64,
  /// Share of capacity to reclaim when a write hits the quota.
  pub eviction_target_ratio: f64,
}

impl Default for StorageSettings {
  fn default() -> Self {
    Self { capacity_bytes: 4 * 1024 * 1024, cleanup_threshold: 0.8, eviction_target_ratio: 0.3 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
  pub window_size: usize,
  pub inter_window_delay_ms: u64,
}

impl Default for BatchSettings {
  fn default() -> Self {
    Self { window_size: 2, inter_window_delay_ms: 800 }
  }
}

impl BatchSettings {
  pub fn inter_window_delay(&self) -> Duration {
    Duration::from_millis(self.inter_window_delay_ms)
  }
}

/// Attempt to load `AppConfig` from BUILDER_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("BUILDER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "schoolpower_builder", %path, "Loaded builder config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "schoolpower_builder", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "schoolpower_builder", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
