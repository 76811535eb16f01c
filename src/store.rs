//! Size-bounded key-value persistence for built activities.
//!
//! `ActivityStore` is the only place a `StorageError` is caught. Writes that
//! hit the quota trigger one eviction pass and a bounded retry; if that still
//! fails the caller gets `false` and carries on in memory.
//!
//! Eviction metadata is recomputed from the backend's current contents on
//! every call, never cached, so interleaved writers cannot leave it stale.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::config::StorageSettings;
use crate::domain::ActivityType;
use crate::error::StorageError;
use crate::util::approx_entry_bytes;

/// Keys that are never evicted, whatever their prefix says.
pub const PROTECTED_KEYS: &[&str] = &["auth.session", "user_preferences", "app_settings"];

const KEY_PRIORITIES: &[(&str, Priority)] = &[
  ("text_content_", Priority::High),
  ("constructed_", Priority::Medium),
  ("activity_", Priority::Medium),
  ("generated_content_", Priority::Low),
  ("auto_activity_data_", Priority::Low),
];

/// Write attempts after the eviction pass.
const WRITE_RETRIES: u32 = 2;

/// High-priority entries are only touched when low and medium entries free
/// less than this share of the target.
const HIGH_PRIORITY_FLOOR: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  Medium,
  High,
}

/// Eviction bookkeeping for one stored key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
  pub key: String,
  pub size_bytes: usize,
  /// Milliseconds since the Unix epoch.
  pub timestamp: i64,
  pub priority: Priority,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionReport {
  pub removed: Vec<String>,
  pub freed_bytes: usize,
}

/// Synchronous string store with a finite capacity.
pub trait KeyValueBackend: Send {
  fn get(&self, key: &str) -> Option<String>;
  /// Fails with `StorageError::CapacityExceeded` when the write does not fit.
  fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;
  fn remove(&mut self, key: &str) -> Option<String>;
  fn keys(&self) -> Vec<String>;
}

/// In-process backend enforcing the same byte accounting as the store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
  capacity_bytes: usize,
  used_bytes: usize,
  entries: HashMap<String, String>,
}

impl MemoryBackend {
  pub fn with_capacity(capacity_bytes: usize) -> Self {
    Self { capacity_bytes, ..Default::default() }
  }
}

impl KeyValueBackend for MemoryBackend {
  fn get(&self, key: &str) -> Option<String> {
    self.entries.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
    let old = self.entries.get(key).map(|v| approx_entry_bytes(key, v)).unwrap_or(0);
    let new = approx_entry_bytes(key, &value);
    let base = self.used_bytes - old;
    if base + new > self.capacity_bytes {
      return Err(StorageError::CapacityExceeded {
        key: key.to_string(),
        needed: new,
        available: self.capacity_bytes.saturating_sub(base),
      });
    }
    self.used_bytes = base + new;
    self.entries.insert(key.to_string(), value);
    Ok(())
  }

  fn remove(&mut self, key: &str) -> Option<String> {
    let v = self.entries.remove(key)?;
    self.used_bytes -= approx_entry_bytes(key, &v);
    Some(v)
  }

  fn keys(&self) -> Vec<String> {
    self.entries.keys().cloned().collect()
  }
}

pub fn constructed_key(activity_type: ActivityType, activity_id: &str) -> String {
  format!("constructed_{}_{}", activity_type, activity_id)
}

pub fn text_content_key(activity_type: ActivityType, activity_id: &str) -> String {
  format!("text_content_{}_{}", activity_type, activity_id)
}

pub fn priority_for(key: &str) -> Priority {
  KEY_PRIORITIES
    .iter()
    .find(|(prefix, _)| key.starts_with(prefix))
    .map(|(_, p)| *p)
    .unwrap_or(Priority::Low)
}

pub fn is_protected(key: &str) -> bool {
  PROTECTED_KEYS.iter().any(|p| key.contains(p))
}

/// Newest timestamp recorded in a stored JSON value, in epoch millis.
fn stored_timestamp(value: &str) -> Option<i64> {
  let v: Value = serde_json::from_str(value).ok()?;
  let mut ts = v.get("timestamp").and_then(Value::as_i64);
  for field in ["storedAt", "generatedAt", "lastSync"] {
    if let Some(t) = v
      .get(field)
      .and_then(Value::as_str)
      .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
      ts = Some(t.timestamp_millis());
    }
  }
  ts
}

pub struct ActivityStore {
  backend: Box<dyn KeyValueBackend>,
  settings: StorageSettings,
}

impl ActivityStore {
  pub fn new(backend: Box<dyn KeyValueBackend>, settings: StorageSettings) -> Self {
    Self { backend, settings }
  }

  /// Store over a `MemoryBackend` sized from `settings`.
  pub fn in_memory(settings: StorageSettings) -> Self {
    let backend = MemoryBackend::with_capacity(settings.capacity_bytes);
    Self::new(Box::new(backend), settings)
  }

  pub fn capacity_bytes(&self) -> usize {
    self.settings.capacity_bytes
  }

  /// Serialize and persist `value`. `false` means "not persisted"; it is
  /// never an error for the caller.
  #[instrument(level = "debug", skip(self, value), fields(key = %key))]
  pub fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
      Ok(s) => self.save_str(key, s),
      Err(e) => {
        let err = StorageError::Serialize { key: key.to_string(), reason: e.to_string() };
        error!(target: "storage", error = %err, "Not persisted");
        false
      }
    }
  }

  pub fn save_str(&mut self, key: &str, value: String) -> bool {
    match self.backend.set(key, value.clone()) {
      Ok(()) => return true,
      Err(err @ StorageError::CapacityExceeded { .. }) => {
        warn!(target: "storage", %key, error = %err, "Write hit capacity; evicting");
      }
      Err(err) => {
        error!(target: "storage", %key, error = %err, "Write failed; value kept in memory only");
        return false;
      }
    }

    let report = self.evict(self.default_eviction_target());
    debug!(target: "storage", removed = report.removed.len(), freed = report.freed_bytes, "Eviction before retry");

    for attempt in 1..=WRITE_RETRIES {
      match self.backend.set(key, value.clone()) {
        Ok(()) => {
          info!(target: "storage", %key, attempt, "Persisted after eviction");
          return true;
        }
        Err(e) => warn!(target: "storage", %key, attempt, error = %e, "Retry failed"),
      }
    }
    error!(target: "storage", %key, "Giving up; value kept in memory only");
    false
  }

  pub fn get(&self, key: &str) -> Option<String> {
    self.backend.get(key)
  }

  /// Stored JSON decoded as `T`, or `default` when absent or undecodable.
  pub fn get_json<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
    let Some(raw) = self.backend.get(key) else {
      return default;
    };
    match serde_json::from_str(&raw) {
      Ok(v) => v,
      Err(e) => {
        warn!(target: "storage", %key, error = %e, "Stored value did not decode; using default");
        default
      }
    }
  }

  /// Eviction candidates in removal order: lowest priority first, oldest
  /// first within a priority. Protected keys are excluded.
  pub fn entries(&self) -> Vec<StorageEntry> {
    let now = Utc::now().timestamp_millis();
    let mut out: Vec<StorageEntry> = self
      .backend
      .keys()
      .into_iter()
      .filter(|k| !is_protected(k))
      .filter_map(|key| {
        let value = self.backend.get(&key)?;
        Some(StorageEntry {
          size_bytes: approx_entry_bytes(&key, &value),
          timestamp: stored_timestamp(&value).unwrap_or(now),
          priority: priority_for(&key),
          key,
        })
      })
      .collect();
    out.sort_by(|a, b| (a.priority, a.timestamp, &a.key).cmp(&(b.priority, b.timestamp, &b.key)));
    out
  }

  /// Remove entries until `target_free_bytes` have been freed or nothing
  /// evictable remains.
  #[instrument(level = "info", skip(self))]
  pub fn evict(&mut self, target_free_bytes: usize) -> EvictionReport {
    let (disposable, durable): (Vec<_>, Vec<_>) =
      self.entries().into_iter().partition(|e| e.priority != Priority::High);

    let mut report = EvictionReport::default();
    for entry in disposable {
      if report.freed_bytes >= target_free_bytes {
        break;
      }
      self.remove_entry(entry, &mut report);
    }

    let floor = (target_free_bytes as f64 * HIGH_PRIORITY_FLOOR) as usize;
    if report.freed_bytes < floor {
      for entry in durable {
        if report.freed_bytes >= target_free_bytes {
          break;
        }
        self.remove_entry(entry, &mut report);
      }
    }

    info!(
      target: "storage",
      removed = report.removed.len(),
      freed_bytes = report.freed_bytes,
      target_free_bytes,
      "Eviction finished"
    );
    report
  }

  fn remove_entry(&mut self, entry: StorageEntry, report: &mut EvictionReport) {
    if self.backend.remove(&entry.key).is_some() {
      debug!(target: "storage", key = %entry.key, size = entry.size_bytes, priority = ?entry.priority, "Evicted");
      report.freed_bytes += entry.size_bytes;
      report.removed.push(entry.key);
    }
  }

  fn default_eviction_target(&self) -> usize {
    (self.settings.capacity_bytes as f64 * self.settings.eviction_target_ratio) as usize
  }

  pub fn usage_bytes(&self) -> usize {
    self
      .backend
      .keys()
      .iter()
      .filter_map(|k| self.backend.get(k).map(|v| approx_entry_bytes(k, &v)))
      .sum()
  }

  pub fn usage_percent(&self) -> f64 {
    if self.settings.capacity_bytes == 0 {
      return 100.0;
    }
    self.usage_bytes() as f64 / self.settings.capacity_bytes as f64 * 100.0
  }

  /// Preventive eviction when usage is above the cleanup threshold.
  pub fn cleanup_if_needed(&mut self) -> Option<EvictionReport> {
    let percent = self.usage_percent();
    if percent <= self.settings.cleanup_threshold * 100.0 {
      debug!(target: "storage", usage_percent = percent, "Usage within limits");
      return None;
    }
    warn!(target: "storage", usage_percent = percent, "High storage usage; running preventive cleanup");
    Some(self.evict(self.default_eviction_target()))
  }

  /// Remove every key stored for `activity_id` (the id itself or any key
  /// ending in `_<id>`). Protected keys are never touched. Returns how many
  /// were removed.
  pub fn clear_activity(&mut self, activity_id: &str) -> usize {
    if activity_id.is_empty() {
      return 0;
    }
    let suffix = format!("_{activity_id}");
    let keys: Vec<String> = self
      .backend
      .keys()
      .into_iter()
      .filter(|k| !is_protected(k) && (k == activity_id || k.ends_with(&suffix)))
      .collect();
    for k in &keys {
      self.backend.remove(k);
    }
    info!(target: "storage", %activity_id, removed = keys.len(), "Cleared activity data");
    keys.len()
  }
}
