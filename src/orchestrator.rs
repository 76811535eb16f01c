//! Batch construction of activities.
//!
//! A batch moves `Idle -> Running -> Completed | Failed`; each activity moves
//! `Pending -> Generating -> Parsed | FallenBack -> Stored -> Notified`.
//! Activities run in windows of `window_size` concurrent builds, and the stop
//! flag is only checked between windows. Per-activity failures end in the
//! fallback path and never fail the batch; only `stop_batch` does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn, Instrument};

use crate::activities::Registry;
use crate::config::{BatchSettings, SamplingConfig};
use crate::domain::{ActivityRequest, ActivityType, GeneratedActivity};
use crate::error::{BuildError, OrchestratorError};
use crate::events::{BuildEvent, EventBus, EventKind};
use crate::fallback;
use crate::gemini::GenerationClient;
use crate::parser;
use crate::prompt;
use crate::store::{constructed_key, text_content_key, ActivityStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
  Idle,
  Running,
  Completed,
  Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
  Pending,
  Generating,
  Parsed,
  FallenBack,
  Stored,
  Notified,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
  pub completed_count: usize,
  pub total_count: usize,
  pub percentage: f64,
}

/// What happened to one activity of a batch.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutcome {
  pub activity_id: String,
  pub activity_type: ActivityType,
  pub title: String,
  pub is_fallback: bool,
  pub persisted: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
  pub status: BatchStatus,
  pub total: usize,
  pub parsed_count: usize,
  pub fallback_count: usize,
  /// In completion order.
  pub results: Vec<BuildOutcome>,
}

struct Tracker {
  status: BatchStatus,
  total: usize,
  completed: usize,
  activities: HashMap<String, ActivityState>,
}

impl Tracker {
  fn idle() -> Self {
    Self { status: BatchStatus::Idle, total: 0, completed: 0, activities: HashMap::new() }
  }

  fn progress(&self) -> BatchProgress {
    let percentage = if self.total == 0 { 0.0 } else { self.completed as f64 * 100.0 / self.total as f64 };
    BatchProgress { completed_count: self.completed, total_count: self.total, percentage }
  }
}

/// Clears the running flag however the batch ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

pub struct BuildOrchestrator {
  registry: Arc<Registry>,
  client: Arc<dyn GenerationClient>,
  store: Arc<Mutex<ActivityStore>>,
  bus: EventBus,
  sampling: SamplingConfig,
  batch: BatchSettings,
  running: AtomicBool,
  stop_requested: AtomicBool,
  tracker: RwLock<Tracker>,
}

impl BuildOrchestrator {
  pub fn new(
    registry: Arc<Registry>,
    client: Arc<dyn GenerationClient>,
    store: Arc<Mutex<ActivityStore>>,
    bus: EventBus,
    sampling: SamplingConfig,
    batch: BatchSettings,
  ) -> Self {
    Self {
      registry,
      client,
      store,
      bus,
      sampling,
      batch,
      running: AtomicBool::new(false),
      stop_requested: AtomicBool::new(false),
      tracker: RwLock::new(Tracker::idle()),
    }
  }

  pub fn bus(&self) -> &EventBus {
    &self.bus
  }

  pub fn store(&self) -> &Arc<Mutex<ActivityStore>> {
    &self.store
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst)
  }

  pub async fn status(&self) -> BatchStatus {
    self.tracker.read().await.status
  }

  pub async fn progress(&self) -> BatchProgress {
    self.tracker.read().await.progress()
  }

  pub async fn activity_state(&self, activity_id: &str) -> Option<ActivityState> {
    self.tracker.read().await.activities.get(activity_id).copied()
  }

  /// Ask the running batch to skip its remaining windows. Returns false when
  /// no batch is running.
  pub fn stop_batch(&self) -> bool {
    if !self.is_running() {
      return false;
    }
    self.stop_requested.store(true, Ordering::SeqCst);
    info!(target: "build", "Stop requested; remaining windows will be skipped");
    true
  }

  /// Build every request and wait for the batch to finish. A second call
  /// while a batch runs is rejected, not queued.
  ///
  /// The batch runs on its own task: dropping the returned future stops the
  /// wait, not the batch.
  #[instrument(level = "info", skip(self, requests), fields(total = requests.len()))]
  pub async fn start_batch(self: &Arc<Self>, requests: Vec<ActivityRequest>) -> Result<BatchSummary, OrchestratorError> {
    if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
      warn!(target: "build", "Rejected batch: another batch is running");
      return Err(OrchestratorError::AlreadyRunning);
    }
    if requests.is_empty() {
      self.running.store(false, Ordering::SeqCst);
      return Err(OrchestratorError::EmptyBatch);
    }
    self.stop_requested.store(false, Ordering::SeqCst);

    let this = Arc::clone(self);
    let batch = tokio::spawn(
      async move {
        let _guard = RunningGuard(&this.running);
        this.run_batch(requests).await
      }
      .in_current_span(),
    );
    batch.await.map_err(|e| {
      error!(target: "build", error = %e, "Batch task ended abnormally");
      OrchestratorError::Interrupted(e.to_string())
    })
  }

  async fn run_batch(self: &Arc<Self>, requests: Vec<ActivityRequest>) -> BatchSummary {
    let total = requests.len();
    {
      let mut t = self.tracker.write().await;
      *t = Tracker {
        status: BatchStatus::Running,
        total,
        completed: 0,
        activities: requests.iter().map(|r| (r.activity_id.clone(), ActivityState::Pending)).collect(),
      };
    }
    info!(target: "build", total, window_size = self.batch.window_size, "Batch started");

    let mut results = Vec::with_capacity(total);
    for (w, window) in requests.chunks(self.batch.window_size.max(1)).enumerate() {
      if w > 0 {
        if self.stop_requested.load(Ordering::SeqCst) {
          break;
        }
        tokio::time::sleep(self.batch.inter_window_delay()).await;
        if self.stop_requested.load(Ordering::SeqCst) {
          break;
        }
      }

      let mut set = JoinSet::new();
      for req in window.iter().cloned() {
        let this = Arc::clone(self);
        set.spawn(async move { this.build_activity(req).await });
      }
      while let Some(joined) = set.join_next().await {
        match joined {
          Ok((_, outcome)) => results.push(outcome),
          Err(e) => error!(target: "build", error = %e, "Activity task aborted"),
        }
      }
    }

    let status = if self.stop_requested.load(Ordering::SeqCst) { BatchStatus::Failed } else { BatchStatus::Completed };
    self.tracker.write().await.status = status;

    let summary = BatchSummary {
      status,
      total,
      parsed_count: results.iter().filter(|r| !r.is_fallback).count(),
      fallback_count: results.iter().filter(|r| r.is_fallback).count(),
      results,
    };
    info!(
      target: "build",
      status = ?summary.status,
      built = summary.results.len(),
      parsed = summary.parsed_count,
      fallback = summary.fallback_count,
      "Batch finished"
    );

    let mut done = BuildEvent::new(EventKind::BatchCompleted);
    done.success = Some(status == BatchStatus::Completed);
    done.batch_results = Some(summary.clone());
    done.progress = Some(self.progress().await);
    self.bus.emit(&done);
    summary
  }

  /// Build one activity outside any batch.
  pub async fn build_one(&self, request: ActivityRequest) -> (GeneratedActivity, BuildOutcome) {
    self.build_activity(request).await
  }

  #[instrument(level = "info", skip(self, request), fields(activity_id = %request.activity_id, activity_type = %request.activity_type))]
  async fn build_activity(&self, request: ActivityRequest) -> (GeneratedActivity, BuildOutcome) {
    let title = request.display_title();
    self.transition(&request.activity_id, ActivityState::Generating).await;
    let mut started = BuildEvent::new(EventKind::ConstructionStarted);
    started.activity_id = Some(request.activity_id.clone());
    started.activity_title = Some(title.clone());
    self.bus.emit(&started);

    let (activity, build_error) = match self.generate(&request).await {
      Ok(a) => {
        self.transition(&request.activity_id, ActivityState::Parsed).await;
        (a, None)
      }
      Err(e) => {
        warn!(target: "build", error = %e, "Generation failed; using fallback");
        let a = fallback::synthesize(&self.registry, &request);
        self.transition(&request.activity_id, ActivityState::FallenBack).await;
        (a, Some(e.to_string()))
      }
    };

    let persisted = self.persist(&activity).await;
    self.transition(&request.activity_id, ActivityState::Stored).await;

    let mut built = BuildEvent::new(EventKind::ActivityBuilt);
    built.activity_id = Some(request.activity_id.clone());
    built.activity_title = Some(title.clone());
    built.success = Some(true);
    built.content = Some(activity.clone());
    built.error = build_error.clone();
    self.bus.emit(&built);
    self.transition(&request.activity_id, ActivityState::Notified).await;

    let outcome = BuildOutcome {
      activity_id: request.activity_id,
      activity_type: request.activity_type,
      title,
      is_fallback: activity.is_fallback,
      persisted,
      error: build_error,
    };
    (activity, outcome)
  }

  async fn generate(&self, request: &ActivityRequest) -> Result<GeneratedActivity, BuildError> {
    let prompt = prompt::build(&self.registry, request.activity_type, &request.form_fields)?;
    let strategy = self.registry.strategy(request.activity_type)?;
    let raw = self.client.generate(&prompt, &self.sampling).await?;
    Ok(parser::parse(&raw, strategy, request)?)
  }

  /// Save the activity (and its text rendering, when the type has one).
  /// Storage failure is logged by the store and does not fail the build.
  async fn persist(&self, activity: &GeneratedActivity) -> bool {
    let mut store = self.store.lock().await;
    let saved = store.save(&constructed_key(activity.activity_type, &activity.activity_id), activity);

    if let Some(render) = self.registry.get(activity.activity_type).and_then(|s| s.render_text) {
      let key = text_content_key(activity.activity_type, &activity.activity_id);
      store.save_str(&key, render(&activity.payload));
    }
    saved
  }

  /// Record a state change for a batch activity and publish progress.
  /// Activities built outside a batch are not tracked.
  async fn transition(&self, activity_id: &str, state: ActivityState) {
    let progress = {
      let mut t = self.tracker.write().await;
      let Some(slot) = t.activities.get_mut(activity_id) else {
        return;
      };
      *slot = state;
      if state == ActivityState::Notified {
        t.completed += 1;
      }
      t.progress()
    };
    let mut e = BuildEvent::new(EventKind::BatchProgress);
    e.activity_id = Some(activity_id.to_string());
    e.progress = Some(progress);
    self.bus.emit(&e);
  }
}
