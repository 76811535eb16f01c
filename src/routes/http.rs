//! HTTP endpoint handlers. These are thin wrappers that forward to the orchestrator.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::domain::{ActivityRequest, ActivityType, GeneratedActivity};
use crate::error::OrchestratorError;
use crate::protocol::*;
use crate::state::AppState;
use crate::store::constructed_key;

fn error_response(status: StatusCode, error: impl ToString) -> Response {
  (status, Json(ErrorOut { error: error.to_string() })).into_response()
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let storage_usage_percent = state.orchestrator.store().lock().await.usage_percent();
  Json(HealthOut { ok: true, generator: state.generator.clone(), storage_usage_percent })
}

#[instrument(level = "info", skip(state, body), fields(total = body.activities.len()))]
pub async fn http_start_batch(State(state): State<Arc<AppState>>, Json(body): Json<BatchIn>) -> Response {
  match state.orchestrator.start_batch(body.activities).await {
    Ok(summary) => {
      info!(target: "build", status = ?summary.status, fallback = summary.fallback_count, "HTTP batch finished");
      Json(summary).into_response()
    }
    Err(e @ OrchestratorError::AlreadyRunning) => {
      warn!(target: "build", "HTTP batch rejected: already running");
      error_response(StatusCode::CONFLICT, e)
    }
    Err(e @ OrchestratorError::EmptyBatch) => error_response(StatusCode::BAD_REQUEST, e),
    Err(e @ OrchestratorError::Interrupted(_)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_stop_batch(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let stopped = state.orchestrator.stop_batch();
  info!(target: "build", %stopped, "HTTP stop requested");
  Json(StopOut { stopped })
}

#[instrument(level = "debug", skip(state))]
pub async fn http_batch_progress(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let o = &state.orchestrator;
  Json(ProgressOut { status: o.status().await, running: o.is_running(), progress: o.progress().await })
}

#[instrument(level = "info", skip(state, body), fields(activity_id = %body.activity_id, activity_type = %body.activity_type))]
pub async fn http_build_one(State(state): State<Arc<AppState>>, Json(body): Json<ActivityRequest>) -> impl IntoResponse {
  let (activity, outcome) = state.orchestrator.build_one(body).await;
  info!(target: "build", id = %activity.activity_id, fallback = activity.is_fallback, "HTTP activity built");
  Json(BuildOneOut { activity, outcome })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_activity(
  State(state): State<Arc<AppState>>,
  Path((activity_type, activity_id)): Path<(String, String)>,
) -> Response {
  let activity_type: ActivityType = match activity_type.parse() {
    Ok(t) => t,
    Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
  };
  let key = constructed_key(activity_type, &activity_id);
  let stored: Option<GeneratedActivity> = state.orchestrator.store().lock().await.get_json(&key, None);
  match stored {
    Some(activity) => Json(activity).into_response(),
    None => error_response(StatusCode::NOT_FOUND, format!("no stored activity {activity_id}")),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_clear_activity(State(state): State<Arc<AppState>>, Path(activity_id): Path<String>) -> impl IntoResponse {
  let removed = state.orchestrator.store().lock().await.clear_activity(&activity_id);
  Json(ClearOut { removed })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use crate::domain::FormFields;
  use crate::gemini::DisabledClient;

  fn state() -> Arc<AppState> {
    let mut config = AppConfig::default();
    config.batch.inter_window_delay_ms = 0;
    Arc::new(AppState::with_client(config, Arc::new(DisabledClient)))
  }

  #[tokio::test]
  async fn built_activity_can_be_fetched_and_cleared() {
    let state = state();
    let req = ActivityRequest::new(ActivityType::FlashCards, FormFields::new()).with_id("fc-1");
    let _ = http_build_one(State(state.clone()), Json(req)).await.into_response();

    let found = http_get_activity(State(state.clone()), Path(("flash-cards".into(), "fc-1".into()))).await;
    assert_eq!(found.status(), StatusCode::OK);

    let _ = http_clear_activity(State(state.clone()), Path("fc-1".into())).await.into_response();
    let gone = http_get_activity(State(state.clone()), Path(("flash-cards".into(), "fc-1".into()))).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn unknown_type_is_a_bad_request() {
    let res = http_get_activity(State(state()), Path(("sequencia-didatica".into(), "x".into()))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn empty_batch_is_a_bad_request() {
    let res = http_start_batch(State(state()), Json(BatchIn { activities: Vec::new() })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn batch_without_generator_completes_with_fallbacks() {
    let state = state();
    let activities = ActivityType::ALL.iter().map(|t| ActivityRequest::new(*t, FormFields::new())).collect();
    let res = http_start_batch(State(state.clone()), Json(BatchIn { activities })).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!state.orchestrator.is_running());
    assert_eq!(state.orchestrator.progress().await.completed_count, ActivityType::ALL.len());
  }
}
