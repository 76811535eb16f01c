//! Publish/subscribe for build notifications.
//!
//! Subscribers register by event name or `*`. Handlers run synchronously on
//! the emitting task, outside the registry lock, so a handler may
//! unsubscribe itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tracing::{debug, trace};

use crate::domain::GeneratedActivity;
use crate::orchestrator::{BatchProgress, BatchSummary};

pub const WILDCARD: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  ConstructionStarted,
  ActivityBuilt,
  BatchProgress,
  BatchCompleted,
}

impl EventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EventKind::ConstructionStarted => "construction_started",
      EventKind::ActivityBuilt => "activity_built",
      EventKind::BatchProgress => "batch_progress",
      EventKind::BatchCompleted => "batch_completed",
    }
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
  #[serde(rename = "event")]
  pub kind: EventKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub activity_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub activity_title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub success: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<GeneratedActivity>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub batch_results: Option<BatchSummary>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub progress: Option<BatchProgress>,
}

impl BuildEvent {
  pub fn new(kind: EventKind) -> Self {
    Self {
      kind,
      activity_id: None,
      activity_title: None,
      success: None,
      content: None,
      error: None,
      batch_results: None,
      progress: None,
    }
  }

  pub fn name(&self) -> &'static str {
    self.kind.as_str()
  }
}

type Handler = Arc<dyn Fn(&BuildEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
  next_id: AtomicU64,
  handlers: Mutex<HashMap<u64, (String, Handler)>>,
}

impl Subscribers {
  fn handlers(&self) -> MutexGuard<'_, HashMap<u64, (String, Handler)>> {
    // A panicking handler never runs under this lock, so poisoning carries no
    // torn state.
    self.handlers.lock().unwrap_or_else(|p| p.into_inner())
  }
}

#[derive(Clone, Default)]
pub struct EventBus {
  inner: Arc<Subscribers>,
}

/// Handle returned by [`EventBus::subscribe`].
#[must_use = "dropping a Subscription does not unsubscribe; call `unsubscribe` or keep it"]
pub struct Subscription {
  id: u64,
  bus: Weak<Subscribers>,
}

impl Subscription {
  pub fn unsubscribe(self) {
    if let Some(bus) = self.bus.upgrade() {
      bus.handlers().remove(&self.id);
      debug!(target: "build", subscription = self.id, "Unsubscribed");
    }
  }
}

impl EventBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `handler` for events named `event` (or every event for `*`).
  pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
  where
    F: Fn(&BuildEvent) + Send + Sync + 'static,
  {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    self.inner.handlers().insert(id, (event.to_string(), Arc::new(handler)));
    debug!(target: "build", subscription = id, %event, "Subscribed");
    Subscription { id, bus: Arc::downgrade(&self.inner) }
  }

  pub fn emit(&self, event: &BuildEvent) {
    let name = event.name();
    let matching: Vec<Handler> = {
      let handlers = self.inner.handlers();
      let mut ids: Vec<_> = handlers
        .iter()
        .filter(|(_, (topic, _))| topic == WILDCARD || topic == name)
        .map(|(id, (_, h))| (*id, h.clone()))
        .collect();
      ids.sort_by_key(|(id, _)| *id);
      ids.into_iter().map(|(_, h)| h).collect()
    };
    trace!(target: "build", event = name, handlers = matching.len(), "Emitting");
    for h in matching {
      h(event);
    }
  }

  pub fn subscriber_count(&self) -> usize {
    self.inner.handlers().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn recorder(bus: &EventBus, topic: &str) -> (Arc<Mutex<Vec<String>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = bus.subscribe(topic, move |e| sink.lock().unwrap().push(e.name().to_string()));
    (seen, sub)
  }

  #[test]
  fn named_and_wildcard_subscribers_are_routed() {
    let bus = EventBus::new();
    let (built, _a) = recorder(&bus, "activity_built");
    let (all, _b) = recorder(&bus, WILDCARD);

    bus.emit(&BuildEvent::new(EventKind::ConstructionStarted));
    bus.emit(&BuildEvent::new(EventKind::ActivityBuilt));

    assert_eq!(*built.lock().unwrap(), vec!["activity_built"]);
    assert_eq!(*all.lock().unwrap(), vec!["construction_started", "activity_built"]);
  }

  #[test]
  fn unsubscribed_handlers_stop_receiving() {
    let bus = EventBus::new();
    let (seen, sub) = recorder(&bus, WILDCARD);
    bus.emit(&BuildEvent::new(EventKind::BatchProgress));
    sub.unsubscribe();
    bus.emit(&BuildEvent::new(EventKind::BatchCompleted));
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(bus.subscriber_count(), 0);
  }

  #[test]
  fn events_serialize_with_camel_case_and_skip_empty_fields() {
    let mut e = BuildEvent::new(EventKind::ActivityBuilt);
    e.activity_id = Some("a1".into());
    e.success = Some(true);
    let v = serde_json::to_value(&e).unwrap();
    assert_eq!(v, serde_json::json!({"event": "activity_built", "activityId": "a1", "success": true}));
  }
}
