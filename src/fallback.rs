//! Placeholder activities for when generation or parsing fails.
//!
//! Synthesis never fails: a request for a type with no registered strategy
//! still gets a minimal payload so the batch can move on.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::activities::{Registry, PLACEHOLDER_MARKER, REGENERATE_HINT};
use crate::domain::{ActivityRequest, GeneratedActivity, Payload};

/// Build the fallback activity for `request`.
pub fn synthesize(registry: &Registry, request: &ActivityRequest) -> GeneratedActivity {
  let payload = match registry.get(request.activity_type) {
    Some(strategy) => (strategy.synthesize)(&request.form_fields),
    None => {
      warn!(target: "build", activity_type = %request.activity_type, "No strategy registered; using generic placeholder");
      generic_payload(request)
    }
  };
  info!(
    target: "build",
    activity_id = %request.activity_id,
    activity_type = %request.activity_type,
    "Synthesized fallback activity"
  );
  GeneratedActivity::fallback(&request.activity_id, request.activity_type, payload)
}

fn generic_payload(request: &ActivityRequest) -> Payload {
  let mut p = Payload::new();
  p.insert("title".into(), Value::String(request.display_title()));
  p.insert("description".into(), Value::String(format!("{PLACEHOLDER_MARKER} {REGENERATE_HINT}")));
  p.insert("items".into(), json!([]));
  p
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ActivityType, FormFields};

  fn form(pairs: &[(&str, &str)]) -> FormFields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn fractions_exercise_list_has_three_themed_questions() {
    let registry = Registry::default();
    let req = ActivityRequest::new(
      ActivityType::ListaExercicios,
      form(&[("theme", "Frações"), ("numberOfQuestions", "3")]),
    );
    let a = synthesize(&registry, &req);
    assert!(a.is_fallback);
    assert!(!a.is_generated_by_ai);
    assert_eq!(a.activity_id, req.activity_id);
    let qs = a.items("questions");
    assert_eq!(qs.len(), 3);
    for q in qs {
      assert!(q["enunciado"].as_str().unwrap().contains("Frações"));
    }
  }

  #[test]
  fn every_fallback_passes_its_own_validator() {
    let registry = Registry::default();
    let fields = form(&[("tema", "Ciclo da água"), ("quantidade", "4"), ("numeroQuestoes", "4")]);
    for t in ActivityType::ALL {
      let strategy = registry.get(t).unwrap();
      let req = ActivityRequest::new(t, fields.clone());
      let a = synthesize(&registry, &req);
      let revalidated = (strategy.validate)(Value::Object(a.payload.clone()), &fields);
      assert!(revalidated.is_ok(), "{t}: {revalidated:?}");
      assert!(!a.items(strategy.list_field).is_empty(), "{t}");
    }
  }

  #[test]
  fn empty_form_still_yields_a_payload() {
    let registry = Registry::default();
    for t in ActivityType::ALL {
      let a = synthesize(&registry, &ActivityRequest::new(t, FormFields::new()));
      assert!(!a.payload.is_empty(), "{t}");
    }
  }

  #[test]
  fn unregistered_type_gets_generic_placeholder() {
    let registry = Registry::empty();
    let req = ActivityRequest::new(ActivityType::FlashCards, FormFields::new()).with_title("Revisão");
    let a = synthesize(&registry, &req);
    assert!(a.is_fallback);
    assert_eq!(a.payload["title"], "Revisão");
  }
}
