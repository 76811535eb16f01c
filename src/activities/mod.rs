//! Per-activity-type strategies and the registry that dispatches on them.
//!
//! Each activity type contributes one [`ActivityStrategy`] record: how to
//! prompt for it, how to validate what came back, and what to show when
//! generation fails. Adding a type means registering one more record.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::domain::{ActivityType, FormFields, Payload};
use crate::error::{BuildError, ParseError};

pub mod flash_cards;
pub mod lista_exercicios;
pub mod plano_aula;
pub mod quiz_interativo;

/// Marker every placeholder text carries so the UI (and the user) can tell
/// synthesized content apart.
pub const PLACEHOLDER_MARKER: &str = "[Conteúdo provisório]";
pub const REGENERATE_HINT: &str = "Gere novamente a atividade para obter o conteúdo personalizado.";

/// Items a requested quantity is clamped to.
pub const MAX_ITEMS: usize = 50;

#[derive(Clone, Copy)]
pub struct ActivityStrategy {
  pub activity_type: ActivityType,
  /// Canonical payload key holding the item list.
  pub list_field: &'static str,
  pub build_prompt: fn(&FormFields) -> String,
  /// Checks the minimum contract and normalizes aliases into the canonical shape.
  pub validate: fn(Value, &FormFields) -> Result<Payload, ParseError>,
  /// Placeholder payload. Must pass `validate`.
  pub synthesize: fn(&FormFields) -> Payload,
  /// Optional plain-text rendering persisted next to the structured payload.
  pub render_text: Option<fn(&Payload) -> String>,
}

impl std::fmt::Debug for ActivityStrategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActivityStrategy")
      .field("activity_type", &self.activity_type)
      .field("list_field", &self.list_field)
      .finish_non_exhaustive()
  }
}

#[derive(Clone, Debug)]
pub struct Registry {
  strategies: HashMap<ActivityType, ActivityStrategy>,
}

impl Default for Registry {
  fn default() -> Self {
    let mut r = Registry::empty();
    r.register(lista_exercicios::strategy());
    r.register(flash_cards::strategy());
    r.register(quiz_interativo::strategy());
    r.register(plano_aula::strategy());
    r
  }
}

impl Registry {
  pub fn empty() -> Self {
    Self { strategies: HashMap::new() }
  }

  /// Register (or replace) the strategy for its activity type.
  pub fn register(&mut self, strategy: ActivityStrategy) {
    self.strategies.insert(strategy.activity_type, strategy);
  }

  pub fn get(&self, activity_type: ActivityType) -> Option<&ActivityStrategy> {
    self.strategies.get(&activity_type)
  }

  /// Like [`Registry::get`], but an unregistered type is a build error.
  pub fn strategy(&self, activity_type: ActivityType) -> Result<&ActivityStrategy, BuildError> {
    self.get(activity_type).ok_or_else(|| BuildError::UnknownType(activity_type.to_string()))
  }

  pub fn types(&self) -> Vec<ActivityType> {
    let mut v: Vec<_> = self.strategies.keys().copied().collect();
    v.sort();
    v
  }
}

// -------- Form field lookup --------

/// First non-empty value among `aliases`, or `default`.
pub fn field(fields: &FormFields, aliases: &[&str], default: &str) -> String {
  aliases
    .iter()
    .filter_map(|k| fields.get(*k))
    .map(|v| v.trim())
    .find(|v| !v.is_empty())
    .unwrap_or(default)
    .to_string()
}

/// Requested item count, clamped to `1..=MAX_ITEMS`.
pub fn quantity(fields: &FormFields, aliases: &[&str], default: usize) -> usize {
  aliases
    .iter()
    .filter_map(|k| fields.get(*k))
    .find_map(|v| v.trim().parse::<usize>().ok())
    .unwrap_or(default)
    .clamp(1, MAX_ITEMS)
}

// -------- Validation helpers --------

/// Accept either an object or a bare array (treated as the item list).
pub(crate) fn into_object(value: Value, list_field: &str) -> Result<Map<String, Value>, ParseError> {
  match value {
    Value::Object(m) => Ok(m),
    Value::Array(items) => {
      let mut m = Map::new();
      m.insert(list_field.to_string(), Value::Array(items));
      Ok(m)
    }
    _ => Err(ParseError::MissingField { field: list_field.to_string() }),
  }
}

/// Remove the item list from `obj` under its canonical key or any alias.
/// Empty lists are a validation failure.
pub(crate) fn take_list(
  obj: &mut Map<String, Value>,
  canonical: &str,
  aliases: &[&str],
) -> Result<Vec<Value>, ParseError> {
  let mut found = None;
  for key in std::iter::once(canonical).chain(aliases.iter().copied()) {
    if let Some(v) = obj.remove(key) {
      if found.is_none() {
        found = Some(v);
      }
    }
  }
  match found {
    Some(Value::Array(items)) if !items.is_empty() => Ok(items),
    Some(Value::Array(_)) => Err(ParseError::EmptyList { field: canonical.to_string() }),
    Some(_) => Err(ParseError::InvalidItem {
      field: canonical.to_string(),
      index: 0,
      reason: "expected a list".into(),
    }),
    None => Err(ParseError::MissingField { field: canonical.to_string() }),
  }
}

/// First non-empty string-ish value among `keys`.
pub(crate) fn first_text(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
  keys.iter().filter_map(|k| item.get(*k)).find_map(value_text)
}

/// Strings as-is, numbers and booleans printed; everything else ignored.
pub(crate) fn value_text(v: &Value) -> Option<String> {
  let s = match v {
    Value::String(s) => s.trim().to_string(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    _ => return None,
  };
  if s.is_empty() { None } else { Some(s) }
}

/// Item id from `id`, or `<prefix>-<n>` (1-based) when missing.
pub(crate) fn item_id(item: &Map<String, Value>, prefix: &str, index: usize) -> String {
  item.get("id").and_then(value_text).unwrap_or_else(|| format!("{}-{}", prefix, index + 1))
}

pub(crate) fn string_list(v: Option<&Value>) -> Vec<String> {
  match v {
    Some(Value::Array(items)) => items
      .iter()
      .filter_map(|i| match i {
        Value::Object(o) => first_text(o, &["texto", "text", "descricao", "description"]),
        other => value_text(other),
      })
      .collect(),
    _ => Vec::new(),
  }
}

pub(crate) fn item_object(v: Value, field: &str, index: usize) -> Result<Map<String, Value>, ParseError> {
  match v {
    Value::Object(m) => Ok(m),
    _ => Err(ParseError::InvalidItem { field: field.to_string(), index, reason: "expected an object".into() }),
  }
}

/// Copy `key` from `obj` into `out`, or write `default`.
pub(crate) fn keep_or(out: &mut Payload, obj: &Map<String, Value>, keys: &[&str], canonical: &str, default: String) {
  let v = first_text(obj, keys).unwrap_or(default);
  out.insert(canonical.to_string(), Value::String(v));
}

/// Placeholder sentence embedding the theme.
pub(crate) fn placeholder(text: impl std::fmt::Display) -> String {
  format!("{PLACEHOLDER_MARKER} {text} {REGENERATE_HINT}")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn fields(pairs: &[(&str, &str)]) -> FormFields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn registry_knows_every_builtin_type() {
    let r = Registry::default();
    assert_eq!(r.types(), ActivityType::ALL.to_vec());
    for t in ActivityType::ALL {
      assert_eq!(r.get(t).unwrap().activity_type, t);
    }
  }

  #[test]
  fn field_lookup_prefers_first_non_empty_alias() {
    let f = fields(&[("tema", " "), ("theme", "Frações")]);
    assert_eq!(field(&f, &["tema", "theme"], "Geral"), "Frações");
    assert_eq!(field(&f, &["disciplina"], "Matemática"), "Matemática");
  }

  #[test]
  fn quantity_is_clamped() {
    assert_eq!(quantity(&fields(&[("n", "3")]), &["n"], 10), 3);
    assert_eq!(quantity(&fields(&[("n", "0")]), &["n"], 10), 1);
    assert_eq!(quantity(&fields(&[("n", "900")]), &["n"], 10), MAX_ITEMS);
    assert_eq!(quantity(&fields(&[("n", "dez")]), &["n"], 10), 10);
  }

  #[test]
  fn list_aliases_are_folded_into_canonical_key() {
    let mut obj = json!({"questoes": [1], "titulo": "x"}).as_object().unwrap().clone();
    let items = take_list(&mut obj, "questions", &["questoes"]).unwrap();
    assert_eq!(items.len(), 1);
    assert!(!obj.contains_key("questoes"));

    let mut empty = json!({"questions": []}).as_object().unwrap().clone();
    assert_eq!(
      take_list(&mut empty, "questions", &[]),
      Err(ParseError::EmptyList { field: "questions".into() })
    );
  }
}
