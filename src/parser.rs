//! Turning raw model text into a validated activity.
//!
//! Candidate regions are tried in order of preference:
//!   1. the fence-stripped text as a whole
//!   2. the slice from the first `{` to the last `}`
//!   3. every balanced top-level `{...}` region, largest first, then fenced
//!      blocks found anywhere in the text
//!
//! The first candidate that parses AND passes the type's validator wins. A
//! region that parses but fails validation (an echoed schema, a fragment from
//! the surrounding prose) does not end the search.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::activities::ActivityStrategy;
use crate::domain::{ActivityRequest, GeneratedActivity};
use crate::error::ParseError;
use crate::util::trunc_for_log;

static FENCED_BLOCK: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").ok());

/// Strip a leading code fence (with optional language tag) and a trailing one.
pub fn strip_code_fences(raw: &str) -> &str {
  let mut s = raw.trim();
  if let Some(rest) = s.strip_prefix("```") {
    s = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  }
  if let Some(rest) = s.trim_end().strip_suffix("```") {
    s = rest;
  }
  s.trim()
}

/// Slice from the first `{` to the last `}` inclusive.
pub fn first_to_last_brace(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  (end > start).then(|| &text[start..=end])
}

/// Every balanced top-level `{...}` region, ignoring braces inside JSON
/// strings. Returned largest first.
pub fn balanced_regions(text: &str) -> Vec<&str> {
  let mut regions = Vec::new();
  let mut depth = 0usize;
  let mut start = 0usize;
  let mut in_string = false;
  let mut escaped = false;

  for (i, ch) in text.char_indices() {
    if in_string {
      match ch {
        _ if escaped => escaped = false,
        '\\' => escaped = true,
        '"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match ch {
      '"' if depth > 0 => in_string = true,
      '{' => {
        if depth == 0 {
          start = i;
        }
        depth += 1;
      }
      '}' if depth > 0 => {
        depth -= 1;
        if depth == 0 {
          regions.push(&text[start..=i]);
        }
      }
      _ => {}
    }
  }

  regions.sort_by(|a, b| b.len().cmp(&a.len()));
  regions
}

/// Opening vs closing brace counts outside JSON strings.
fn brace_counts(text: &str) -> (usize, usize) {
  let (mut open, mut close) = (0, 0);
  let mut in_string = false;
  let mut escaped = false;
  for ch in text.chars() {
    if in_string {
      match ch {
        _ if escaped => escaped = false,
        '\\' => escaped = true,
        '"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match ch {
      '"' => in_string = true,
      '{' => open += 1,
      '}' => close += 1,
      _ => {}
    }
  }
  (open, close)
}

/// Candidate JSON regions in order of preference, without duplicates.
pub fn candidates(raw: &str) -> Vec<&str> {
  fn push<'a>(out: &mut Vec<&'a str>, c: &'a str) {
    let c = c.trim();
    if !c.is_empty() && !out.contains(&c) {
      out.push(c);
    }
  }

  let stripped = strip_code_fences(raw);
  let mut out = Vec::new();
  push(&mut out, stripped);
  if let Some(slice) = first_to_last_brace(stripped) {
    push(&mut out, slice);
  }
  for region in balanced_regions(stripped) {
    push(&mut out, region);
  }
  if let Some(re) = FENCED_BLOCK.as_ref() {
    for cap in re.captures_iter(raw) {
      if let Some(m) = cap.get(1) {
        push(&mut out, m.as_str());
        if let Some(slice) = first_to_last_brace(m.as_str()) {
          push(&mut out, slice);
        }
      }
    }
  }
  out
}

/// Extract the first candidate that parses as a JSON object or array.
pub fn extract_json(raw: &str) -> Result<Value, ParseError> {
  let mut values = parsed_candidates(raw);
  if values.is_empty() {
    return Err(no_json_error(raw));
  }
  Ok(values.remove(0))
}

fn parsed_candidates(raw: &str) -> Vec<Value> {
  candidates(raw)
    .into_iter()
    .filter_map(|c| serde_json::from_str::<Value>(c).ok())
    .filter(|v| v.is_object() || v.is_array())
    .collect()
}

fn no_json_error(raw: &str) -> ParseError {
  let (opening, closing) = brace_counts(raw);
  if opening != closing {
    ParseError::Ambiguous { opening, closing }
  } else if opening == 0 && !raw.contains('[') {
    ParseError::NoJson
  } else {
    ParseError::Malformed { reason: "no candidate region parsed as JSON".into() }
  }
}

/// Parse raw model text for `request` with the type's validator.
#[instrument(level = "debug", skip(raw, strategy, request), fields(activity_id = %request.activity_id, activity_type = %request.activity_type, raw_len = raw.len()))]
pub fn parse(raw: &str, strategy: &ActivityStrategy, request: &ActivityRequest) -> Result<GeneratedActivity, ParseError> {
  let values = parsed_candidates(raw);
  if values.is_empty() {
    let err = no_json_error(raw);
    debug!(target: "build", error = %err, preview = %trunc_for_log(raw, 200), "No JSON in model response");
    return Err(err);
  }

  let mut first_err = None;
  for (i, value) in values.into_iter().enumerate() {
    match (strategy.validate)(value, &request.form_fields) {
      Ok(payload) => {
        debug!(target: "build", candidate = i, "Model response validated");
        return Ok(GeneratedActivity::from_model(&request.activity_id, request.activity_type, payload));
      }
      Err(e) => {
        debug!(target: "build", candidate = i, error = %e, "Candidate rejected by validator");
        first_err.get_or_insert(e);
      }
    }
  }
  Err(first_err.unwrap_or(ParseError::NoJson))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::activities::Registry;
  use crate::domain::{ActivityType, FormFields};

  fn lista() -> (ActivityStrategy, ActivityRequest) {
    let registry = Registry::default();
    let strategy = *registry.get(ActivityType::ListaExercicios).unwrap();
    let req = ActivityRequest::new(ActivityType::ListaExercicios, FormFields::new()).with_id("a1");
    (strategy, req)
  }

  #[test]
  fn fences_are_stripped() {
    assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
    assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
  }

  #[test]
  fn prose_wrapped_fenced_response_parses() {
    let raw = "Here is the result:\n```json\n{\"questoes\":[{\"id\":\"q1\",\"type\":\"mc\",\"enunciado\":\"x\"}]}\n```\nHope this helps!";
    let (strategy, req) = lista();
    let a = parse(raw, &strategy, &req).unwrap();
    assert!(a.is_generated_by_ai && !a.is_fallback);
    let qs = a.items("questions");
    assert_eq!(qs.len(), 1);
    assert_eq!(qs[0]["id"], "q1");
    assert_eq!(qs[0]["enunciado"], "x");
  }

  #[test]
  fn braces_inside_strings_do_not_split_regions() {
    let text = r#"note {"a": "}{", "b": {"c": 1}} tail {"d": 2}"#;
    let regions = balanced_regions(text);
    assert_eq!(regions[0], r#"{"a": "}{", "b": {"c": 1}}"#);
    assert_eq!(regions[1], r#"{"d": 2}"#);
  }

  #[test]
  fn trailing_fragment_in_prose_falls_through_to_balanced_region() {
    // First `{` to last `}` spans both objects and does not parse; the
    // largest balanced region is the real answer.
    let raw = r#"Resultado: {"questions":[{"enunciado":"Quanto é 2/4?"}]} Exemplo de item: {"id": 1}"#;
    let (strategy, req) = lista();
    let a = parse(raw, &strategy, &req).unwrap();
    assert_eq!(a.items("questions")[0]["enunciado"], "Quanto é 2/4?");
  }

  #[test]
  fn echoed_schema_is_skipped_for_real_answer() {
    let raw = r#"Schema: {"questoes": []} Answer: {"questoes": [{"enunciado": "Explique frações equivalentes.", "type": "discursiva"}]}"#;
    let (strategy, req) = lista();
    let a = parse(raw, &strategy, &req).unwrap();
    assert_eq!(a.items("questions")[0]["type"], "discursiva");
  }

  #[test]
  fn empty_list_is_a_validation_failure() {
    let (strategy, req) = lista();
    let err = parse(r#"{"questoes": []}"#, &strategy, &req).unwrap_err();
    assert_eq!(err, ParseError::EmptyList { field: "questions".into() });
  }

  #[test]
  fn unbalanced_text_is_ambiguous() {
    let (strategy, req) = lista();
    let err = parse(r#"{"questoes": [{"enunciado": "x"}"#, &strategy, &req).unwrap_err();
    assert_eq!(err, ParseError::Ambiguous { opening: 2, closing: 1 });
  }

  #[test]
  fn plain_prose_has_no_json() {
    let (strategy, req) = lista();
    assert_eq!(parse("Desculpe, não posso ajudar.", &strategy, &req).unwrap_err(), ParseError::NoJson);
  }

  #[test]
  fn top_level_array_is_taken_as_item_list() {
    let (strategy, req) = lista();
    let a = parse(r#"[{"enunciado": "a"}, {"enunciado": "b"}]"#, &strategy, &req).unwrap();
    assert_eq!(a.items("questions").len(), 2);
  }

  #[test]
  fn extract_json_returns_first_parsable_region() {
    let v = extract_json("ok ```json\n{\"a\": [1, 2]}\n``` done").unwrap();
    assert_eq!(v["a"][1], 2);
  }
}
