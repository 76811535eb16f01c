//! Domain models: activity types, build requests, generated activities and
//! the leaf records their payloads are made of.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Flat form data as submitted by an editing form. Ordered so prompts are
/// deterministic for a given input.
pub type FormFields = BTreeMap<String, String>;

/// Activity payload, shaped per `ActivityType`.
pub type Payload = Map<String, Value>;

/// Which educational artifact is being built?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
  /// Exercise list: `payload.questions`.
  ListaExercicios,
  /// Flashcards: `payload.cards`.
  FlashCards,
  /// Interactive quiz: `payload.questions`.
  QuizInterativo,
  /// Lesson plan: `payload.objetivos` + `payload.steps`.
  PlanoAula,
}

impl ActivityType {
  pub const ALL: [ActivityType; 4] = [
    ActivityType::ListaExercicios,
    ActivityType::FlashCards,
    ActivityType::QuizInterativo,
    ActivityType::PlanoAula,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ActivityType::ListaExercicios => "lista-exercicios",
      ActivityType::FlashCards => "flash-cards",
      ActivityType::QuizInterativo => "quiz-interativo",
      ActivityType::PlanoAula => "plano-aula",
    }
  }
}

impl fmt::Display for ActivityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ActivityType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ActivityType::ALL
      .iter()
      .copied()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| format!("unknown activity type: {s}"))
  }
}

/// One activity submitted for construction. Immutable once handed to the
/// orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequest {
  #[serde(default = "new_activity_id")]
  pub activity_id: String,
  pub activity_type: ActivityType,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub form_fields: FormFields,
}

fn new_activity_id() -> String {
  Uuid::new_v4().to_string()
}

impl ActivityRequest {
  pub fn new(activity_type: ActivityType, form_fields: FormFields) -> Self {
    Self { activity_id: new_activity_id(), activity_type, title: None, form_fields }
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.activity_id = id.into();
    self
  }

  pub fn with_title(mut self, title: impl Into<String>) -> Self {
    self.title = Some(title.into());
    self
  }

  /// Title shown in notifications: explicit title, then a title form field,
  /// then the activity type.
  pub fn display_title(&self) -> String {
    self
      .title
      .clone()
      .or_else(|| self.form_fields.get("titulo").cloned())
      .or_else(|| self.form_fields.get("title").cloned())
      .filter(|t| !t.trim().is_empty())
      .unwrap_or_else(|| self.activity_type.to_string())
  }
}

/// A finished activity, ready for rendering.
///
/// Build it through [`GeneratedActivity::from_model`] or
/// [`GeneratedActivity::fallback`] so that `is_fallback` always implies
/// `!is_generated_by_ai`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedActivity {
  pub activity_id: String,
  pub activity_type: ActivityType,
  pub payload: Payload,
  #[serde(rename = "isGeneratedByAI")]
  pub is_generated_by_ai: bool,
  pub is_fallback: bool,
  pub generated_at: DateTime<Utc>,
}

impl GeneratedActivity {
  pub fn from_model(activity_id: &str, activity_type: ActivityType, payload: Payload) -> Self {
    Self {
      activity_id: activity_id.to_string(),
      activity_type,
      payload,
      is_generated_by_ai: true,
      is_fallback: false,
      generated_at: Utc::now(),
    }
  }

  pub fn fallback(activity_id: &str, activity_type: ActivityType, payload: Payload) -> Self {
    Self {
      activity_id: activity_id.to_string(),
      activity_type,
      payload,
      is_generated_by_ai: false,
      is_fallback: true,
      generated_at: Utc::now(),
    }
  }

  /// Items of a list field in the payload, empty when absent.
  pub fn items(&self, field: &str) -> &[Value] {
    self.payload.get(field).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
  }
}

/// Exercise-list question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub enunciado: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub alternativas: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resposta_correta: Option<Value>,
  #[serde(default)]
  pub explicacao: String,
}

/// Flashcard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Card {
  pub id: String,
  pub front: String,
  pub back: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
}

/// Interactive quiz question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer: String,
  #[serde(default)]
  pub explanation: String,
}

/// One development step of a lesson plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LessonStep {
  pub id: String,
  pub titulo: String,
  pub descricao: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duracao: Option<String>,
}
