//! Prompt assembly shared by every activity type.
//!
//! A prompt always carries three things: the form context rendered as a
//! readable list, the enumerated mandatory output fields, and the instruction
//! to answer with a single JSON value and nothing else.

use crate::activities::Registry;
use crate::domain::{ActivityType, FormFields};
use crate::error::BuildError;
use crate::util::fill_template;

const PROMPT_TEMPLATE: &str = "{role}

TAREFA:
{task}

DADOS DO FORMULÁRIO:
{context}

CAMPOS OBRIGATÓRIOS NA RESPOSTA:
{mandatory}

REGRAS:
{rules}

FORMATO DE SAÍDA:
Responda com UM ÚNICO valor JSON válido, sem texto antes ou depois, sem blocos de código e sem comentários.
Siga exatamente esta estrutura:
{shape}";

/// Per-type ingredients of a prompt.
#[derive(Debug, Clone)]
pub struct PromptParts<'a> {
  pub role: &'a str,
  pub task: String,
  pub context: Vec<(&'a str, String)>,
  pub mandatory_fields: &'a [&'a str],
  pub rules: Vec<String>,
  pub shape: &'a str,
}

pub fn render(parts: &PromptParts<'_>) -> String {
  let context = parts
    .context
    .iter()
    .map(|(label, value)| format!("- {label}: {value}"))
    .collect::<Vec<_>>()
    .join("\n");
  let mandatory = parts
    .mandatory_fields
    .iter()
    .enumerate()
    .map(|(i, f)| format!("{}. {}", i + 1, f))
    .collect::<Vec<_>>()
    .join("\n");
  let rules = parts.rules.iter().map(|r| format!("- {r}")).collect::<Vec<_>>().join("\n");

  fill_template(
    PROMPT_TEMPLATE,
    &[
      ("role", parts.role),
      ("task", &parts.task),
      ("context", &context),
      ("mandatory", &mandatory),
      ("rules", &rules),
      ("shape", parts.shape),
    ],
  )
}

/// Build the prompt for `activity_type` from (possibly incomplete) form data.
pub fn build(registry: &Registry, activity_type: ActivityType, fields: &FormFields) -> Result<String, BuildError> {
  let strategy = registry.strategy(activity_type)?;
  Ok((strategy.build_prompt)(fields))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_type_prompt_is_complete_with_empty_form() {
    let registry = Registry::default();
    let empty = FormFields::new();
    for t in ActivityType::ALL {
      let p = build(&registry, t, &empty).unwrap();
      assert!(p.contains("DADOS DO FORMULÁRIO"), "{t}");
      assert!(p.contains("CAMPOS OBRIGATÓRIOS"), "{t}");
      assert!(p.contains("UM ÚNICO valor JSON"), "{t}");
      for placeholder in ["{role}", "{task}", "{context}", "{mandatory}", "{rules}", "{shape}"] {
        assert!(!p.contains(placeholder), "{t} left {placeholder}");
      }
    }
  }

  #[test]
  fn prompts_are_deterministic_and_carry_form_values() {
    let registry = Registry::default();
    let mut f = FormFields::new();
    f.insert("theme".into(), "Frações".into());
    f.insert("numberOfQuestions".into(), "3".into());
    let a = build(&registry, ActivityType::ListaExercicios, &f).unwrap();
    let b = build(&registry, ActivityType::ListaExercicios, &f).unwrap();
    assert_eq!(a, b);
    assert!(a.contains("- Tema: Frações"));
    assert!(a.contains("exatamente 3"));
  }

  #[test]
  fn render_numbers_mandatory_fields() {
    let p = render(&PromptParts {
      role: "r",
      task: "t".into(),
      context: vec![("A", "1".into())],
      mandatory_fields: &["x", "y"],
      rules: vec!["z".into()],
      shape: "{\"x\": []}",
    });
    assert!(p.contains("1. x\n2. y"));
    assert!(p.ends_with("{\"x\": []}"));
  }

  #[test]
  fn form_values_that_look_like_placeholders_are_kept_verbatim() {
    let p = render(&PromptParts {
      role: "r",
      task: "t".into(),
      context: vec![("Tema", "{rules} e {shape}".into())],
      mandatory_fields: &["x"],
      rules: vec!["regra".into()],
      shape: "{\"x\": []}",
    });
    assert!(p.contains("- Tema: {rules} e {shape}"));
    assert!(p.contains("- regra"));
    assert!(p.ends_with("{\"x\": []}"));
  }

  #[test]
  fn unregistered_type_is_an_unknown_type_error() {
    let err = build(&Registry::empty(), ActivityType::FlashCards, &FormFields::new()).unwrap_err();
    assert!(matches!(err, BuildError::UnknownType(t) if t == "flash-cards"));
  }
}
