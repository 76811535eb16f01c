//! Flashcards (`flash-cards`): `payload.cards`, each with a front and a back.

use serde_json::{json, Value};

use super::{field, first_text, into_object, item_id, item_object, keep_or, placeholder, quantity, take_list, ActivityStrategy};
use crate::domain::{ActivityType, Card, FormFields, Payload};
use crate::error::ParseError;
use crate::prompt::{render, PromptParts};

const LIST_FIELD: &str = "cards";
const LIST_ALIASES: &[&str] = &["flashcards", "flashCards", "cartoes"];
const FRONT_KEYS: &[&str] = &["front", "frente", "pergunta", "question", "term", "termo"];
const BACK_KEYS: &[&str] = &["back", "verso", "resposta", "answer", "definition", "definicao"];

const SHAPE: &str = r#"{
  "title": "string",
  "description": "string",
  "cards": [
    { "id": 1, "front": "pergunta ou termo", "back": "resposta ou definição", "category": "string" }
  ]
}"#;

pub fn strategy() -> ActivityStrategy {
  ActivityStrategy {
    activity_type: ActivityType::FlashCards,
    list_field: LIST_FIELD,
    build_prompt,
    validate,
    synthesize,
    render_text: None,
  }
}

struct Form {
  title: String,
  theme: String,
  subject: String,
  school_year: String,
  topics: String,
  difficulty: String,
  count: usize,
}

fn read_form(f: &FormFields) -> Form {
  let theme = field(f, &["theme", "tema"], "Tema Geral");
  Form {
    title: field(f, &["title", "titulo"], "Flash Cards"),
    topics: field(f, &["topicos", "topics"], &theme),
    theme,
    subject: field(f, &["subject", "disciplina"], "Geral"),
    school_year: field(f, &["schoolYear", "anoEscolaridade"], "Ensino Fundamental"),
    difficulty: field(f, &["difficultyLevel", "nivelDificuldade"], "Médio"),
    count: quantity(f, &["numberOfFlashcards", "numeroFlashcards", "quantidade"], 10),
  }
}

fn build_prompt(f: &FormFields) -> String {
  let form = read_form(f);
  render(&PromptParts {
    role: "Você é um especialista em memorização ativa e criação de flashcards educacionais.",
    task: format!("Crie exatamente {} flashcards sobre \"{}\".", form.count, form.theme),
    context: vec![
      ("Título", form.title),
      ("Tema", form.theme),
      ("Tópicos", form.topics),
      ("Disciplina", form.subject),
      ("Ano de escolaridade", form.school_year),
      ("Nível de dificuldade", form.difficulty),
      ("Quantidade de cards", form.count.to_string()),
    ],
    mandatory_fields: &["cards (lista com a quantidade pedida)", "cards[].id", "cards[].front", "cards[].back"],
    rules: vec![
      "A frente traz uma pergunta ou termo curto; o verso traz a resposta objetiva.".into(),
      "Não repita cards.".into(),
    ],
    shape: SHAPE,
  })
}

fn validate(value: Value, f: &FormFields) -> Result<Payload, ParseError> {
  let form = read_form(f);
  let mut obj = into_object(value, LIST_FIELD)?;
  let items = take_list(&mut obj, LIST_FIELD, LIST_ALIASES)?;

  let mut cards = Vec::with_capacity(items.len());
  for (i, item) in items.into_iter().enumerate() {
    let item = item_object(item, LIST_FIELD, i)?;
    let missing = |side: &str| ParseError::InvalidItem { field: LIST_FIELD.into(), index: i, reason: format!("missing {side}") };
    let front = first_text(&item, FRONT_KEYS).ok_or_else(|| missing("front"))?;
    let back = first_text(&item, BACK_KEYS).ok_or_else(|| missing("back"))?;
    cards.push(Card {
      id: item_id(&item, "card", i),
      front,
      back,
      category: first_text(&item, &["category", "categoria"]),
    });
  }

  let mut out = Payload::new();
  keep_or(&mut out, &obj, &["title", "titulo"], "title", form.title);
  keep_or(&mut out, &obj, &["description", "descricao"], "description", String::new());
  out.insert("theme".into(), Value::String(form.theme));
  out.insert("subject".into(), Value::String(form.subject));
  out.insert("totalCards".into(), json!(cards.len()));
  out.insert(
    LIST_FIELD.into(),
    serde_json::to_value(&cards).map_err(|e| ParseError::Malformed { reason: e.to_string() })?,
  );
  Ok(out)
}

fn synthesize(f: &FormFields) -> Payload {
  let form = read_form(f);
  let cards: Vec<Card> = (0..form.count)
    .map(|i| Card {
      id: format!("card-{}", i + 1),
      front: placeholder(format_args!("Conceito {} de {}.", i + 1, form.theme)),
      back: placeholder(format_args!("Explicação do conceito {} de {}.", i + 1, form.theme)),
      category: Some(form.subject.clone()),
    })
    .collect();

  let mut out = Payload::new();
  out.insert("title".into(), Value::String(form.title));
  out.insert("description".into(), Value::String(super::REGENERATE_HINT.into()));
  out.insert("theme".into(), Value::String(form.theme));
  out.insert("subject".into(), Value::String(form.subject));
  out.insert("totalCards".into(), json!(cards.len()));
  out.insert(LIST_FIELD.into(), serde_json::to_value(&cards).unwrap_or_else(|_| Value::Array(Vec::new())));
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn portuguese_sides_are_accepted() {
    let v = json!({"flashcards": [{"id": 1, "frente": "Mitocôndria", "verso": "Respiração celular"}]});
    let p = validate(v, &FormFields::new()).unwrap();
    assert_eq!(p["cards"][0]["front"], "Mitocôndria");
    assert_eq!(p["cards"][0]["back"], "Respiração celular");
    assert_eq!(p["totalCards"], 1);
  }

  #[test]
  fn card_without_back_is_rejected() {
    let v = json!({"cards": [{"front": "x", "back": "  "}]});
    assert!(validate(v, &FormFields::new()).is_err());
  }

  #[test]
  fn fallback_defaults_to_ten_cards() {
    let p = synthesize(&FormFields::new());
    assert_eq!(p["cards"].as_array().unwrap().len(), 10);
  }
}
