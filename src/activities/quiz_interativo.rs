//! Interactive quiz (`quiz-interativo`): `payload.questions` with options and
//! the correct option text.

use serde_json::{json, Value};

use super::{
  field, first_text, into_object, item_id, item_object, keep_or, placeholder, quantity, string_list, take_list,
  value_text, ActivityStrategy,
};
use crate::domain::{ActivityType, FormFields, Payload, QuizQuestion};
use crate::error::ParseError;
use crate::prompt::{render, PromptParts};

const LIST_FIELD: &str = "questions";
const LIST_ALIASES: &[&str] = &["questoes", "perguntas"];

const SHAPE: &str = r#"{
  "title": "string",
  "description": "string",
  "questions": [
    {
      "id": 1,
      "type": "multipla-escolha | verdadeiro-falso",
      "question": "string",
      "options": ["string", "string", "string", "string"],
      "correctAnswer": "texto exato de uma das opções",
      "explanation": "string"
    }
  ]
}"#;

pub fn strategy() -> ActivityStrategy {
  ActivityStrategy {
    activity_type: ActivityType::QuizInterativo,
    list_field: LIST_FIELD,
    build_prompt,
    validate,
    synthesize,
    render_text: None,
  }
}

struct Form {
  subject: String,
  school_year: String,
  theme: String,
  objectives: String,
  difficulty: String,
  format: String,
  time_per_question: u32,
  count: usize,
}

fn read_form(f: &FormFields) -> Form {
  Form {
    subject: field(f, &["subject", "disciplina"], "Matemática"),
    school_year: field(f, &["schoolYear", "anoEscolaridade"], "6º Ano - Ensino Fundamental"),
    theme: field(f, &["theme", "tema"], "Tema Geral"),
    objectives: field(f, &["objectives", "objetivos"], "Revisar o conteúdo de forma lúdica"),
    difficulty: field(f, &["difficultyLevel", "nivelDificuldade"], "Médio"),
    format: field(f, &["format", "formato"], "Múltipla Escolha"),
    time_per_question: f
      .get("timePerQuestion")
      .and_then(|v| v.trim().parse().ok())
      .filter(|t| *t > 0)
      .unwrap_or(60),
    count: quantity(f, &["numberOfQuestions", "numeroQuestoes"], 10),
  }
}

fn build_prompt(f: &FormFields) -> String {
  let form = read_form(f);
  render(&PromptParts {
    role: "Você é um especialista em criação de quizzes educativos interativos.",
    task: format!("Crie um quiz com exatamente {} questões sobre \"{}\".", form.count, form.theme),
    context: vec![
      ("Disciplina", form.subject),
      ("Ano de escolaridade", form.school_year),
      ("Tema", form.theme),
      ("Objetivos", form.objectives),
      ("Nível de dificuldade", form.difficulty),
      ("Formato", form.format.clone()),
      ("Tempo por questão (s)", form.time_per_question.to_string()),
      ("Quantidade de questões", form.count.to_string()),
    ],
    mandatory_fields: &[
      "questions (lista com a quantidade pedida)",
      "questions[].id",
      "questions[].type",
      "questions[].question",
      "questions[].options",
      "questions[].correctAnswer",
    ],
    rules: vec![
      format!("Use o formato \"{}\".", form.format),
      "correctAnswer deve repetir exatamente o texto de uma das opções.".into(),
      "Questões verdadeiro-falso usam as opções [\"Verdadeiro\", \"Falso\"].".into(),
    ],
    shape: SHAPE,
  })
}

fn is_true_false(kind: Option<&str>, options: &[String]) -> bool {
  let kind_says = kind.map(|k| {
    let k = k.to_lowercase();
    k.contains("verdadeiro") || k.contains("true")
  });
  let options_say = options.len() == 2
    && options.iter().any(|o| o.to_lowercase().contains("verdadeiro"))
    && options.iter().any(|o| o.to_lowercase().contains("falso"));
  kind_says.unwrap_or(false) || options_say
}

fn validate(value: Value, f: &FormFields) -> Result<Payload, ParseError> {
  let form = read_form(f);
  let mut obj = into_object(value, LIST_FIELD)?;
  let items = take_list(&mut obj, LIST_FIELD, LIST_ALIASES)?;

  let mut questions = Vec::with_capacity(items.len());
  for (i, item) in items.into_iter().enumerate() {
    let item = item_object(item, LIST_FIELD, i)?;
    let invalid = |reason: &str| ParseError::InvalidItem { field: LIST_FIELD.into(), index: i, reason: reason.into() };

    let text = first_text(&item, &["question", "pergunta", "enunciado", "text"]).ok_or_else(|| invalid("missing question"))?;
    let kind_raw = first_text(&item, &["type", "tipo"]);
    let mut options = string_list(item.get("options").or_else(|| item.get("alternativas")).or_else(|| item.get("alternatives")));
    let true_false = is_true_false(kind_raw.as_deref(), &options);
    if true_false {
      options = vec!["Verdadeiro".into(), "Falso".into()];
    } else if options.len() < 2 {
      return Err(invalid("needs at least two options"));
    }

    let answer_raw = ["correctAnswer", "respostaCorreta", "correct_answer", "answer"].iter().find_map(|k| item.get(*k));
    // Index answers point into options; text answers are kept as given.
    let answer = match answer_raw {
      Some(Value::Number(n)) => n.as_u64().and_then(|idx| options.get(idx as usize).cloned()),
      Some(Value::Bool(b)) if true_false => Some(if *b { "Verdadeiro" } else { "Falso" }.to_string()),
      Some(other) => value_text(other),
      None => None,
    }
    .ok_or_else(|| invalid("missing correctAnswer"))?;

    questions.push(QuizQuestion {
      id: item_id(&item, "q", i),
      kind: if true_false { "verdadeiro-falso" } else { "multipla-escolha" }.into(),
      question: text,
      options,
      correct_answer: answer,
      explanation: first_text(&item, &["explanation", "explicacao"]).unwrap_or_default(),
    });
  }

  let mut out = Payload::new();
  keep_or(&mut out, &obj, &["title", "titulo"], "title", format!("Quiz: {}", form.theme));
  keep_or(&mut out, &obj, &["description", "descricao"], "description", form.objectives);
  out.insert("timePerQuestion".into(), json!(form.time_per_question));
  out.insert("totalQuestions".into(), json!(questions.len()));
  out.insert(
    LIST_FIELD.into(),
    serde_json::to_value(&questions).map_err(|e| ParseError::Malformed { reason: e.to_string() })?,
  );
  Ok(out)
}

fn synthesize(f: &FormFields) -> Payload {
  let form = read_form(f);
  let options: Vec<String> = ["Opção A", "Opção B", "Opção C", "Opção D"].iter().map(|s| s.to_string()).collect();
  let questions: Vec<QuizQuestion> = (0..form.count)
    .map(|i| QuizQuestion {
      id: format!("q-{}", i + 1),
      kind: "multipla-escolha".into(),
      question: placeholder(format_args!("Pergunta {} sobre {}.", i + 1, form.theme)),
      options: options.clone(),
      correct_answer: options[0].clone(),
      explanation: super::REGENERATE_HINT.into(),
    })
    .collect();

  let mut out = Payload::new();
  out.insert("title".into(), Value::String(format!("Quiz: {}", form.theme)));
  out.insert("description".into(), Value::String(super::REGENERATE_HINT.into()));
  out.insert("timePerQuestion".into(), json!(form.time_per_question));
  out.insert("totalQuestions".into(), json!(questions.len()));
  out.insert(LIST_FIELD.into(), serde_json::to_value(&questions).unwrap_or_else(|_| Value::Array(Vec::new())));
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_answers_resolve_to_option_text() {
    let v = json!({"questions": [{"question": "2+2?", "options": ["3", "4"], "correctAnswer": 1}]});
    let p = validate(v, &FormFields::new()).unwrap();
    assert_eq!(p["questions"][0]["correctAnswer"], "4");
    assert_eq!(p["questions"][0]["id"], "q-1");
  }

  #[test]
  fn true_false_is_detected_from_options() {
    let v = json!({"questoes": [{"pergunta": "O sol é uma estrela.", "alternativas": ["Verdadeiro", "Falso"], "respostaCorreta": "Verdadeiro"}]});
    let p = validate(v, &FormFields::new()).unwrap();
    assert_eq!(p["questions"][0]["type"], "verdadeiro-falso");
  }

  #[test]
  fn multiple_choice_without_options_is_rejected() {
    let v = json!({"questions": [{"question": "x", "correctAnswer": "y"}]});
    assert!(validate(v, &FormFields::new()).is_err());
  }
}
