//! Exercise list (`lista-exercicios`): `payload.questions`.

use serde_json::{json, Value};

use super::{
  field, first_text, into_object, item_id, item_object, keep_or, placeholder, quantity, take_list, value_text,
  ActivityStrategy,
};
use crate::domain::{ActivityType, FormFields, Payload, Question};
use crate::error::ParseError;
use crate::prompt::{render, PromptParts};

const LIST_FIELD: &str = "questions";
const LIST_ALIASES: &[&str] = &["questoes", "exercicios", "exercises"];
const STATEMENT_KEYS: &[&str] =
  &["enunciado", "pergunta", "question", "statement", "texto", "text", "content", "descricao", "description"];

const MULTIPLE_CHOICE: &str = "multipla-escolha";
const ESSAY: &str = "discursiva";
const TRUE_FALSE: &str = "verdadeiro-falso";

const SHAPE: &str = r#"{
  "titulo": "string",
  "disciplina": "string",
  "tema": "string",
  "objetivos": "string",
  "questoes": [
    {
      "id": "questao-1",
      "type": "multipla-escolha | discursiva | verdadeiro-falso",
      "enunciado": "string",
      "alternativas": ["string", "string", "string", "string"],
      "respostaCorreta": 0,
      "explicacao": "string"
    }
  ]
}"#;

pub fn strategy() -> ActivityStrategy {
  ActivityStrategy {
    activity_type: ActivityType::ListaExercicios,
    list_field: LIST_FIELD,
    build_prompt,
    validate,
    synthesize,
    render_text: None,
  }
}

struct Form {
  titulo: String,
  disciplina: String,
  tema: String,
  ano: String,
  dificuldade: String,
  modelo: String,
  objetivos: String,
  fontes: String,
  quantidade: usize,
}

fn read_form(f: &FormFields) -> Form {
  Form {
    titulo: field(f, &["titulo", "title"], "Lista de Exercícios"),
    disciplina: field(f, &["disciplina", "subject"], "Português"),
    tema: field(f, &["tema", "theme"], "Conteúdo Geral"),
    ano: field(f, &["anoEscolaridade", "schoolYear"], "6º ano"),
    dificuldade: field(f, &["nivelDificuldade", "difficultyLevel"], "Médio"),
    modelo: field(f, &["modeloQuestoes", "questionModel"], MULTIPLE_CHOICE),
    objetivos: field(f, &["objetivos", "objectives"], "Fixar os conceitos do tema"),
    fontes: field(f, &["fontes", "sources"], "Material didático padrão"),
    quantidade: quantity(f, &["numeroQuestoes", "numberOfQuestions"], 10),
  }
}

fn build_prompt(f: &FormFields) -> String {
  let form = read_form(f);
  let quantidade = form.quantidade.to_string();
  render(&PromptParts {
    role: "Você é um professor especialista em elaboração de listas de exercícios para a educação básica brasileira.",
    task: format!(
      "Crie exatamente {} questões sobre \"{}\" ({}) para o {}.",
      quantidade, form.tema, form.disciplina, form.ano
    ),
    context: vec![
      ("Título", form.titulo),
      ("Disciplina", form.disciplina),
      ("Tema", form.tema),
      ("Ano de escolaridade", form.ano),
      ("Nível de dificuldade", form.dificuldade),
      ("Modelo de questões", form.modelo.clone()),
      ("Quantidade de questões", quantidade.clone()),
      ("Objetivos", form.objetivos),
      ("Fontes", form.fontes),
    ],
    mandatory_fields: &[
      "questoes (lista com a quantidade pedida)",
      "questoes[].id",
      "questoes[].type",
      "questoes[].enunciado",
      "questoes[].alternativas (obrigatório em múltipla escolha)",
      "questoes[].respostaCorreta",
    ],
    rules: vec![
      format!("Todas as questões devem seguir o modelo \"{}\".", form.modelo),
      "Cada enunciado deve ser completo e autoexplicativo.".into(),
      "Questões de múltipla escolha têm 4 alternativas e respostaCorreta é o índice (0-3).".into(),
    ],
    shape: SHAPE,
  })
}

/// Map free-text question models onto the three supported tags.
pub fn normalize_question_type(raw: &str) -> &'static str {
  let lower = raw.to_lowercase();
  if lower.contains("discursiva") || lower.contains("dissertativa") || lower.contains("aberta") {
    ESSAY
  } else if lower.contains("verdadeiro") || lower.contains("falso") || lower.contains("v/f") {
    TRUE_FALSE
  } else {
    MULTIPLE_CHOICE
  }
}

fn default_alternatives() -> Vec<String> {
  ["Alternativa A", "Alternativa B", "Alternativa C", "Alternativa D"].iter().map(|s| s.to_string()).collect()
}

fn normalize_answer(raw: Option<&Value>, kind: &str) -> Value {
  match kind {
    TRUE_FALSE => {
      let b = match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "verdadeiro" | "v"),
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        _ => true,
      };
      Value::Bool(b)
    }
    ESSAY => Value::String(raw.and_then(value_text).unwrap_or_default()),
    _ => {
      let idx = match raw {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok().unwrap_or_else(|| {
          match s.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some(c @ 'a'..='e') => (c as u64) - ('a' as u64),
            _ => 0,
          }
        }),
        _ => 0,
      };
      json!(idx)
    }
  }
}

fn validate(value: Value, f: &FormFields) -> Result<Payload, ParseError> {
  let form = read_form(f);
  let mut obj = into_object(value, LIST_FIELD)?;
  let items = take_list(&mut obj, LIST_FIELD, LIST_ALIASES)?;

  let mut questions = Vec::with_capacity(items.len());
  for (i, item) in items.into_iter().enumerate() {
    let item = item_object(item, LIST_FIELD, i)?;
    let enunciado = first_text(&item, STATEMENT_KEYS).ok_or_else(|| ParseError::InvalidItem {
      field: LIST_FIELD.into(),
      index: i,
      reason: "missing enunciado".into(),
    })?;
    let raw_kind = first_text(&item, &["type", "tipo"]).unwrap_or_else(|| form.modelo.clone());
    let kind = normalize_question_type(&raw_kind);
    let alternativas = match kind {
      ESSAY => None,
      TRUE_FALSE => Some(vec!["Verdadeiro".to_string(), "Falso".to_string()]),
      _ => {
        let alts = super::string_list(
          item.get("alternativas").or_else(|| item.get("options")).or_else(|| item.get("alternatives")),
        );
        Some(if alts.len() >= 2 { alts.into_iter().take(5).collect() } else { default_alternatives() })
      }
    };
    let answer_raw = ["respostaCorreta", "correctAnswer", "correct_answer", "gabarito"]
      .iter()
      .find_map(|k| item.get(*k));
    questions.push(Question {
      id: item_id(&item, "questao", i),
      kind: kind.to_string(),
      enunciado,
      alternativas,
      resposta_correta: Some(normalize_answer(answer_raw, kind)),
      explicacao: first_text(&item, &["explicacao", "explanation", "justificativa"]).unwrap_or_default(),
    });
  }

  let mut out = Payload::new();
  keep_or(&mut out, &obj, &["titulo", "title"], "titulo", form.titulo);
  keep_or(&mut out, &obj, &["disciplina", "subject"], "disciplina", form.disciplina);
  keep_or(&mut out, &obj, &["tema", "theme"], "tema", form.tema);
  keep_or(&mut out, &obj, &["objetivos", "objectives"], "objetivos", form.objetivos);
  out.insert("dificuldade".into(), Value::String(form.dificuldade));
  out.insert("anoEscolaridade".into(), Value::String(form.ano));
  out.insert("numeroQuestoes".into(), json!(questions.len()));
  out.insert(
    LIST_FIELD.into(),
    serde_json::to_value(&questions).map_err(|e| ParseError::Malformed { reason: e.to_string() })?,
  );
  Ok(out)
}

fn synthesize(f: &FormFields) -> Payload {
  let form = read_form(f);
  let kind = normalize_question_type(&form.modelo);
  let questions: Vec<Question> = (0..form.quantidade)
    .map(|i| Question {
      id: format!("questao-{}", i + 1),
      kind: kind.to_string(),
      enunciado: placeholder(format_args!("Questão {} sobre {} ({}).", i + 1, form.tema, form.disciplina)),
      alternativas: match kind {
        ESSAY => None,
        TRUE_FALSE => Some(vec!["Verdadeiro".into(), "Falso".into()]),
        _ => Some(default_alternatives()),
      },
      resposta_correta: Some(normalize_answer(None, kind)),
      explicacao: String::new(),
    })
    .collect();

  let mut out = Payload::new();
  out.insert("titulo".into(), Value::String(form.titulo));
  out.insert("disciplina".into(), Value::String(form.disciplina));
  out.insert("tema".into(), Value::String(form.tema));
  out.insert("objetivos".into(), Value::String(form.objetivos));
  out.insert("dificuldade".into(), Value::String(form.dificuldade));
  out.insert("anoEscolaridade".into(), Value::String(form.ano));
  out.insert("numeroQuestoes".into(), json!(questions.len()));
  out.insert("observacoes".into(), Value::String(super::REGENERATE_HINT.into()));
  out.insert(LIST_FIELD.into(), serde_json::to_value(&questions).unwrap_or_else(|_| Value::Array(Vec::new())));
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::activities::PLACEHOLDER_MARKER;

  fn form(pairs: &[(&str, &str)]) -> FormFields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn question_types_are_normalized() {
    assert_eq!(normalize_question_type("Dissertativa"), ESSAY);
    assert_eq!(normalize_question_type("Verdadeiro/Falso"), TRUE_FALSE);
    assert_eq!(normalize_question_type("Múltipla Escolha"), MULTIPLE_CHOICE);
    assert_eq!(normalize_question_type("mc"), MULTIPLE_CHOICE);
  }

  #[test]
  fn statement_is_found_under_aliases() {
    let v = json!({"questions": [{"pergunta": "Quanto é 1/2 + 1/4?", "alternativas": ["3/4", "2/6"], "respostaCorreta": "a"}]});
    let p = validate(v, &FormFields::new()).unwrap();
    let q = &p["questions"][0];
    assert_eq!(q["id"], "questao-1");
    assert_eq!(q["enunciado"], "Quanto é 1/2 + 1/4?");
    assert_eq!(q["respostaCorreta"], 0);
    assert_eq!(q["alternativas"].as_array().unwrap().len(), 2);
  }

  #[test]
  fn item_without_statement_is_rejected() {
    let v = json!({"questoes": [{"id": "q1", "type": "mc"}]});
    assert!(matches!(validate(v, &FormFields::new()), Err(ParseError::InvalidItem { index: 0, .. })));
  }

  #[test]
  fn true_false_answers_become_booleans() {
    let v = json!([{"id": 7, "type": "V/F", "enunciado": "x", "respostaCorreta": "Falso"}]);
    let p = validate(v, &FormFields::new()).unwrap();
    assert_eq!(p["questions"][0]["id"], "7");
    assert_eq!(p["questions"][0]["respostaCorreta"], false);
    assert_eq!(p["questions"][0]["alternativas"], json!(["Verdadeiro", "Falso"]));
  }

  #[test]
  fn fallback_honours_quantity_and_theme() {
    let p = synthesize(&form(&[("theme", "Frações"), ("numberOfQuestions", "3")]));
    let qs = p["questions"].as_array().unwrap();
    assert_eq!(qs.len(), 3);
    for q in qs {
      let e = q["enunciado"].as_str().unwrap();
      assert!(e.contains("Frações") && e.contains(PLACEHOLDER_MARKER));
    }
  }
}
