//! Lesson plan (`plano-aula`): `payload.objetivos` and `payload.steps`.
//!
//! Lesson plans also get a plain-text rendering that is persisted under a
//! high-priority key, since it is what teachers print and edit.

use serde_json::{json, Value};

use super::{field, first_text, into_object, item_id, item_object, keep_or, placeholder, quantity, string_list, take_list, ActivityStrategy};
use crate::domain::{ActivityType, FormFields, LessonStep, Payload};
use crate::error::ParseError;
use crate::prompt::{render, PromptParts};

const LIST_FIELD: &str = "steps";
const LIST_ALIASES: &[&str] = &["etapas", "desenvolvimento"];

const SHAPE: &str = r#"{
  "titulo": "string",
  "visaoGeral": { "disciplina": "string", "tema": "string", "serie": "string", "tempo": "string", "metodologia": "string", "recursos": ["string"] },
  "objetivos": ["string"],
  "etapas": [
    { "id": 1, "titulo": "string", "descricao": "string", "duracao": "10 min" }
  ],
  "avaliacao": "string"
}"#;

pub fn strategy() -> ActivityStrategy {
  ActivityStrategy {
    activity_type: ActivityType::PlanoAula,
    list_field: LIST_FIELD,
    build_prompt,
    validate,
    synthesize,
    render_text: Some(render_text),
  }
}

struct Form {
  titulo: String,
  disciplina: String,
  tema: String,
  serie: String,
  tempo: String,
  metodologia: String,
  objetivos: String,
  etapas: usize,
}

fn read_form(f: &FormFields) -> Form {
  Form {
    titulo: field(f, &["titulo", "title"], "Plano de Aula"),
    disciplina: field(f, &["disciplina", "subject"], "Disciplina"),
    tema: field(f, &["tema", "theme"], "Tema da aula"),
    serie: field(f, &["anoEscolaridade", "schoolYear", "serie"], "Ensino Fundamental"),
    tempo: field(f, &["tempoLimite", "duration", "tempo"], "50 minutos"),
    metodologia: field(f, &["metodologia", "methodology"], "Aula expositiva dialogada"),
    objetivos: field(f, &["objetivos", "objectives"], "Compreender os conceitos centrais do tema"),
    etapas: quantity(f, &["numeroEtapas", "numberOfSteps"], 5),
  }
}

fn build_prompt(f: &FormFields) -> String {
  let form = read_form(f);
  render(&PromptParts {
    role: "Você é um coordenador pedagógico experiente na elaboração de planos de aula alinhados à BNCC.",
    task: format!(
      "Elabore um plano de aula sobre \"{}\" ({}) com {} etapas de desenvolvimento.",
      form.tema, form.disciplina, form.etapas
    ),
    context: vec![
      ("Título", form.titulo),
      ("Disciplina", form.disciplina),
      ("Tema", form.tema),
      ("Série", form.serie),
      ("Duração", form.tempo),
      ("Metodologia", form.metodologia),
      ("Objetivos informados", form.objetivos),
      ("Quantidade de etapas", form.etapas.to_string()),
    ],
    mandatory_fields: &["titulo", "objetivos (lista não vazia)", "etapas (lista não vazia)", "etapas[].titulo", "etapas[].descricao"],
    rules: vec![
      "Cada etapa descreve o que professor e alunos fazem.".into(),
      "As durações das etapas somam a duração da aula.".into(),
    ],
    shape: SHAPE,
  })
}

fn validate(value: Value, f: &FormFields) -> Result<Payload, ParseError> {
  let form = read_form(f);
  let mut obj = into_object(value, LIST_FIELD)?;
  let items = take_list(&mut obj, LIST_FIELD, LIST_ALIASES)?;

  let objetivos = string_list(obj.get("objetivos").or_else(|| obj.get("objectives")));
  if objetivos.is_empty() {
    return Err(ParseError::EmptyList { field: "objetivos".into() });
  }

  let mut steps = Vec::with_capacity(items.len());
  for (i, item) in items.into_iter().enumerate() {
    let item = item_object(item, LIST_FIELD, i)?;
    let invalid = |reason: &str| ParseError::InvalidItem { field: LIST_FIELD.into(), index: i, reason: reason.into() };
    steps.push(LessonStep {
      id: item_id(&item, "etapa", i),
      titulo: first_text(&item, &["titulo", "title", "etapa", "nome"]).ok_or_else(|| invalid("missing titulo"))?,
      descricao: first_text(&item, &["descricao", "description", "atividades", "conteudo"])
        .ok_or_else(|| invalid("missing descricao"))?,
      duracao: first_text(&item, &["duracao", "duration", "tempo"]),
    });
  }

  let mut out = Payload::new();
  keep_or(&mut out, &obj, &["titulo", "title"], "titulo", form.titulo);
  let visao = match obj.remove("visaoGeral") {
    Some(Value::Object(v)) => Value::Object(v),
    _ => json!({
      "disciplina": form.disciplina,
      "tema": form.tema,
      "serie": form.serie,
      "tempo": form.tempo,
      "metodologia": form.metodologia,
      "recursos": [],
    }),
  };
  out.insert("visaoGeral".into(), visao);
  out.insert("objetivos".into(), json!(objetivos));
  keep_or(&mut out, &obj, &["avaliacao", "evaluation"], "avaliacao", String::new());
  out.insert(
    LIST_FIELD.into(),
    serde_json::to_value(&steps).map_err(|e| ParseError::Malformed { reason: e.to_string() })?,
  );
  Ok(out)
}

fn synthesize(f: &FormFields) -> Payload {
  let form = read_form(f);
  let steps: Vec<LessonStep> = (0..form.etapas)
    .map(|i| LessonStep {
      id: format!("etapa-{}", i + 1),
      titulo: format!("Etapa {}", i + 1),
      descricao: placeholder(format_args!("Atividade {} sobre {}.", i + 1, form.tema)),
      duracao: None,
    })
    .collect();

  let mut out = Payload::new();
  out.insert("titulo".into(), Value::String(form.titulo));
  out.insert(
    "visaoGeral".into(),
    json!({
      "disciplina": form.disciplina,
      "tema": form.tema,
      "serie": form.serie,
      "tempo": form.tempo,
      "metodologia": form.metodologia,
      "recursos": [],
    }),
  );
  out.insert("objetivos".into(), json!([form.objetivos]));
  out.insert("avaliacao".into(), Value::String(super::REGENERATE_HINT.into()));
  out.insert(LIST_FIELD.into(), serde_json::to_value(&steps).unwrap_or_else(|_| Value::Array(Vec::new())));
  out
}

/// Plain-text version of a validated payload.
fn render_text(p: &Payload) -> String {
  let mut out = String::new();
  let title = p.get("titulo").and_then(Value::as_str).unwrap_or("Plano de Aula");
  out.push_str(&format!("# {title}\n\n"));

  if let Some(Value::Object(v)) = p.get("visaoGeral") {
    out.push_str("## Visão geral\n");
    for key in ["disciplina", "tema", "serie", "tempo", "metodologia"] {
      if let Some(s) = v.get(key).and_then(Value::as_str) {
        out.push_str(&format!("- {key}: {s}\n"));
      }
    }
    out.push('\n');
  }

  out.push_str("## Objetivos\n");
  for o in string_list(p.get("objetivos")) {
    out.push_str(&format!("- {o}\n"));
  }

  out.push_str("\n## Desenvolvimento\n");
  if let Some(Value::Array(steps)) = p.get(LIST_FIELD) {
    for (i, s) in steps.iter().enumerate() {
      let titulo = s.get("titulo").and_then(Value::as_str).unwrap_or("");
      let descricao = s.get("descricao").and_then(Value::as_str).unwrap_or("");
      match s.get("duracao").and_then(Value::as_str) {
        Some(d) => out.push_str(&format!("{}. {} ({})\n   {}\n", i + 1, titulo, d, descricao)),
        None => out.push_str(&format!("{}. {}\n   {}\n", i + 1, titulo, descricao)),
      }
    }
  }

  if let Some(a) = p.get("avaliacao").and_then(Value::as_str).filter(|a| !a.is_empty()) {
    out.push_str(&format!("\n## Avaliação\n{a}\n"));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn etapas_alias_and_object_objectives_are_accepted() {
    let v = json!({
      "titulo": "Frações no cotidiano",
      "objetivos": [{"descricao": "Reconhecer frações"}],
      "etapas": [{"titulo": "Abertura", "descricao": "Roda de conversa", "duracao": "10 min"}]
    });
    let p = validate(v, &FormFields::new()).unwrap();
    assert_eq!(p["objetivos"], json!(["Reconhecer frações"]));
    assert_eq!(p["steps"][0]["id"], "etapa-1");

    let text = render_text(&p);
    assert!(text.starts_with("# Frações no cotidiano"));
    assert!(text.contains("1. Abertura (10 min)"));
  }

  #[test]
  fn missing_objectives_fail_validation() {
    let v = json!({"steps": [{"titulo": "a", "descricao": "b"}], "objetivos": []});
    assert_eq!(validate(v, &FormFields::new()), Err(ParseError::EmptyList { field: "objetivos".into() }));
  }
}
