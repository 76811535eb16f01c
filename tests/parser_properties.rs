use proptest::prelude::*;
use schoolpower_builder::activities::Registry;
use schoolpower_builder::domain::{ActivityRequest, ActivityType, FormFields};
use schoolpower_builder::parser::{extract_json, parse};
use serde_json::{json, Map, Value};

fn wrap(prefix: &str, body: &str, fenced: bool, suffix: &str) -> String {
    if fenced {
        format!("{prefix}\n```json\n{body}\n```\n{suffix}")
    } else {
        format!("{prefix} {body} {suffix}")
    }
}

proptest! {
    #[test]
    fn wrapped_object_is_extracted_unchanged(
        fields in prop::collection::btree_map("[a-z]{1,8}", "[a-z{} \"\\\\]{0,12}", 1..6),
        prefix in "[A-Za-z .,:!]{0,60}",
        suffix in "[A-Za-z .,:!]{0,60}",
        fenced in any::<bool>(),
    ) {
        let obj: Map<String, Value> = fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        let body = serde_json::to_string(&obj).unwrap();
        let extracted = extract_json(&wrap(&prefix, &body, fenced, &suffix)).unwrap();
        prop_assert_eq!(extracted, Value::Object(obj));
    }

    #[test]
    fn wrapped_exercise_list_keeps_every_statement(
        statements in prop::collection::vec("[A-Za-z0-9][A-Za-z0-9 ,.?]{0,39}", 1..8),
        prefix in "[A-Za-z .,:!]{0,60}",
        suffix in "[A-Za-z .,:!]{0,60}",
        fenced in any::<bool>(),
    ) {
        let items: Vec<Value> = statements.iter().map(|s| json!({"enunciado": s, "type": "discursiva"})).collect();
        let body = json!({ "questoes": items }).to_string();
        let registry = Registry::default();
        let strategy = registry.get(ActivityType::ListaExercicios).unwrap();
        let req = ActivityRequest::new(ActivityType::ListaExercicios, FormFields::new());

        let activity = parse(&wrap(&prefix, &body, fenced, &suffix), strategy, &req).unwrap();
        prop_assert!(activity.is_generated_by_ai && !activity.is_fallback);
        let got: Vec<&str> = activity.items("questions").iter().map(|q| q["enunciado"].as_str().unwrap()).collect();
        let want: Vec<&str> = statements.iter().map(|s| s.trim()).collect();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn parse_never_panics_on_arbitrary_text(raw in ".{0,300}") {
        let registry = Registry::default();
        for t in ActivityType::ALL {
            let strategy = registry.get(t).unwrap();
            let _ = parse(&raw, strategy, &ActivityRequest::new(t, FormFields::new()));
        }
    }
}
