use proptest::prelude::*;
use schoolpower_builder::config::StorageSettings;
use schoolpower_builder::store::{is_protected, priority_for, ActivityStore, Priority};
use serde_json::json;

const PREFIXES: &[&str] = &[
    "generated_content_",
    "constructed_flash-cards_",
    "text_content_plano-aula_",
    "app_settings_",
];

fn filled(entries: &[(usize, i64, usize)]) -> ActivityStore {
    let mut store = ActivityStore::in_memory(StorageSettings { capacity_bytes: 10_000_000, ..Default::default() });
    for (i, (prefix, ts, pad)) in entries.iter().enumerate() {
        let key = format!("{}{}", PREFIXES[*prefix], i);
        assert!(store.save(&key, &json!({ "timestamp": ts, "data": "x".repeat(*pad) })));
    }
    store
}

proptest! {
    #[test]
    fn eviction_respects_priorities_and_protection(
        entries in prop::collection::vec((0..PREFIXES.len(), 0i64..1_000, 0usize..400), 1..30),
        target in 0usize..20_000,
    ) {
        let mut store = filled(&entries);
        let before = store.entries();
        let disposable: usize = before.iter().filter(|e| e.priority != Priority::High).map(|e| e.size_bytes).sum();
        let evictable: usize = before.iter().map(|e| e.size_bytes).sum();

        let report = store.evict(target);

        prop_assert!(report.removed.iter().all(|k| !is_protected(k)));
        if disposable >= target {
            prop_assert!(report.removed.iter().all(|k| priority_for(k) != Priority::High));
        }
        prop_assert!(report.freed_bytes >= target.min(disposable) || report.freed_bytes == evictable);
        prop_assert_eq!(store.entries().len(), before.len() - report.removed.len());
    }

    #[test]
    fn repeated_save_leaves_usage_unchanged(pad in 0usize..2_000, key in "constructed_[a-z]{1,10}") {
        let mut store = ActivityStore::in_memory(StorageSettings::default());
        let value = json!({ "data": "y".repeat(pad) });
        prop_assert!(store.save(&key, &value));
        let once = store.usage_bytes();
        prop_assert!(store.save(&key, &value));
        prop_assert_eq!(store.usage_bytes(), once);
    }
}
