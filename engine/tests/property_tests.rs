use annotator_engine::config::Config;
use annotator_engine::session::key::sanitize_component;
use annotator_engine::session::SessionKey;
use annotator_engine::strategy::parse::{extract_answer, parse_label_line};
use proptest::prelude::*;
use sdk::types::{LabelFields, StrategyKind};
use std::collections::HashSet;
use std::path::Component;

fn strategy_kind() -> impl Strategy<Value = StrategyKind> {
    prop::sample::select(StrategyKind::ALL.to_vec())
}

proptest! {
    // Sanitized components never carry separators or reserved characters
    #[test]
    fn test_sanitized_component_is_path_safe(text in any::<String>(), max in 1usize..64) {
        let component = sanitize_component(&text, Some(max));

        prop_assert!(!component.is_empty());
        prop_assert!(component.chars().count() <= max.max("untitled".len()));
        for forbidden in ['/', '\\', ':', '?', '"', '*', '<', '>', '|', '.'] {
            prop_assert!(!component.contains(forbidden), "{:?} kept {:?}", component, forbidden);
        }
    }

    // Every key stays inside the store root
    #[test]
    fn test_parallel_key_path_is_relative(
        task in any::<String>(),
        ordinal in 1usize..100_000,
        title in any::<String>(),
        kind in strategy_kind(),
    ) {
        let key = SessionKey::parallel(&task, ordinal, &title, kind);
        let path = key.relative_path();

        prop_assert_eq!(path.components().count(), 3);
        prop_assert!(path.components().all(|c| matches!(c, Component::Normal(_))));

        let reparsed = SessionKey::parse(&key.to_string()).unwrap();
        prop_assert_eq!(reparsed, key);
    }

    // Distinct (record, strategy) pairs never share a session, whatever the titles
    #[test]
    fn test_keys_unique_per_record_and_strategy(titles in prop::collection::vec(any::<String>(), 1..12)) {
        let mut seen = HashSet::new();
        for (i, title) in titles.iter().enumerate() {
            for kind in StrategyKind::ALL {
                let key = SessionKey::parallel("task", i + 1, title, kind);
                prop_assert!(seen.insert(key.to_string()));
            }
        }
    }

    // Reasoning text never leaks into the parsed answer
    #[test]
    fn test_thinking_block_is_skipped(
        reasoning in "[a-z0-9 \t\n]{0,80}",
        renewal in 0u8..2,
    ) {
        let reply = format!("<thinking>{}</thinking>\n{}\t0\t\t", reasoning, renewal);
        let mut fields = LabelFields::default();

        parse_label_line(extract_answer(&reply), &mut fields).unwrap();

        prop_assert_eq!(fields.urban_renewal.map(|b| b.as_digit().to_string()), Some(renewal.to_string()));
        prop_assert_eq!(fields.spatial_level, None);
    }
}

proptest! {
    // A serialized config parses back to the same values
    #[test]
    fn test_config_round_trip(
        log_level in "error|warn|info|debug|trace",
        max_attempts in 1u32..10,
        backoff_ms in 1u64..60_000,
        cap in prop::option::of(1usize..16),
        threshold in 0.05f64..=1.0,
        strategies in prop::collection::vec(strategy_kind(), 1..5),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_config();
        config.core.log_level = log_level.clone();
        config.core.data_dir = dir.path().join("data");
        config.gateway.max_attempts = max_attempts;
        config.gateway.initial_backoff_ms = backoff_ms;
        config.scheduler.concurrency_cap = cap;
        config.scheduler.strategies = strategies.clone();
        config.memory.warning_threshold = threshold;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();

        prop_assert_eq!(parsed.core.log_level, log_level);
        prop_assert_eq!(parsed.gateway.max_attempts, max_attempts);
        prop_assert_eq!(parsed.gateway.initial_backoff_ms, backoff_ms);
        prop_assert_eq!(parsed.scheduler.concurrency_cap, cap);
        prop_assert_eq!(parsed.scheduler.strategies, strategies);
        prop_assert!((parsed.memory.warning_threshold - threshold).abs() < 1e-12);
    }
}
