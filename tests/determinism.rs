//! Property tests: compiling is a pure function of its input

mod common;

use billquery::sanitize_alias;
use common::{compile_pipeline, compile_sql, request};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn sanitize_is_idempotent(raw in "\\PC{0,24}") {
        let once = sanitize_alias(&raw);
        prop_assert_eq!(sanitize_alias(&once), once.clone());
        prop_assert_eq!(sanitize_alias(&raw), once);
    }

    #[test]
    fn sanitized_alias_is_an_identifier(raw in "\\PC{0,24}") {
        let alias = sanitize_alias(&raw);
        prop_assert!(!alias.is_empty());
        prop_assert!(!alias.starts_with(|c: char| c.is_ascii_digit()));
        prop_assert!(alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn compile_is_repeatable(
        key in "[a-z]{1,8}(\\.[a-z]{1,8})?",
        name in "[A-Z][a-z ]{0,11}",
        limit in 1u64..100,
        start in 1u64..5,
        desc in any::<bool>(),
    ) {
        let request = request(json!({
            "granularity": "MONTHLY", "start": "2024-01", "end": "2024-06",
            "group_by": [{"key": key, "name": name}],
            "fields": {"cost": {"operator": "sum", "key": "cost"}},
            "sort": [{"key": "cost", "desc": desc}],
            "page": {"start": start, "limit": limit}
        }));
        let sql = compile_sql(&request);
        prop_assert!(sql.is_ok());
        prop_assert_eq!(sql, compile_sql(&request));
        prop_assert_eq!(compile_pipeline(&request), compile_pipeline(&request));
    }
}

#[test]
fn test_cache_key_stable() {
    use billquery::{validate_analyze, RangeLimits};
    let a = request(json!({
        "granularity": "MONTHLY", "start": "2024-01", "end": "2024-02",
        "group_by": ["provider"]
    }));
    let b = request(json!({
        "granularity": "MONTHLY", "start": "2024-01", "end": "2024-03",
        "group_by": ["provider"]
    }));
    let limits = RangeLimits::default();
    let key_a = validate_analyze(&a, &limits).unwrap().cache_key();
    assert_eq!(key_a, validate_analyze(&a, &limits).unwrap().cache_key());
    assert_ne!(key_a, validate_analyze(&b, &limits).unwrap().cache_key());
    assert_eq!(key_a.len(), 64);
}
