//! Field remapping of resolved reference values.

use serde_json::Value;
use twinlink_core::catalog::{MappingRule, FIELD_MAPPING_DEFAULT_KEY};

/// Remapped value that suppresses the whole message.
pub const DROP_SENTINEL: &str = "_";

/// Remap `raw` through the rule's table for `reference`.
///
/// Without a table the raw value passes through. With a table, an entry
/// whose key equals the raw value wins, then the `default` entry, then the
/// raw value itself. Only string values are compared against keys, so a
/// number or boolean never hits an entry and falls back to `default`.
pub fn remap(rule: &MappingRule, reference: &str, raw: &Value) -> Value {
    let Some(table) = rule.field_mapping(reference) else {
        return raw.clone();
    };

    let matched = raw.as_str().and_then(|key| {
        table
            .iter()
            .find(|(k, _)| k.as_str() != FIELD_MAPPING_DEFAULT_KEY && k.as_str() == key)
            .map(|(_, v)| v)
    });

    matched
        .or_else(|| table.get(FIELD_MAPPING_DEFAULT_KEY))
        .cloned()
        .unwrap_or_else(|| raw.clone())
}

/// Whether a remapped value is the drop sentinel.
pub fn is_drop(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == DROP_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule() -> MappingRule {
        MappingRule::new()
            .with_template(json!({"state": "$state", "level": "$level", "raw": "$raw"}))
            .with_field_mapping("$state", json!({"ON": 1, "OFF": 0, "default": -1}))
            .with_field_mapping("$level", json!({"7": "high", "true": "yes"}))
    }

    #[test]
    fn test_exact_match_wins_over_default() {
        assert_eq!(remap(&rule(), "$state", &json!("ON")), json!(1));
        assert_eq!(remap(&rule(), "$state", &json!("OFF")), json!(0));
    }

    #[test]
    fn test_default_when_nothing_matches() {
        assert_eq!(remap(&rule(), "$state", &json!("BLINK")), json!(-1));
        assert_eq!(remap(&rule(), "$state", &json!({"nested": 1})), json!(-1));
    }

    #[test]
    fn test_raw_value_without_table() {
        assert_eq!(remap(&rule(), "$raw", &json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn test_raw_value_without_match_or_default() {
        assert_eq!(remap(&rule(), "$level", &json!("low")), json!("low"));
    }

    #[test]
    fn test_non_string_values_skip_keyed_entries() {
        let rule = MappingRule::new()
            .with_template(json!({"code": "$code"}))
            .with_field_mapping("$code", json!({"1": "_", "true": "_", "default": "ok"}));
        assert_eq!(remap(&rule, "$code", &json!(1)), json!("ok"));
        assert_eq!(remap(&rule, "$code", &json!(true)), json!("ok"));
        assert_eq!(remap(&rule, "$code", &json!("1")), json!("_"));

        assert_eq!(remap(&self::rule(), "$level", &json!(7)), json!(7));
        assert_eq!(remap(&self::rule(), "$level", &json!("7")), json!("high"));
    }

    #[test]
    fn test_default_key_is_not_a_match_candidate() {
        let rule = MappingRule::new()
            .with_template(json!({"x": "$x"}))
            .with_field_mapping("$x", json!({"default": "fallback", "a": "A"}));
        assert_eq!(remap(&rule, "$x", &json!("default")), json!("fallback"));
        assert_eq!(remap(&rule, "$x", &json!("a")), json!("A"));
    }

    #[test]
    fn test_is_drop() {
        assert!(is_drop(&json!("_")));
        assert!(!is_drop(&json!("__")));
        assert!(!is_drop(&json!(null)));
    }
}
