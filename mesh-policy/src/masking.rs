//! Response masking.
//!
//! Replaces the value of every sensitive key with the `"***"` sentinel,
//! recursively and without mutating the input. Rules are dot-separated
//! field paths; matching is by leaf name at any depth, so `account.ssn`
//! masks every `ssn` key wherever it appears.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Sentinel written over masked values.
pub const MASK_SENTINEL: &str = "***";

/// Returns a copy of `value` with every field named by `rules` masked.
///
/// Arrays are descended element-wise, scalars are returned unchanged, and
/// keys absent from the payload are ignored. Masked values always become
/// the string sentinel regardless of their original type. Runs in a single
/// pass over the payload.
#[must_use]
pub fn mask(value: &Value, rules: &[String]) -> Value {
    if rules.is_empty() {
        return value.clone();
    }
    let leaves: HashSet<&str> = rules
        .iter()
        .map(|rule| rule.rsplit('.').next().unwrap_or(rule))
        .collect();
    walk(value, &leaves)
}

fn walk(value: &Value, leaves: &HashSet<&str>) -> Value {
    match value {
        Value::Object(map) => {
            let mut masked = Map::with_capacity(map.len());
            for (key, child) in map {
                if leaves.contains(key.as_str()) {
                    masked.insert(key.clone(), Value::String(MASK_SENTINEL.to_owned()));
                } else {
                    masked.insert(key.clone(), walk(child, leaves));
                }
            }
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| walk(item, leaves)).collect()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(names: &[&str]) -> Vec<String> {
        names.iter().map(|&n| n.to_owned()).collect()
    }

    #[test]
    fn empty_rule_set_is_identity() {
        let payload = json!({"name": "Acme", "rows": [1, 2, 3]});
        assert_eq!(mask(&payload, &[]), payload);
    }

    #[test]
    fn masks_rows_element_wise() {
        let payload = json!({"rows": [
            {"name": "Acme", "customer_email": "ceo@acme.com", "customer_phone": "+1-555-0123"},
            {"name": "Globex", "customer_email": "cfo@globex.com", "customer_phone": "+1-555-0456"}
        ]});
        let masked = mask(&payload, &rules(&["customer_email", "customer_phone"]));
        for row in masked["rows"].as_array().unwrap() {
            assert_eq!(row["customer_email"], "***");
            assert_eq!(row["customer_phone"], "***");
            assert_ne!(row["name"], "***");
        }
    }

    #[test]
    fn masks_at_any_depth() {
        let payload = json!({"a": {"b": {"c": {"ssn": "123-45-6789", "keep": true}}}});
        let masked = mask(&payload, &rules(&["ssn"]));
        assert_eq!(masked["a"]["b"]["c"]["ssn"], "***");
        assert_eq!(masked["a"]["b"]["c"]["keep"], true);
    }

    #[test]
    fn leaf_name_of_dotted_path_applies() {
        let payload = json!({"account": {"ssn": 123456789}, "ssn": null});
        let masked = mask(&payload, &rules(&["account.ssn"]));
        assert_eq!(masked["account"]["ssn"], "***");
        assert_eq!(masked["ssn"], "***");
    }

    #[test]
    fn non_string_sensitive_values_become_sentinel() {
        let payload = json!({"balance": 42.5, "active": true, "note": null});
        let masked = mask(&payload, &rules(&["balance", "active", "note"]));
        assert_eq!(masked["balance"], "***");
        assert_eq!(masked["active"], "***");
        assert_eq!(masked["note"], "***");
    }

    #[test]
    fn absent_keys_are_ignored_and_input_is_untouched() {
        let payload = json!({"name": "Acme"});
        let masked = mask(&payload, &rules(&["customer_email"]));
        assert_eq!(masked, payload);
        assert_eq!(payload["name"], "Acme");
    }

    #[test]
    fn masking_is_idempotent() {
        let payload = json!({"rows": [{"customer_email": "x@y.z", "n": 1}]});
        let rules = rules(&["customer_email"]);
        let once = mask(&payload, &rules);
        let twice = mask(&once, &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(mask(&json!(42), &rules(&["x"])), json!(42));
        assert_eq!(mask(&json!("hello"), &rules(&["x"])), json!("hello"));
    }
}
