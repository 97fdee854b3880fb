//! Flat string hashes as stored by the broker.

use std::collections::BTreeMap;

use serde_json::Value;

/// A broker hash: field name to string value.
pub type Fields = BTreeMap<String, String>;

/// Merge `incoming` into `base`. Incoming fields win on collision; fields
/// absent from `incoming` are left untouched.
pub fn merge_fields(base: &mut Fields, incoming: Fields) {
    base.extend(incoming);
}

/// Flatten a JSON payload into hash fields.
///
/// Object members become one field each: strings are stored as-is, every
/// other value as compact JSON. Anything that is not an object is stored
/// whole under the single field `data`.
pub fn payload_fields(payload: &Value) -> Fields {
    match payload {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect(),
        other => Fields::from([("data".to_string(), other.to_string())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_members_become_fields() {
        let fields = payload_fields(&json!({"action": "grant", "level": 3, "tags": ["a"]}));
        assert_eq!(fields["action"], "grant");
        assert_eq!(fields["level"], "3");
        assert_eq!(fields["tags"], r#"["a"]"#);
    }

    #[test]
    fn scalar_payload_is_stored_under_data() {
        let fields = payload_fields(&json!(42));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["data"], "42");
    }

    #[test]
    fn merge_prefers_incoming_values() {
        let mut base = Fields::from([
            ("action".to_string(), "revoke".to_string()),
            ("kept".to_string(), "yes".to_string()),
        ]);
        merge_fields(&mut base, Fields::from([("action".to_string(), "grant".to_string())]));
        assert_eq!(base["action"], "grant");
        assert_eq!(base["kept"], "yes");
    }
}
