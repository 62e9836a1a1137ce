//! Path expressions over JSON payloads.
//!
//! `a.b[0].c`, `items[*].name`; the empty path selects the root. Missing keys
//! and `null` values drop out of the selection.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Index {
    All,
    At(usize),
}

fn parse_token(token: &str) -> (&str, Option<Index>) {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN.get_or_init(|| Regex::new(r"^([A-Za-z0-9_]+)(?:\[(\*|\d+)\])?$").expect("valid token pattern"));

    let Some(caps) = re.captures(token) else {
        return (token, None);
    };
    let name = caps.get(1).map_or(token, |m| m.as_str());
    let index = caps.get(2).and_then(|m| match m.as_str() {
        "*" => Some(Index::All),
        n => n.parse().ok().map(Index::At),
    });
    (name, index)
}

/// Every value selected by `path`, in document order.
pub fn expand_path<'a>(data: &'a Value, path: &str) -> Vec<&'a Value> {
    if path.is_empty() {
        return vec![data];
    }

    let mut nodes = vec![data];
    for token in path.split('.').filter(|t| !t.is_empty()) {
        let (name, index) = parse_token(token);
        let mut next = Vec::new();

        for node in nodes {
            let value = node.get(name).filter(|v| !v.is_null());
            match (&index, value) {
                (_, None) => {}
                (None, Some(v)) => next.push(v),
                (Some(Index::All), Some(Value::Array(items))) => next.extend(items.iter()),
                (Some(Index::At(i)), Some(Value::Array(items))) => next.extend(items.get(*i)),
                (Some(_), Some(_)) => {}
            }
        }
        nodes = next;
    }
    nodes
}

/// Non-null, non-blank string, non-empty list or object, any number or bool.
pub fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Numeric view of a value; numeric strings count.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// String view of a value; strings are taken verbatim, everything else is
/// rendered as JSON.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "propositions": [
                {"payload": {"claim_text": "a"}, "anchors": [{"quote": "qa"}]},
                {"payload": {"claim_text": "b"}, "anchors": []},
                {"payload": {"claim_text": null}}
            ],
            "status": "ok",
            "nothing": null
        })
    }

    #[test]
    fn test_root_and_plain_keys() {
        let data = payload();
        assert_eq!(expand_path(&data, ""), vec![&data]);
        assert_eq!(expand_path(&data, "status"), vec![&json!("ok")]);
        assert!(expand_path(&data, "nothing").is_empty());
        assert!(expand_path(&data, "missing.deeper").is_empty());
    }

    #[test]
    fn test_wildcard_and_index() {
        let data = payload();
        let texts = expand_path(&data, "propositions[*].payload.claim_text");
        assert_eq!(texts, vec![&json!("a"), &json!("b")]);

        assert_eq!(expand_path(&data, "propositions[1].payload.claim_text"), vec![&json!("b")]);
        assert!(expand_path(&data, "propositions[9].payload").is_empty());
        assert_eq!(expand_path(&data, "propositions[*].anchors[0].quote"), vec![&json!("qa")]);
    }

    #[test]
    fn test_index_on_non_list_drops() {
        let data = payload();
        assert!(expand_path(&data, "status[0]").is_empty());
    }

    #[test]
    fn test_has_value() {
        assert!(!has_value(&json!(null)));
        assert!(!has_value(&json!("  ")));
        assert!(!has_value(&json!([])));
        assert!(!has_value(&json!({})));
        assert!(has_value(&json!(0)));
        assert!(has_value(&json!(false)));
        assert!(has_value(&json!("x")));
    }

    #[test]
    fn test_scalar_views() {
        assert_eq!(to_f64(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(to_f64(&json!(3)), Some(3.0));
        assert_eq!(to_f64(&json!([1])), None);
        assert_eq!(as_text(&json!(12)), "12");
        assert_eq!(as_text(&json!("x")), "x");
    }
}
