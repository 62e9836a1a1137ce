//! Permissive decoding of model output.
//!
//! Three tiers, in order: strict decode of the whole response, then the first
//! bracketed span (greedy to the last matching closer), then nothing.

use serde_json::Value;

/// Decode any JSON value out of free text.
pub fn parse_json_value(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }
    extract_json_span(text)
}

/// Decode a list of items out of free text. A lone object counts as a
/// single-item list; scalars count as nothing.
pub fn parse_json_list(text: &str) -> Option<Vec<Value>> {
    match parse_json_value(text)? {
        Value::Array(items) => Some(items),
        obj @ Value::Object(_) => Some(vec![obj]),
        _ => None,
    }
}

/// Find the first `[...]` or `{...}` span (whichever opens first) and decode
/// it. When that fails, the other bracket kind gets one attempt.
pub fn extract_json_span(text: &str) -> Option<Value> {
    let array_start = text.find('[');
    let object_start = text.find('{');

    let order: [(char, char); 2] = match (array_start, object_start) {
        (Some(a), Some(o)) if o < a => [('{', '}'), ('[', ']')],
        (None, Some(_)) => [('{', '}'), ('[', ']')],
        _ => [('[', ']'), ('{', '}')],
    };

    order.iter().find_map(|&(open, close)| decode_span(text, open, close))
}

fn decode_span(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_parse() {
        let v = parse_json_value(r#"  [{"a": 1}]  "#).unwrap();
        assert_eq!(v, json!([{"a": 1}]));
    }

    #[test]
    fn test_span_inside_prose() {
        let text = "Sure! Here you go:\n```json\n[{\"claim_text\": \"x\"}]\n```\nHope that helps.";
        let items = parse_json_list(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["claim_text"], "x");
    }

    #[test]
    fn test_object_before_array() {
        let text = "verdict: {\"pass\": true, \"rationale\": \"cites [1]\"} done";
        let v = parse_json_value(text).unwrap();
        assert_eq!(v["pass"], true);
    }

    #[test]
    fn test_falls_back_to_other_bracket() {
        // The leading "[" opens a span that is not JSON, the object still decodes.
        let text = "[note] {\"pass\": false}";
        let v = parse_json_value(text).unwrap();
        assert_eq!(v["pass"], false);
    }

    #[test]
    fn test_lone_object_is_single_item_list() {
        let items = parse_json_list("{\"claim_text\": \"a\"}").unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_garbage_yields_none() {
        assert!(parse_json_value("no json here").is_none());
        assert!(parse_json_list("[not, json").is_none());
        assert!(parse_json_list("42").is_none());
    }
}
