//! Structural "looks like beach data" predicates
//!
//! These deliberately check a minimal field set on the first element only,
//! independent of the full transformation in [`crate::transform`].

use serde_json::Value;

/// Fields the direct API response must expose on its first element
pub const API_REQUIRED_FIELDS: [&str; 2] = ["id", "beachName"];

/// Fields a payload captured inside the page must expose on its first element
pub const PAGE_REQUIRED_FIELDS: [&str; 2] = ["id", "latitude"];

/// Direct-fetch shape: non-empty array, first element with identity and name
#[must_use]
pub fn looks_like_api_payload(value: &Value) -> bool {
    first_element_has(value, &API_REQUIRED_FIELDS)
}

/// In-page shape: non-empty array, first element with identity and a coordinate
#[must_use]
pub fn looks_like_page_payload(value: &Value) -> bool {
    first_element_has(value, &PAGE_REQUIRED_FIELDS)
}

/// Parse `text` and apply the in-page check, yielding the list on success
#[must_use]
pub fn parse_page_payload(text: &str) -> Option<Vec<Value>> {
    let value = serde_json::from_str::<Value>(text.trim()).ok()?;
    if !looks_like_page_payload(&value) {
        return None;
    }
    match value {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

fn first_element_has(value: &Value, fields: &[&str]) -> bool {
    let Some(first) = value.as_array().and_then(|items| items.first()) else {
        return false;
    };
    let Some(object) = first.as_object() else {
        return false;
    };
    fields.iter().all(|field| match object.get(*field) {
        None | Some(Value::Null) => false,
        // An empty name counts as absent
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_payload_shape() {
        assert!(looks_like_api_payload(&json!([{"id": 1, "beachName": "Amager"}])));
        assert!(!looks_like_api_payload(&json!([{"id": 1}])));
        assert!(!looks_like_api_payload(&json!([{"id": 1, "beachName": ""}])));
        assert!(!looks_like_api_payload(&json!([])));
        assert!(!looks_like_api_payload(&json!({"id": 1, "beachName": "Amager"})));
        assert!(!looks_like_api_payload(&json!(["Amager"])));
    }

    #[test]
    fn test_page_payload_shape() {
        assert!(looks_like_page_payload(&json!([{"id": 3, "latitude": 55.6}])));
        assert!(looks_like_page_payload(&json!([{"id": 0, "latitude": 0}])));
        assert!(!looks_like_page_payload(&json!([{"id": 3, "beachName": "Amager"}])));
        assert!(!looks_like_page_payload(&json!([{"id": null, "latitude": 55.6}])));
    }

    #[test]
    fn test_only_first_element_is_checked() {
        let payload = json!([{"id": 1, "beachName": "A", "latitude": 1.0}, {"unrelated": true}]);
        assert!(looks_like_api_payload(&payload));
        assert!(looks_like_page_payload(&payload));
    }

    #[test]
    fn test_text_check() {
        let items = parse_page_payload(r#" [{"id": 1, "latitude": 56.0}, "stray"] "#).unwrap();
        assert_eq!(items.len(), 2);
        assert!(parse_page_payload("<html><body>Checking your browser</body></html>").is_none());
        assert!(parse_page_payload(r#"{"id": 1, "latitude": 56.0}"#).is_none());
        assert!(parse_page_payload("").is_none());
    }
}
