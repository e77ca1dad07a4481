//! Forgiving parsing of oracle responses.
//!
//! Models wrap JSON in prose, code fences or both. The strategy: try the
//! body as-is, then the widest `{...}` slice, then give up and let the
//! caller fall back to keyword matching.

use serde_json::Value;

/// Extract a JSON object from a response body.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Widest brace-delimited slice
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(|v| v.is_object())
}

/// Case-insensitive substring check used for keyword fallback parsing.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    text.to_lowercase().contains(&keyword.to_lowercase())
}

/// Pull a string field out of a JSON object, if present.
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Pull a numeric field out of a JSON object, if present.
pub fn f64_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json(r#"{"condition":"trending","reason":"EMA stack"}"#).unwrap();
        assert_eq!(str_field(&value, "condition").unwrap(), "trending");
    }

    #[test]
    fn test_extract_json_wrapped_in_prose() {
        let body = "Here is my analysis:\n```json\n{\"direction\":\"long\",\"confidence\":0.82}\n```\nGood luck.";
        let value = extract_json(body).unwrap();
        assert_eq!(f64_field(&value, "confidence").unwrap(), 0.82);
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{broken").is_none());
        assert!(extract_json("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        assert!(contains_keyword("I would go LONG here", "long"));
        assert!(!contains_keyword("stay flat", "short"));
    }
}
