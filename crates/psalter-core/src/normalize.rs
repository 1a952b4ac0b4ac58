//! Error message normalization.
//!
//! Errors reach the stores in several shapes: direct gateway rejections carry
//! `data.message` or `data.error`, errors wrapped by an API client carry
//! `response.data.message`, and everything else is at best an object with a
//! `message`. The first matching rule wins:
//!
//! 1. `data.message`
//! 2. `data.error`
//! 3. `response.data.message`
//! 4. `message`
//! 5. [`FALLBACK_MESSAGE`]

use serde_json::Value;

pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(*key))
        .and_then(Value::as_str)
}

/// Produce the display message for an error payload. Never fails.
pub fn normalize_error(value: &Value) -> String {
    const RULES: [&[&str]; 4] = [
        &["data", "message"],
        &["data", "error"],
        &["response", "data", "message"],
        &["message"],
    ];

    RULES
        .iter()
        .find_map(|path| string_at(value, path))
        .unwrap_or(FALLBACK_MESSAGE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence() {
        let all = json!({
            "message": "native",
            "data": {"message": "data message", "error": "data error"},
            "response": {"data": {"message": "wrapped"}}
        });
        assert_eq!(normalize_error(&all), "data message");

        let no_data_message = json!({
            "message": "native",
            "data": {"error": "data error"},
            "response": {"data": {"message": "wrapped"}}
        });
        assert_eq!(normalize_error(&no_data_message), "data error");

        let wrapped = json!({
            "message": "native",
            "response": {"data": {"message": "wrapped"}}
        });
        assert_eq!(normalize_error(&wrapped), "wrapped");

        let native = json!({"message": "native"});
        assert_eq!(normalize_error(&native), "native");
    }

    #[test]
    fn test_fallback_for_unrecognized_shapes() {
        assert_eq!(normalize_error(&json!("just a string")), FALLBACK_MESSAGE);
        assert_eq!(normalize_error(&json!(null)), FALLBACK_MESSAGE);
        assert_eq!(normalize_error(&json!(42)), FALLBACK_MESSAGE);
        assert_eq!(normalize_error(&json!({"data": {}})), FALLBACK_MESSAGE);
    }

    #[test]
    fn test_non_string_fields_are_skipped() {
        let value = json!({
            "data": {"message": 17, "error": {"nested": true}},
            "message": "fallthrough"
        });
        assert_eq!(normalize_error(&value), "fallthrough");
    }
}
