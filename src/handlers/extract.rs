//! Pull the reply text out of whatever JSON shape a conversation endpoint
//! returns.

use serde_json::Value;

/// Paths tried in order before the loose scan.
const REPLY_POINTERS: &[&str] = &[
    "/response/speech/plain/speech",
    "/response/speech",
    "/speech",
    "/content",
    "/response/content",
    "/message",
    "/text",
];

/// Loose-scan candidates must be longer than this to count as a reply.
const MIN_LOOSE_REPLY_CHARS: usize = 10;

fn non_empty(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn loose_candidate(key: &str, value: &Value) -> Option<String> {
    if key.starts_with('_') {
        return None;
    }
    let text = value.as_str()?;
    (text.chars().count() > MIN_LOOSE_REPLY_CHARS).then(|| text.trim().to_string())
}

/// Extract the reply text from a handler response body.
pub fn extract_reply(body: &Value) -> Option<String> {
    if let Some(text) = non_empty(body) {
        return Some(text);
    }

    for pointer in REPLY_POINTERS {
        if let Some(text) = body.pointer(pointer).and_then(non_empty) {
            tracing::debug!(path = pointer, "Extracted handler reply");
            return Some(text);
        }
    }

    let object = body.as_object()?;
    for (key, value) in object {
        if let Some(text) = loose_candidate(key, value) {
            tracing::warn!(key = %key, "Using loose reply extraction");
            return Some(text);
        }
        if let Some(nested) = value.as_object() {
            for (nested_key, nested_value) in nested {
                if let Some(text) = loose_candidate(nested_key, nested_value) {
                    tracing::warn!(key = %key, nested_key = %nested_key, "Using loose reply extraction");
                    return Some(text);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_scan_follows_response_key_order() {
        let body: Value = serde_json::from_str(
            r#"{"zeta": "The lights are now on.", "alpha": "A different long string"}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(&body).as_deref(), Some("The lights are now on."));
    }

    #[test]
    fn nested_plain_speech_is_preferred() {
        let body = json!({
            "response": {"speech": {"plain": {"speech": "  It is sunny.  "}}},
            "text": "ignored"
        });
        assert_eq!(extract_reply(&body).as_deref(), Some("It is sunny."));
    }

    #[test]
    fn flat_shapes_are_recognized() {
        assert_eq!(
            extract_reply(&json!({"response": {"speech": "done"}})).as_deref(),
            Some("done")
        );
        assert_eq!(extract_reply(&json!({"speech": "ok"})).as_deref(), Some("ok"));
        assert_eq!(extract_reply(&json!({"content": "hi"})).as_deref(), Some("hi"));
        assert_eq!(
            extract_reply(&json!({"response": {"content": "nested"}})).as_deref(),
            Some("nested")
        );
        assert_eq!(extract_reply(&json!({"message": "m"})).as_deref(), Some("m"));
        assert_eq!(extract_reply(&json!({"text": "t"})).as_deref(), Some("t"));
    }

    #[test]
    fn bare_string_body_is_the_reply() {
        assert_eq!(extract_reply(&json!("plain reply")).as_deref(), Some("plain reply"));
    }

    #[test]
    fn blank_known_fields_fall_through_to_loose_scan() {
        let body = json!({"speech": "  ", "answer": "The lights are now on."});
        assert_eq!(
            extract_reply(&body).as_deref(),
            Some("The lights are now on.")
        );
    }

    #[test]
    fn loose_scan_skips_private_and_short_values() {
        let body = json!({"_debug": "a very long internal value", "id": "abc"});
        assert_eq!(extract_reply(&body), None);

        let nested = json!({"data": {"reply": "Garage door is closed."}});
        assert_eq!(
            extract_reply(&nested).as_deref(),
            Some("Garage door is closed.")
        );
    }

    #[test]
    fn nothing_extractable() {
        assert_eq!(extract_reply(&json!({"count": 3})), None);
        assert_eq!(extract_reply(&json!(null)), None);
    }
}
