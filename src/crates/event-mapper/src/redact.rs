//! Static redaction of sensitive config fields (§4.5) before a domain
//! event's metadata/content crosses into an SSE envelope — e.g. a
//! `side_effect_request`'s node config must not leak an API key or
//! authorization header to the client.

use serde_json::Value;

/// Field names redacted wherever they appear in a JSON object, at any
/// nesting depth. Deliberately static and explicit rather than a heuristic
/// (entropy scanning, regex) — matching the closed-registry philosophy the
/// rest of this workspace uses for node types and alias tables.
const DENY_LIST: &[&str] = &[
    "api_key",
    "apikey",
    "authorization",
    "auth_token",
    "token",
    "secret",
    "password",
    "client_secret",
    "private_key",
    "access_key",
];

const REDACTED: &str = "***redacted***";

fn is_denied(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENY_LIST.iter().any(|deny| lower == *deny || lower.contains(deny))
}

/// Recursively redact denied fields from a JSON value, returning a new,
/// redacted copy. Arrays and nested objects are walked; scalars pass
/// through unchanged.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_denied(k) {
                    out.insert(k.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(k.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_top_level_and_nested_keys() {
        let input = serde_json::json!({
            "url": "https://api.example.com",
            "headers": { "Authorization": "Bearer xyz", "Content-Type": "application/json" },
            "api_key": "sk-123",
        });
        let redacted = redact(&input);
        assert_eq!(redacted["url"], "https://api.example.com");
        assert_eq!(redacted["headers"]["Authorization"], REDACTED);
        assert_eq!(redacted["headers"]["Content-Type"], "application/json");
        assert_eq!(redacted["api_key"], REDACTED);
    }

    #[test]
    fn leaves_non_sensitive_payload_untouched() {
        let input = serde_json::json!({ "model": "gpt-x", "temperature": 0.2 });
        assert_eq!(redact(&input), input);
    }
}
