//! The Planner's structured action schema (§4.2 step 3): extracting
//! `{query_knowledge, preview_patch, finalize}` from raw LLM output under
//! strict JSON Schema enforcement, sharing the same `jsonschema`-backed
//! validation code path the Graph Model uses for node configs.

use std::sync::OnceLock;

use graph_model::Patch;
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// One of the three actions the ReAct loop can extract from an LLM turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    QueryKnowledge { query: String, scope: Option<String> },
    PreviewPatch { patch: Patch, continue_editing: bool },
    Finalize,
}

fn action_schema() -> &'static jsonschema::JSONSchema {
    static SCHEMA: OnceLock<jsonschema::JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let doc = serde_json::json!({
            "type": "object",
            "required": ["action"],
            "properties": {
                "action": { "enum": ["query_knowledge", "preview_patch", "finalize"] }
            }
        });
        jsonschema::JSONSchema::compile(&doc).expect("literal action schema must compile")
    })
}

/// Extract the structured action from one turn of raw LLM output.
///
/// The LLM is instructed to emit exactly one JSON object, optionally fenced
/// in a ```` ```json ```` code block; this function tolerates the fence and
/// surrounding prose but requires the JSON object itself to validate
/// against the strict action schema before attempting to deserialize it
/// into an [`Action`] variant (§4.2 step 3: "failure to parse counts as one
/// retry attempt").
pub fn extract_action(raw: &str) -> Result<Action, PlannerError> {
    let json_text = extract_json_object(raw).ok_or_else(|| {
        PlannerError::ParseFailure(format!("no JSON object found in LLM output: {raw}"))
    })?;

    let value: serde_json::Value = serde_json::from_str(&json_text)
        .map_err(|e| PlannerError::ParseFailure(format!("invalid JSON: {e}")))?;

    if let Err(errors) = action_schema().validate(&value) {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(PlannerError::ParseFailure(format!(
            "action schema violation(s): {}",
            messages.join("; ")
        )));
    }

    serde_json::from_value(value).map_err(|e| PlannerError::ParseFailure(format!("action did not match any known shape: {e}")))
}

/// Finds the first balanced `{...}` span in `raw`, tolerating a leading
/// ```` ```json ```` / trailing ```` ``` ```` fence and surrounding prose.
fn extract_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_finalize_action() {
        let action = extract_action(r#"I'm done. {"action": "finalize"}"#).unwrap();
        assert!(matches!(action, Action::Finalize));
    }

    #[test]
    fn extracts_query_knowledge_action() {
        let action = extract_action(r#"{"action": "query_knowledge", "query": "pricing", "scope": null}"#).unwrap();
        match action {
            Action::QueryKnowledge { query, .. } => assert_eq!(query, "pricing"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn extracts_json_fenced_in_markdown() {
        let raw = "```json\n{\"action\": \"finalize\"}\n```";
        assert!(matches!(extract_action(raw).unwrap(), Action::Finalize));
    }

    #[test]
    fn missing_action_field_is_a_parse_failure() {
        let err = extract_action(r#"{"foo": "bar"}"#).unwrap_err();
        assert!(matches!(err, PlannerError::ParseFailure(_)));
    }

    #[test]
    fn unknown_action_value_is_a_parse_failure() {
        let err = extract_action(r#"{"action": "teleport"}"#).unwrap_err();
        assert!(matches!(err, PlannerError::ParseFailure(_)));
    }

    #[test]
    fn no_json_at_all_is_a_parse_failure() {
        let err = extract_action("I am still thinking...").unwrap_err();
        assert!(matches!(err, PlannerError::ParseFailure(_)));
    }
}
