//! Turning a model reply into a script.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use shortreel_common::error::{ReelError, ReelResult};
use shortreel_script_model::Script;

use crate::request::ScriptRequest;

/// Strip a surrounding markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fences(reply: &str) -> &str {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Script id derived from the generation time.
pub fn script_id(at: DateTime<Utc>) -> String {
    at.format("script_%Y%m%d_%H%M%S").to_string()
}

/// Parse a model reply and stamp the fields the model is not trusted with:
/// `id`, `topic`, `metadata.created_at` and `metadata.target_platforms`.
pub fn parse_generated(reply: &str, request: &ScriptRequest, at: DateTime<Utc>) -> ReelResult<Script> {
    let cleaned = strip_code_fences(reply);
    let mut value: Value = serde_json::from_str(cleaned).map_err(|e| {
        let preview: String = cleaned.chars().take(120).collect();
        ReelError::script_source(format!("reply is not valid JSON ({e}): {preview}"))
    })?;

    let Some(object) = value.as_object_mut() else {
        return Err(ReelError::script_source("reply is not a JSON object"));
    };
    object.insert("id".into(), Value::String(script_id(at)));
    object.insert("topic".into(), Value::String(request.topic.clone()));

    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Some(metadata) = metadata.as_object_mut() {
        metadata.insert("created_at".into(), Value::String(at.to_rfc3339()));
        metadata.insert(
            "target_platforms".into(),
            Value::Array(
                request
                    .target_platforms
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
    }

    serde_json::from_value(value)
        .map_err(|e| ReelError::script_source(format!("reply does not match the script shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const REPLY: &str = r#"{
        "title": "Tides",
        "total_duration": 6.0,
        "scenes": [{"id": "scene_1", "duration": 6.0, "type": "text", "content": "The moon pulls"}],
        "captions": [{"text": "The moon pulls", "start_time": 0.0, "end_time": 3.0}],
        "metadata": {"hashtags": ["ocean"]}
    }"#;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_parse_stamps_identity() {
        let req = ScriptRequest::new("ocean tides").with_platforms(vec!["tiktok".into()]);
        let script = parse_generated(&format!("```json\n{REPLY}\n```"), &req, at()).unwrap();

        assert_eq!(script.id, "script_20240309_140507");
        assert_eq!(script.topic, "ocean tides");
        assert_eq!(script.title, "Tides");
        assert_eq!(script.target_platforms(), vec!["tiktok".to_string()]);
        assert_eq!(script.metadata["hashtags"][0], "ocean");
        assert!(script.metadata["created_at"].as_str().unwrap().starts_with("2024-03-09T14:05:07"));
    }

    #[test]
    fn test_model_cannot_override_id() {
        let reply = REPLY.replacen("\"title\"", "\"id\": \"evil\", \"title\"", 1);
        let script = parse_generated(&reply, &ScriptRequest::new("t"), at()).unwrap();
        assert_eq!(script.id, "script_20240309_140507");
    }

    #[test]
    fn test_rejects_non_json_and_non_object() {
        let req = ScriptRequest::new("t");
        let err = parse_generated("Sure! Here is your script", &req, at()).unwrap_err();
        assert_eq!(err.stage(), "script_source");
        assert!(parse_generated("[1, 2]", &req, at()).is_err());
    }

    #[test]
    fn test_missing_metadata_is_created() {
        let reply = r#"{"title": "x", "total_duration": 1.0,
            "scenes": [{"id": "s", "duration": 1.0, "type": "text", "content": "x"}]}"#;
        let script = parse_generated(reply, &ScriptRequest::new("t"), at()).unwrap();
        assert!(script.metadata.contains_key("created_at"));
    }
}
