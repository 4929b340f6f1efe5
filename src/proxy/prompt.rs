//! Prompt inference - deterministic mapping from a tool call to a short
//! natural-language sentence
//!
//! When no explicit user prompt has been logged, the proxy synthesizes one
//! from the tool name and arguments so the timeline still carries user-level
//! context. This is fire-and-forget: it must never block forwarding.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Infer a user-facing sentence from `(tool_name, tool_args)`.
///
/// Known tool-name fragments map to canonical phrases; everything else falls
/// back to `"use <tool_name> tool"`. The mapping is deterministic so repeated
/// calls with the same input produce the same sentence.
pub fn infer_user_prompt(tool_name: &str, tool_args: Option<&Value>) -> String {
    let lowered = tool_name.to_lowercase();

    if lowered.contains("search") {
        let query = arg_str(tool_args, &["query", "search_term"]);
        return match query {
            Some(q) => format!("search for {q}"),
            None => "search for something".to_string(),
        };
    }

    if lowered.contains("file") {
        let file = arg_str(tool_args, &["target_file", "file", "path"]);
        return match file {
            Some(f) => format!("work with file {f}"),
            None => "work with a file".to_string(),
        };
    }

    if lowered.contains("memory") {
        return "access or update memory".to_string();
    }

    if lowered.contains("workflow") {
        return "run workflow or automation".to_string();
    }

    if lowered.contains("status") {
        return format!("check status via {tool_name}");
    }

    // Generic fallback
    format!("use {tool_name} tool")
}

/// Derive a stable conversation id for an inferred prompt.
///
/// Hashes server, tool, and the capture second so calls within the same
/// second correlate to one conversation without leaking argument content.
pub fn conversation_id(server_name: &str, tool_name: &str, timestamp: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_name.as_bytes());
    hasher.update(b"/");
    hasher.update(tool_name.as_bytes());
    hasher.update(b"@");
    hasher.update(timestamp.timestamp().to_le_bytes());
    let digest = hasher.finalize();
    // 8 bytes of digest is plenty for a local correlation key
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn arg_str<'a>(args: Option<&'a Value>, keys: &[&str]) -> Option<&'a str> {
    let args = args?;
    keys.iter()
        .find_map(|k| args.get(k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_tools_use_the_query_argument() {
        let args = json!({"query": "rust async"});
        assert_eq!(
            infer_user_prompt("webSearch", Some(&args)),
            "search for rust async"
        );
        assert_eq!(
            infer_user_prompt("codebase_search", None),
            "search for something"
        );
    }

    #[test]
    fn file_tools_name_the_file() {
        let args = json!({"target_file": "src/main.rs"});
        assert_eq!(
            infer_user_prompt("read_file", Some(&args)),
            "work with file src/main.rs"
        );
    }

    #[test]
    fn generic_fallback_names_the_tool() {
        assert_eq!(
            infer_user_prompt("get_weather", None),
            "use get_weather tool"
        );
    }

    #[test]
    fn inference_is_deterministic() {
        let args = json!({"query": "x"});
        assert_eq!(
            infer_user_prompt("search", Some(&args)),
            infer_user_prompt("search", Some(&args))
        );
    }

    #[test]
    fn conversation_id_is_stable_within_a_second() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123).unwrap();
        let ts_same_sec = DateTime::from_timestamp(1_700_000_000, 999_000).unwrap();
        assert_eq!(
            conversation_id("mastra", "search", ts),
            conversation_id("mastra", "search", ts_same_sec)
        );
        let later = DateTime::from_timestamp(1_700_000_001, 0).unwrap();
        assert_ne!(
            conversation_id("mastra", "search", ts),
            conversation_id("mastra", "search", later)
        );
    }
}
