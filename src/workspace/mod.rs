//! AI-generated workspace structures and the reply parser.
//!
//! The generation backend is instructed to reply with a single JSON object:
//!
//! ```json
//! {
//!   "type": "workspace",
//!   "files": [{"path": "src/index.js", "language": "js", "content": "..."}],
//!   "readme": "..."
//! }
//! ```
//!
//! Models do not always comply — replies may arrive fenced in backticks, or
//! as prose. The parser degrades to "no workspace" in every malformed case;
//! it never panics and never returns an error past this boundary, so callers
//! can fall back to rendering the reply as plain text.

pub mod tree;

pub use tree::{FileTree, TreeNode, TreeOp};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag value a structured reply must carry to be treated as a workspace.
pub const WORKSPACE_TAG: &str = "workspace";

/// One generated file. Paths are slash-separated with no leading slash;
/// directories are inferred by splitting the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, alias = "contents")]
    pub content: String,
}

/// A multi-file project description produced by the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(rename = "type")]
    kind: String,
    pub files: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
}

impl Workspace {
    pub fn new(files: Vec<FileEntry>, readme: Option<String>) -> Self {
        Self {
            kind: WORKSPACE_TAG.to_string(),
            files,
            readme,
        }
    }

    /// Accept an already-parsed value if it is tagged as a workspace and
    /// carries a sequence-valued `files` field. Re-validating a value built
    /// from a [`Workspace`] is a no-op round trip.
    pub fn from_value(value: Value) -> Option<Self> {
        if value.get("type").and_then(Value::as_str) != Some(WORKSPACE_TAG) {
            return None;
        }
        if !value.get("files").is_some_and(Value::is_array) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Parse a raw reply into a workspace.
    ///
    /// Strips a single surrounding code fence if present, then parses as
    /// JSON. Returns `None` — never an error — when the text is not a
    /// well-formed workspace.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = strip_code_fence(raw);
        let value: Value = serde_json::from_str(cleaned).ok()?;
        Self::from_value(value)
    }
}

/// Strip one leading/trailing triple-backtick fence. The opening line may
/// carry a language tag (```json). Text without a fence passes through
/// trimmed but otherwise untouched.
pub fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    let Some(after_ticks) = s.strip_prefix("```") else {
        return s;
    };
    let Some((tag, body)) = after_ticks.split_once('\n') else {
        return s;
    };
    if !tag.trim_end().chars().all(|c| c.is_ascii_alphanumeric()) {
        return s;
    }
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_workspace() -> Workspace {
        Workspace::new(
            vec![
                FileEntry {
                    path: "package.json".to_string(),
                    language: "json".to_string(),
                    content: "{\"name\":\"demo\"}".to_string(),
                },
                FileEntry {
                    path: "src/index.js".to_string(),
                    language: "js".to_string(),
                    content: "console.log('hi');".to_string(),
                },
            ],
            Some("# Demo".to_string()),
        )
    }

    #[test]
    fn parse_round_trips_a_serialized_workspace() {
        let ws = sample_workspace();
        let json = serde_json::to_string(&ws).unwrap();
        assert_eq!(Workspace::parse(&json), Some(ws));
    }

    #[test]
    fn parse_fenced_json_equals_unfenced() {
        let ws = sample_workspace();
        let json = serde_json::to_string(&ws).unwrap();
        let fenced = format!("```json\n{}\n```", json);
        assert_eq!(Workspace::parse(&fenced), Workspace::parse(&json));
        let bare_fence = format!("```\n{}\n```", json);
        assert_eq!(Workspace::parse(&bare_fence), Some(ws));
    }

    #[test]
    fn parse_rejects_non_json_silently() {
        assert_eq!(Workspace::parse("Sure! Here is your server: ..."), None);
        assert_eq!(Workspace::parse(""), None);
        assert_eq!(Workspace::parse("{not json"), None);
    }

    #[test]
    fn parse_rejects_wrong_tag_or_missing_files() {
        assert_eq!(
            Workspace::parse(r#"{"type":"diff","files":[]}"#),
            None
        );
        assert_eq!(Workspace::parse(r#"{"type":"workspace"}"#), None);
        assert_eq!(
            Workspace::parse(r#"{"type":"workspace","files":"nope"}"#),
            None
        );
    }

    #[test]
    fn from_value_is_idempotent_on_structured_input() {
        let ws = sample_workspace();
        let value = serde_json::to_value(&ws).unwrap();
        assert_eq!(Workspace::from_value(value), Some(ws));
    }

    #[test]
    fn contents_alias_is_accepted() {
        let parsed = Workspace::parse(
            r#"{"type":"workspace","files":[{"path":"a.js","contents":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.files[0].content, "x");
        assert_eq!(parsed.files[0].language, "");
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
        // Backticks with no newline are not a fence.
        assert_eq!(strip_code_fence("```{}```"), "```{}```");
        // An opening line that is not a bare language tag is left alone.
        assert_eq!(
            strip_code_fence("``` not a tag\n{}\n```"),
            "``` not a tag\n{}\n```"
        );
    }
}
