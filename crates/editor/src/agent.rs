//! Structured edit requests from the assistant.
//!
//! Tool calls arrive as `(name, params)` and are parsed once, at the
//! boundary, into [`AgentAction`].  Planning an action never touches the
//! buffer: edits come back as a [`PendingDiff`] for the author to review.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use quill_core::Author;

use crate::error::EditError;
use crate::review::PendingDiff;

pub const DEFAULT_EDIT_DESCRIPTION: &str = "Agent edit";
pub const DEFAULT_APPEND_DESCRIPTION: &str = "Agent append";

const UNDO_GUIDANCE: &str = "Undo is not available to the assistant. Ask the author to use the \
                             Undo control in the editor to revert the last change.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum AgentAction {
    /// Replace the single exact occurrence of `search_text`.
    UpdateManuscript {
        search_text: String,
        replacement_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    AppendToManuscript {
        text_to_add: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    UndoLastChange {},
}

impl AgentAction {
    /// Validate a raw tool call.  Unknown names and malformed or missing
    /// params are [`EditError::InvalidAction`].
    pub fn parse(name: &str, params: Value) -> Result<Self, EditError> {
        let params = if params.is_null() { json!({}) } else { params };
        let action: Self = serde_json::from_value(json!({ "action": name, "params": params }))
            .map_err(|err| EditError::InvalidAction(format!("{name}: {err}")))?;

        match &action {
            Self::UpdateManuscript { search_text, .. } if search_text.is_empty() => Err(
                EditError::InvalidAction("search_text must not be empty".into()),
            ),
            Self::AppendToManuscript { text_to_add, .. } if text_to_add.is_empty() => Err(
                EditError::InvalidAction("text_to_add must not be empty".into()),
            ),
            _ => Ok(action),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateManuscript { .. } => "update_manuscript",
            Self::AppendToManuscript { .. } => "append_to_manuscript",
            Self::UndoLastChange {} => "undo_last_change",
        }
    }
}

/// What an action resolves to against the current buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentPlan {
    Propose(PendingDiff),
    /// Nothing to review; relay the message to the assistant.
    Reply(String),
}

pub fn plan(action: &AgentAction, buffer: &str) -> Result<AgentPlan, EditError> {
    match action {
        AgentAction::UpdateManuscript {
            search_text,
            replacement_text,
            description,
        } => {
            let count = buffer.matches(search_text.as_str()).count();
            match count {
                0 => Err(EditError::NotFound),
                1 => {
                    let modified = buffer.replacen(search_text.as_str(), replacement_text, 1);
                    Ok(AgentPlan::Propose(PendingDiff::new(
                        buffer,
                        modified,
                        description.as_deref().unwrap_or(DEFAULT_EDIT_DESCRIPTION),
                        Author::Agent,
                    )))
                }
                count => Err(EditError::Ambiguous { count }),
            }
        }
        AgentAction::AppendToManuscript {
            text_to_add,
            description,
        } => {
            let separator = if buffer.is_empty() || buffer.ends_with('\n') { "" } else { "\n" };
            Ok(AgentPlan::Propose(PendingDiff::new(
                buffer,
                format!("{buffer}{separator}{text_to_add}"),
                description.as_deref().unwrap_or(DEFAULT_APPEND_DESCRIPTION),
                Author::Agent,
            )))
        }
        AgentAction::UndoLastChange {} => Ok(AgentPlan::Reply(UNDO_GUIDANCE.to_string())),
    }
}

// ── Tool schemas ─────────────────────────────────────────────────────────────

struct ToolParam {
    name: &'static str,
    description: &'static str,
    required: bool,
}

impl ToolParam {
    const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: true,
        }
    }

    const fn optional(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: false,
        }
    }
}

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    params: Vec<ToolParam>,
}

impl ToolSpec {
    fn to_openai_tool_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.to_string(),
                json!({ "type": "string", "description": param.description }),
            );
            if param.required {
                required.push(param.name);
            }
        }
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// OpenAI-compatible `tools` entries for every [`AgentAction`].
pub fn agent_tool_schemas() -> Vec<Value> {
    let specs = [
        ToolSpec {
            name: "update_manuscript",
            description: "Propose replacing one exact passage of the open chapter. The search \
                          text must occur exactly once; the author reviews the change before \
                          it is applied.",
            params: vec![
                ToolParam::required("search_text", "Exact text to replace, copied verbatim."),
                ToolParam::required("replacement_text", "Text to put in its place."),
                ToolParam::optional("description", "Short summary of the change."),
            ],
        },
        ToolSpec {
            name: "append_to_manuscript",
            description: "Propose adding text to the end of the open chapter.",
            params: vec![
                ToolParam::required("text_to_add", "Text to append."),
                ToolParam::optional("description", "Short summary of the change."),
            ],
        },
        ToolSpec {
            name: "undo_last_change",
            description: "Explains how the author can undo the last change.",
            params: Vec::new(),
        },
    ];
    specs.iter().map(ToolSpec::to_openai_tool_schema).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(search: &str, replacement: &str) -> AgentAction {
        AgentAction::parse(
            "update_manuscript",
            json!({ "search_text": search, "replacement_text": replacement }),
        )
        .unwrap()
    }

    fn proposed(plan: AgentPlan) -> PendingDiff {
        match plan {
            AgentPlan::Propose(diff) => diff,
            other => panic!("expected a proposal, got {other:?}"),
        }
    }

    #[test]
    fn single_occurrence_is_replaced() {
        let diff = proposed(plan(&update("cat", "dog"), "The cat sat.").unwrap());
        assert_eq!(diff.original, "The cat sat.");
        assert_eq!(diff.modified, "The dog sat.");
        assert_eq!(diff.description, DEFAULT_EDIT_DESCRIPTION);
        assert_eq!(diff.author, Author::Agent);
    }

    #[test]
    fn missing_text_is_not_found() {
        let err = plan(&update("bird", "dog"), "The cat sat.").unwrap_err();
        assert!(matches!(err, EditError::NotFound));
        assert!(err.to_string().contains("be more specific"));
    }

    #[test]
    fn repeated_text_is_ambiguous() {
        let err = plan(&update("cat", "dog"), "The cat saw another cat.").unwrap_err();
        assert!(matches!(err, EditError::Ambiguous { count: 2 }));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn occurrences_do_not_overlap() {
        // "aa" occurs once without overlap in "aaa".
        let diff = proposed(plan(&update("aa", "b"), "aaa").unwrap());
        assert_eq!(diff.modified, "ba");
    }

    #[test]
    fn append_inserts_a_newline_only_when_needed() {
        let action = AgentAction::parse(
            "append_to_manuscript",
            json!({ "text_to_add": "The end.", "description": "Close" }),
        )
        .unwrap();

        let diff = proposed(plan(&action, "Last line").unwrap());
        assert_eq!(diff.modified, "Last line\nThe end.");
        assert_eq!(diff.description, "Close");
        assert_eq!(proposed(plan(&action, "Last line\n").unwrap()).modified, "Last line\nThe end.");
        assert_eq!(proposed(plan(&action, "").unwrap()).modified, "The end.");
    }

    #[test]
    fn undo_is_guidance_only() {
        for params in [json!({}), Value::Null] {
            let action = AgentAction::parse("undo_last_change", params).unwrap();
            match plan(&action, "text").unwrap() {
                AgentPlan::Reply(message) => assert!(message.contains("Undo")),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn bad_calls_are_invalid() {
        let unknown = AgentAction::parse("delete_everything", json!({})).unwrap_err();
        assert!(matches!(unknown, EditError::InvalidAction(_)));

        let missing = AgentAction::parse("update_manuscript", json!({ "search_text": "x" }));
        assert!(matches!(missing, Err(EditError::InvalidAction(_))));

        let empty = AgentAction::parse(
            "update_manuscript",
            json!({ "search_text": "", "replacement_text": "x" }),
        );
        assert!(matches!(empty, Err(EditError::InvalidAction(_))));
    }

    #[test]
    fn schemas_cover_every_action() {
        let schemas = agent_tool_schemas();
        let names: Vec<&str> = schemas
            .iter()
            .map(|s| s["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["update_manuscript", "append_to_manuscript", "undo_last_change"]);
        assert_eq!(
            schemas[0]["function"]["parameters"]["required"],
            json!(["search_text", "replacement_text"])
        );
        assert_eq!(schemas[2]["function"]["parameters"]["properties"], json!({}));
    }
}
