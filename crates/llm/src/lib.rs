//! AI text service boundary: the [`TextService`] trait the editor core talks
//! to, and an HTTP-backed implementation over Ollama / OpenRouter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use quill_core::{AnalysisResult, Extraction, Setting};

pub mod prompts;
mod router;
mod service;

pub use router::{LlmRouter, OllamaClient, OpenRouterClient, Provider};
pub use service::LlmTextService;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The caller abandoned the request.  Not a failure; callers drop it.
    #[error("request cancelled")]
    Cancelled,
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("input too large: {0}")]
    TooLarge(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ── Request kinds ────────────────────────────────────────────────────────────

/// Rewrite flavours offered for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    Clarify,
    Tighten,
    Expand,
    ShowDontTell,
    DialogueDoctor,
    /// Shift the passage toward the tone passed alongside the request.
    ToneTuner,
}

impl RewriteMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Clarify => "Clarify",
            Self::Tighten => "Tighten",
            Self::Expand => "Expand",
            Self::ShowDontTell => "Show, Don't Tell",
            Self::DialogueDoctor => "Dialogue Doctor",
            Self::ToneTuner => "Tone Tuner",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' ', ','], "_").as_str() {
            "clarify" => Some(Self::Clarify),
            "tighten" => Some(Self::Tighten),
            "expand" => Some(Self::Expand),
            "show_dont_tell" | "show__don't_tell" | "show_don't_tell" => Some(Self::ShowDontTell),
            "dialogue_doctor" | "dialogue" => Some(Self::DialogueDoctor),
            "tone_tuner" | "tone" => Some(Self::ToneTuner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelpKind {
    Define,
    Explain,
}

// ── Service trait ────────────────────────────────────────────────────────────

/// Opaque async AI capability.  Every call takes a cancellation token; an
/// implementation should stop early when it fires, and must report that with
/// [`ServiceError::Cancelled`] rather than a real failure.
#[async_trait]
pub trait TextService: Send + Sync {
    async fn analyze(
        &self,
        text: &str,
        setting: Option<&Setting>,
        lore: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, ServiceError>;

    async fn rewrite(
        &self,
        text: &str,
        mode: RewriteMode,
        tone: Option<&str>,
        setting: Option<&Setting>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ServiceError>;

    async fn explain_or_define(
        &self,
        text: &str,
        kind: HelpKind,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError>;

    async fn extract_entities(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ServiceError>;
}

// ── Structured output extraction ──────────────────────────────────────────────

/// Extract the first valid JSON value from an LLM reply.
///
/// Tries a fenced ` ```json ` block first, then falls back to the span from
/// the first `{` to the last `}`.  Returns `None` when neither parses.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(val) = serde_json::from_str(&trimmed[start..=end]) {
                return Some(val);
            }
        }
    }

    None
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Variations {
        variations: Vec<String>,
    }

    #[test]
    fn extract_fenced_json() {
        let raw = "Sure!\n```json\n{\"variations\":[\"a\",\"b\"]}\n```";
        let out = extract_json_output::<Variations>(raw).unwrap();
        assert_eq!(out.variations, vec!["a", "b"]);
    }

    #[test]
    fn extract_bare_json_with_surrounding_text() {
        let raw = "here you go {\"variations\":[\"only\"]} hope it helps";
        let out = extract_json_output::<Variations>(raw).unwrap();
        assert_eq!(out.variations, vec!["only"]);
    }

    /// Fenced blocks win even when a bare object precedes them.
    #[test]
    fn extract_fenced_takes_precedence_over_bare() {
        let raw = "Bare: {\"variations\":[\"wrong\"]}\n```json\n{\"variations\":[\"right\"]}\n```\n";
        let out = extract_json_output::<Variations>(raw).unwrap();
        assert_eq!(out.variations, vec!["right"]);
    }

    #[test]
    fn extract_returns_none_for_plain_text() {
        assert!(extract_json_output::<Variations>("no json here").is_none());
        assert!(extract_json_output::<Variations>("").is_none());
        assert!(extract_json_output::<Variations>("```json\n{not json}\n```").is_none());
    }

    #[test]
    fn extract_analysis_result() {
        let raw = r#"```json
{"summary":"Strong opening","pacing_score":7.5,"issues":[{"quote":"It was dark.","issue":"cliche","suggestion":"Be specific"}]}
```"#;
        let out = extract_json_output::<AnalysisResult>(raw).unwrap();
        assert_eq!(out.summary, "Strong opening");
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].quote, "It was dark.");
    }

    #[test]
    fn rewrite_mode_labels_parse_back() {
        for mode in [
            RewriteMode::Clarify,
            RewriteMode::Tighten,
            RewriteMode::Expand,
            RewriteMode::ShowDontTell,
            RewriteMode::DialogueDoctor,
            RewriteMode::ToneTuner,
        ] {
            assert_eq!(RewriteMode::from_label(mode.label()), Some(mode), "{}", mode.label());
        }
        assert_eq!(RewriteMode::from_label("show-dont-tell"), Some(RewriteMode::ShowDontTell));
        assert_eq!(RewriteMode::from_label("paraphrase"), None);
    }

    #[test]
    fn only_cancelled_reports_cancellation() {
        assert!(ServiceError::Cancelled.is_cancelled());
        assert!(!ServiceError::RateLimited("x".into()).is_cancelled());
    }
}
