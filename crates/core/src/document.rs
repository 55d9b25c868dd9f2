use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, ProjectId};

/// Who produced a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Agent,
}

impl Author {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

/// Period and place a manuscript is set in.  Passed to the AI service so
/// rewrites and analysis stay consistent with the story world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Setting {
    pub time_period: String,
    pub location: String,
}

impl Setting {
    pub fn is_empty(&self) -> bool {
        self.time_period.trim().is_empty() && self.location.trim().is_empty()
    }
}

/// One flagged passage in an analysis.  `quote` is whatever the model
/// copied from the text, which may not match the buffer byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisIssue {
    pub quote: String,
    pub issue: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// Pacing score 0–10 as reported by the model.
    pub pacing_score: Option<f32>,
    pub issues: Vec<AnalysisIssue>,
}

/// Persisted shape of one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub project_id: ProjectId,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(
        id: DocumentId,
        project_id: ProjectId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            project_id,
            title: title.into(),
            content: content.into(),
            analysis: None,
            updated_at: Utc::now(),
        }
    }
}
