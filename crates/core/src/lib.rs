pub mod document;
pub mod ids;
pub mod lore;

pub use document::{AnalysisIssue, AnalysisResult, Author, DocumentRecord, Setting};
pub use ids::{DocumentId, ProjectId};
pub use lore::{
    AttributeValue, CharacterEntry, Contradiction, ContradictionKind, ExtractedCharacter,
    Extraction, ManuscriptIndex, Mention,
};
