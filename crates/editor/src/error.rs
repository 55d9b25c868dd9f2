use thiserror::Error;
use uuid::Uuid;

use quill_core::DocumentId;

/// Recoverable failures of editing operations.
///
/// The `Display` text is written for whoever has to act on it: the author in
/// the editor, or the assistant reading a failed tool call.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("could not find exact text; be more specific or quote more of the surrounding passage")]
    NotFound,
    #[error("the text occurs {count} times; quote more of the surrounding passage so it matches exactly once")]
    Ambiguous { count: usize },
    #[error("the text changed since it was selected; select it again")]
    StaleSelection,
    #[error("the document changed since this change was proposed; ask for a new proposal")]
    StaleProposal,
    #[error("no document is open")]
    NoActiveDocument,
    #[error("document {0} does not exist")]
    UnknownDocument(DocumentId),
    #[error("nothing is selected")]
    NoSelection,
    #[error("there is no pending change to review")]
    NothingPending,
    #[error("no history entry with id {0}")]
    UnknownEntry(Uuid),
    #[error("invalid agent action: {0}")]
    InvalidAction(String),
    #[error("there is no rewrite to apply")]
    NoProposal,
    #[error("rewrite variant {0} does not exist")]
    NoSuchVariant(usize),
    #[error("failed to save document: {0:#}")]
    Persistence(anyhow::Error),
}
