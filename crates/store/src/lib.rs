//! Persistence boundary for documents and per-project lore indexes.
//!
//! The editor core only talks to [`DocumentStore`].  [`FsStore`] keeps one
//! JSON file per record on disk; [`MemoryStore`] is the in-process variant
//! used by tests and ephemeral sessions.

use anyhow::Result;
use async_trait::async_trait;

use quill_core::{DocumentId, DocumentRecord, ManuscriptIndex, ProjectId};

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>>;

    /// Durably write `record`.  Returns only once the write is on disk (or
    /// wherever the backend keeps it); callers treat `Ok` as "saved".
    async fn save_document(&self, record: &DocumentRecord) -> Result<()>;

    async fn delete_document(&self, id: &DocumentId) -> Result<()>;

    /// Every document belonging to `project`, ordered by id.
    async fn list_documents(&self, project: &ProjectId) -> Result<Vec<DocumentRecord>>;

    /// The project's lore index, or an empty one if none was saved yet.
    async fn load_index(&self, project: &ProjectId) -> Result<ManuscriptIndex>;

    async fn save_index(&self, project: &ProjectId, index: &ManuscriptIndex) -> Result<()>;
}
