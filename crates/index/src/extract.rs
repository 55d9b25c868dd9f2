use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use quill_core::{DocumentId, Extraction};
use quill_llm::{ServiceError, TextService};

/// Thin wrapper over [`TextService::extract_entities`] that refuses to spend
/// a model call on chapters too short to carry any signal.
#[derive(Clone)]
pub struct ManuscriptIndexer {
    service: Arc<dyn TextService>,
    min_text_chars: usize,
}

impl ManuscriptIndexer {
    pub fn new(service: Arc<dyn TextService>, min_text_chars: usize) -> Self {
        Self {
            service,
            min_text_chars,
        }
    }

    pub async fn extract(
        &self,
        text: &str,
        chapter_id: &DocumentId,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ServiceError> {
        let chars = text.trim().chars().count();
        if chars < self.min_text_chars {
            debug!(chapter = %chapter_id, chars, "chapter too short to index");
            return Ok(Extraction::default());
        }
        self.service.extract_entities(text, cancel).await
    }
}
