use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use quill_core::{DocumentId, DocumentRecord, ManuscriptIndex, ProjectId};

use crate::DocumentStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentId, DocumentRecord>>,
    indexes: RwLock<HashMap<ProjectId, ManuscriptIndex>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn save_document(&self, record: &DocumentRecord) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<()> {
        self.documents.write().await.remove(id);
        Ok(())
    }

    async fn list_documents(&self, project: &ProjectId) -> Result<Vec<DocumentRecord>> {
        let mut records: Vec<DocumentRecord> = self
            .documents
            .read()
            .await
            .values()
            .filter(|r| &r.project_id == project)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn load_index(&self, project: &ProjectId) -> Result<ManuscriptIndex> {
        Ok(self
            .indexes
            .read()
            .await
            .get(project)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_index(&self, project: &ProjectId, index: &ManuscriptIndex) -> Result<()> {
        self.indexes
            .write()
            .await
            .insert(project.clone(), index.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn documents_are_scoped_by_project() {
        let store = MemoryStore::new();
        let novel = ProjectId::new("novel");
        store
            .save_document(&DocumentRecord::new("ch-1".into(), novel.clone(), "One", "text"))
            .await
            .unwrap();
        store
            .save_document(&DocumentRecord::new("x".into(), "other".into(), "X", "text"))
            .await
            .unwrap();

        assert_eq!(store.list_documents(&novel).await.unwrap().len(), 1);
        store.delete_document(&"ch-1".into()).await.unwrap();
        assert!(store.list_documents(&novel).await.unwrap().is_empty());
    }
}
