use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use quill_core::{DocumentId, DocumentRecord, ManuscriptIndex, ProjectId};

use crate::DocumentStore;

/// File-backed store.
///
/// ```text
/// <root>/documents/<document-id>.json
/// <root>/projects/<project-id>/index.json
/// ```
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: &DocumentId) -> Result<PathBuf> {
        Ok(self
            .root
            .join("documents")
            .join(format!("{}.json", checked_segment(id.as_str())?)))
    }

    fn index_path(&self, project: &ProjectId) -> Result<PathBuf> {
        Ok(self
            .root
            .join("projects")
            .join(checked_segment(project.as_str())?)
            .join("index.json"))
    }
}

/// Ids become file names, so they must not contain separators or `..`.
fn checked_segment(id: &str) -> Result<&str> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        bail!("invalid id for file storage: {id:?}");
    }
    Ok(id)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let value = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}

/// Atomically replace `path` with the JSON rendering of `value`.
///
/// The content goes to a `.tmp` sibling first, is fsync'd, then renamed over
/// the original, so a crash leaves either the old or the new file intact.
/// The `.tmp` file is removed on any error path.
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "record.json".to_string());
        path.with_file_name(format!("{filename}.tmp"))
    };

    let write_result: Result<()> = async {
        let body = serde_json::to_vec_pretty(value)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
    .await;

    if let Err(err) = write_result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }

    Ok(())
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn load_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        read_json(&self.document_path(id)?).await
    }

    async fn save_document(&self, record: &DocumentRecord) -> Result<()> {
        let path = self.document_path(&record.id)?;
        write_json_atomic(&path, record)
            .await
            .with_context(|| format!("save document {}", record.id))?;
        debug!(document = %record.id, bytes = record.content.len(), "document saved");
        Ok(())
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<()> {
        let path = self.document_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn list_documents(&self, project: &ProjectId) -> Result<Vec<DocumentRecord>> {
        let dir = self.root.join("documents");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("list {}", dir.display())),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<DocumentRecord>(&path).await {
                Ok(Some(record)) if &record.project_id == project => records.push(record),
                Ok(_) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable document"),
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn load_index(&self, project: &ProjectId) -> Result<ManuscriptIndex> {
        Ok(read_json(&self.index_path(project)?).await?.unwrap_or_default())
    }

    async fn save_index(&self, project: &ProjectId, index: &ManuscriptIndex) -> Result<()> {
        let path = self.index_path(project)?;
        write_json_atomic(&path, index)
            .await
            .with_context(|| format!("save index for project {project}"))
    }
}
