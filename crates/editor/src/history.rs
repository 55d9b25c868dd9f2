//! The authoritative buffer of the open document and its commit log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use quill_core::{Author, DocumentId};

use crate::error::EditError;

/// One committed change.  Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub author: Author,
    pub previous_content: String,
    pub new_content: String,
}

/// Single writer for a document's text.
///
/// Live keystrokes go through [`update_text`](Self::update_text) and leave no
/// trace in the log; everything else is a [`commit`](Self::commit).  Restoring
/// an old entry appends a new one, so a restore can itself be undone.
///
/// With a non-zero `limit` the oldest entries are evicted once the log grows
/// past it; undo then stops at the oldest surviving entry.
#[derive(Debug, Default)]
pub struct HistoryLedger {
    document: Option<DocumentId>,
    buffer: String,
    entries: VecDeque<HistoryEntry>,
    limit: usize,
    revision: u64,
}

impl HistoryLedger {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Load `text` for `document`.  Only resets the buffer and log when the
    /// document differs from the one already loaded; returns whether it did.
    pub fn init(&mut self, text: impl Into<String>, document: &DocumentId) -> bool {
        if self.document.as_ref() == Some(document) {
            return false;
        }
        self.document = Some(document.clone());
        self.reset(text);
        true
    }

    pub fn document(&self) -> Option<&DocumentId> {
        self.document.as_ref()
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Bumped on every change to the buffer.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn update_text(&mut self, text: impl Into<String>) {
        self.buffer = text.into();
        self.revision += 1;
    }

    pub fn commit(
        &mut self,
        new_text: impl Into<String>,
        description: impl Into<String>,
        author: Author,
    ) -> &HistoryEntry {
        let new_content = new_text.into();
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            description: description.into(),
            author,
            previous_content: std::mem::replace(&mut self.buffer, new_content.clone()),
            new_content,
        };
        debug!(entry = %entry.id, author = author.label(), description = %entry.description, "commit");
        self.entries.push_back(entry);
        self.revision += 1;

        if self.limit > 0 {
            while self.entries.len() > self.limit {
                self.entries.pop_front();
            }
        }
        &self.entries[self.entries.len() - 1]
    }

    /// Drop the newest entry and put its `previous_content` back.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.entries.pop_back() else {
            return false;
        };
        debug!(entry = %entry.id, description = %entry.description, "undo");
        self.buffer = entry.previous_content;
        self.revision += 1;
        true
    }

    pub fn restore(&mut self, id: Uuid) -> Result<&HistoryEntry, EditError> {
        let (content, description) = self
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| (entry.new_content.clone(), entry.description.clone()))
            .ok_or(EditError::UnknownEntry(id))?;
        Ok(self.commit(content, format!("Restored: {description}"), Author::User))
    }

    /// Replace the buffer and clear the log.
    pub fn reset(&mut self, text: impl Into<String>) {
        self.buffer = text.into();
        self.entries.clear();
        self.revision += 1;
    }
}
