//! [`EditorSession`]: the explicitly owned context that ties the buffer,
//! the operation lanes, the review gate and the background indexer to a
//! store and an AI service.
//!
//! Two locks are involved.  `state` is a short-lived std mutex guarding the
//! in-memory editor state; it is never held across an await.  `write_lock`
//! serializes every buffer mutation together with the save that follows it,
//! so records reach the store in commit order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use quill_config::AppConfig;
use quill_core::{
    AnalysisResult, Author, DocumentId, DocumentRecord, ManuscriptIndex, ProjectId, Setting,
};
use quill_index::{IndexEvent, IndexerScheduler, ManuscriptIndexer, SchedulerOptions};
use quill_llm::{HelpKind, RewriteMode, ServiceError, TextService};
use quill_store::DocumentStore;

use crate::agent::{AgentAction, AgentPlan, plan};
use crate::error::EditError;
use crate::history::{HistoryEntry, HistoryLedger};
use crate::locator::find_range;
use crate::operation::{OperationCategory, OperationLane, Resolution};
use crate::review::{DiffReviewGate, PendingDiff};
use crate::selection::{ScreenAnchor, Selection, SelectionTracker};

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub min_text_chars: usize,
    pub debounce: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Commit log bound; 0 keeps everything.
    pub history_limit: usize,
    /// Story setting passed along with analysis and rewrite requests.
    pub setting: Setting,
    /// `None` runs without background indexing.
    pub indexer: Option<IndexerOptions>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_limit: 500,
            setting: Setting::default(),
            indexer: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            history_limit: config.editor.history_limit,
            setting: Setting::default(),
            indexer: config.indexer.enabled.then(|| IndexerOptions {
                min_text_chars: config.indexer.min_text_chars,
                debounce: Duration::from_millis(config.indexer.debounce_ms),
            }),
        }
    }
}

/// Variants returned for one rewrite request, together with the selection
/// they are meant to replace.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteProposal {
    pub document: DocumentId,
    pub selection: Selection,
    pub mode: RewriteMode,
    pub variants: Vec<String>,
}

struct SessionState {
    record: Option<DocumentRecord>,
    ledger: HistoryLedger,
    selection: SelectionTracker,
    review: DiffReviewGate,
    saved_revision: u64,
}

impl SessionState {
    fn active_id(&self) -> Result<DocumentId, EditError> {
        self.record
            .as_ref()
            .map(|record| record.id.clone())
            .ok_or(EditError::NoActiveDocument)
    }

    /// The record as it should be persisted now, plus the buffer revision it
    /// reflects.
    fn snapshot(&mut self) -> Result<(DocumentRecord, u64), EditError> {
        let record = self.record.as_mut().ok_or(EditError::NoActiveDocument)?;
        if record.content != self.ledger.text() {
            record.content = self.ledger.text().to_string();
            record.updated_at = Utc::now();
        }
        Ok((record.clone(), self.ledger.revision()))
    }

    /// Captured selection, verified against the live buffer.  A stale one is
    /// cleared.
    fn live_selection(&mut self) -> Result<Selection, EditError> {
        let selection = self.selection.current().cloned().ok_or(EditError::NoSelection)?;
        if selection.is_stale(self.ledger.text()) {
            self.selection.clear();
            return Err(EditError::StaleSelection);
        }
        Ok(selection)
    }
}

pub struct EditorSession {
    project: ProjectId,
    setting: Setting,
    history_limit: usize,
    service: Arc<dyn TextService>,
    store: Arc<dyn DocumentStore>,
    state: Mutex<SessionState>,
    write_lock: tokio::sync::Mutex<()>,
    active: watch::Sender<Option<DocumentId>>,
    analysis: OperationLane<AnalysisResult>,
    rewrite: OperationLane<RewriteProposal>,
    help: OperationLane<String>,
    indexer: Option<IndexerScheduler>,
}

impl EditorSession {
    /// Build a session for `project`.  With indexing enabled this spawns the
    /// indexer worker, so it must run inside a tokio runtime.
    pub fn new(
        project: ProjectId,
        service: Arc<dyn TextService>,
        store: Arc<dyn DocumentStore>,
        options: SessionOptions,
    ) -> Self {
        let indexer = options.indexer.map(|indexer| {
            IndexerScheduler::spawn(
                ManuscriptIndexer::new(service.clone(), indexer.min_text_chars),
                store.clone(),
                project.clone(),
                SchedulerOptions {
                    debounce: indexer.debounce,
                },
            )
        });
        let (active, _) = watch::channel(None);

        Self {
            project,
            setting: options.setting,
            history_limit: options.history_limit,
            service,
            store,
            state: Mutex::new(SessionState {
                record: None,
                ledger: HistoryLedger::new(options.history_limit),
                selection: SelectionTracker::default(),
                review: DiffReviewGate::default(),
                saved_revision: 0,
            }),
            write_lock: tokio::sync::Mutex::new(()),
            active,
            analysis: OperationLane::new(OperationCategory::Analysis),
            rewrite: OperationLane::new(OperationCategory::Rewrite),
            help: OperationLane::new(OperationCategory::Help),
            indexer,
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn active_document(&self) -> Option<DocumentId> {
        self.active.borrow().clone()
    }

    /// Follow document switches.
    pub fn watch_active_document(&self) -> watch::Receiver<Option<DocumentId>> {
        self.active.subscribe()
    }

    // ── Document lifecycle ───────────────────────────────────────────────────

    /// Make `id` the active document.  Re-opening the active document keeps
    /// its buffer and history.
    pub async fn open_document(&self, id: &DocumentId) -> Result<(), EditError> {
        let _write = self.write_lock.lock().await;
        if self.state().ledger.document() == Some(id) {
            return Ok(());
        }

        let record = self
            .store
            .load_document(id)
            .await
            .map_err(EditError::Persistence)?
            .ok_or_else(|| EditError::UnknownDocument(id.clone()))?;

        {
            let mut state = self.state();
            self.leave_current(&mut state, true);
            state.ledger.init(record.content.clone(), id);
            state.saved_revision = state.ledger.revision();
            state.record = Some(record);
        }
        self.active.send_replace(Some(id.clone()));
        info!(project = %self.project, document = %id, "document opened");
        Ok(())
    }

    pub async fn close_document(&self) {
        let _write = self.write_lock.lock().await;
        self.detach(true);
    }

    /// Remove `id` from the store.  Deleting the active document closes it
    /// first, dropping its buffer and history without indexing them.
    pub async fn delete_document(&self, id: &DocumentId) -> Result<(), EditError> {
        let _write = self.write_lock.lock().await;
        self.store
            .delete_document(id)
            .await
            .map_err(EditError::Persistence)?;
        if self.active_document().as_ref() == Some(id) {
            self.detach(false);
        }
        info!(project = %self.project, document = %id, "document deleted");
        Ok(())
    }

    /// Drop the active document's buffer and history.  Callers hold
    /// `write_lock`.
    fn detach(&self, flush_index: bool) {
        {
            let mut state = self.state();
            if let Some(document) = state.ledger.document() {
                info!(document = %document, "document closed");
            }
            self.leave_current(&mut state, flush_index);
            state.ledger = HistoryLedger::new(self.history_limit);
            state.record = None;
            state.saved_revision = 0;
        }
        self.active.send_replace(None);
    }

    /// Tear down per-document state before switching away.
    fn leave_current(&self, state: &mut SessionState, flush_index: bool) {
        if let (true, Some(indexer), Some(document)) =
            (flush_index, &self.indexer, state.ledger.document())
        {
            indexer.chapter_switched(document.clone(), state.ledger.text());
        }
        self.analysis.reset();
        self.rewrite.reset();
        self.help.reset();
        state.selection.clear();
        if let Some(diff) = state.review.reject() {
            warn!(description = %diff.description, "discarding unreviewed proposal for the closed document");
        }
        if flush_index && state.ledger.revision() != state.saved_revision && state.record.is_some()
        {
            warn!("leaving document with unsaved changes");
        }
    }

    // ── Buffer ───────────────────────────────────────────────────────────────

    pub fn text(&self) -> Option<String> {
        let state = self.state();
        state.record.as_ref().map(|_| state.ledger.text().to_string())
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state().ledger.entries().cloned().collect()
    }

    /// True while the buffer holds changes that have not reached the store.
    pub fn has_unsaved_changes(&self) -> bool {
        let state = self.state();
        state.record.is_some() && state.ledger.revision() != state.saved_revision
    }

    /// Live, unlogged edit (keystrokes).  Saved immediately.
    pub async fn update_text(&self, text: impl Into<String>) -> Result<(), EditError> {
        let _write = self.write_lock.lock().await;
        let text = text.into();
        let document = {
            let mut state = self.state();
            let document = state.active_id()?;
            state.ledger.update_text(text.clone());
            document
        };
        self.note_change(document, text);
        self.persist().await
    }

    /// Logged edit.  Succeeds once the new text is saved.
    pub async fn commit(
        &self,
        new_text: impl Into<String>,
        description: impl Into<String>,
        author: Author,
    ) -> Result<HistoryEntry, EditError> {
        let _write = self.write_lock.lock().await;
        let (document, entry) = {
            let mut state = self.state();
            let document = state.active_id()?;
            let entry = state.ledger.commit(new_text, description, author).clone();
            (document, entry)
        };
        self.note_change(document, entry.new_content.clone());
        self.persist().await?;
        Ok(entry)
    }

    pub async fn undo(&self) -> Result<bool, EditError> {
        let _write = self.write_lock.lock().await;
        let (document, text) = {
            let mut state = self.state();
            let document = state.active_id()?;
            if !state.ledger.undo() {
                return Ok(false);
            }
            (document, state.ledger.text().to_string())
        };
        self.note_change(document, text);
        self.persist().await?;
        Ok(true)
    }

    pub async fn restore(&self, entry: Uuid) -> Result<HistoryEntry, EditError> {
        let _write = self.write_lock.lock().await;
        let (document, entry) = {
            let mut state = self.state();
            let document = state.active_id()?;
            let entry = state.ledger.restore(entry)?.clone();
            (document, entry)
        };
        self.note_change(document, entry.new_content.clone());
        self.persist().await?;
        Ok(entry)
    }

    fn note_change(&self, document: DocumentId, text: String) {
        if let Some(indexer) = &self.indexer {
            indexer.text_changed(document, text);
        }
    }

    /// Save the active record with the current buffer.  Callers hold
    /// `write_lock`.
    async fn persist(&self) -> Result<(), EditError> {
        let (record, revision) = self.state().snapshot()?;
        if let Err(err) = self.store.save_document(&record).await {
            warn!(document = %record.id, error = %err, "failed to save document");
            return Err(EditError::Persistence(err));
        }
        let mut state = self.state();
        if state.ledger.document() == Some(&record.id) {
            state.saved_revision = state.saved_revision.max(revision);
        }
        Ok(())
    }

    // ── Selection ────────────────────────────────────────────────────────────

    pub fn set_selection(
        &self,
        start: usize,
        end: usize,
        anchor: Option<ScreenAnchor>,
    ) -> Option<Selection> {
        let mut state = self.state();
        let SessionState {
            ledger, selection, ..
        } = &mut *state;
        selection.capture(ledger.text(), start, end, anchor).cloned()
    }

    pub fn clear_selection(&self) {
        self.state().selection.clear();
    }

    pub fn selection(&self) -> Option<Selection> {
        self.state().selection.current().cloned()
    }

    // ── AI operations ────────────────────────────────────────────────────────

    pub fn analysis(&self) -> &OperationLane<AnalysisResult> {
        &self.analysis
    }

    pub fn rewrites(&self) -> &OperationLane<RewriteProposal> {
        &self.rewrite
    }

    pub fn help(&self) -> &OperationLane<String> {
        &self.help
    }

    pub fn cancel(&self, category: OperationCategory) {
        match category {
            OperationCategory::Analysis => self.analysis.cancel(),
            OperationCategory::Rewrite => self.rewrite.cancel(),
            OperationCategory::Help => self.help.cancel(),
        }
    }

    fn setting(&self) -> Option<&Setting> {
        (!self.setting.is_empty()).then_some(&self.setting)
    }

    /// Analyse the whole document.  The result lands in the analysis lane and
    /// is saved with the document record.
    pub async fn request_analysis(&self) -> Result<Resolution, EditError> {
        let (document, text) = {
            let state = self.state();
            (state.active_id()?, state.ledger.text().to_string())
        };
        let lore = self
            .lore_index()
            .filter(|index| !index.is_empty())
            .map(|index| index.summary());

        let ticket = self.analysis.start(document.clone());
        info!(document = %document, bytes = text.len(), "analysis requested");
        let resolution = self
            .analysis
            .drive(
                &ticket,
                self.service
                    .analyze(&text, self.setting(), lore.as_deref(), ticket.token()),
                || self.active_document(),
            )
            .await;

        if resolution == Resolution::Applied {
            if let Some(result) = self.analysis.result() {
                let _write = self.write_lock.lock().await;
                let attached = {
                    let mut state = self.state();
                    match state.record.as_mut() {
                        Some(record) if record.id == document => {
                            record.analysis = Some(result);
                            true
                        }
                        _ => false,
                    }
                };
                if attached {
                    self.persist().await?;
                }
            }
        }
        Ok(resolution)
    }

    /// Ask for rewrites of the current selection.
    pub async fn request_rewrite(
        &self,
        mode: RewriteMode,
        tone: Option<&str>,
    ) -> Result<Resolution, EditError> {
        let (document, selection) = {
            let mut state = self.state();
            (state.active_id()?, state.live_selection()?)
        };

        let ticket = self.rewrite.start(document.clone());
        debug!(document = %document, mode = mode.label(), bytes = selection.text.len(), "rewrite requested");
        let request = async {
            let variants = self
                .service
                .rewrite(&selection.text, mode, tone, self.setting(), ticket.token())
                .await?;
            Ok::<_, ServiceError>(RewriteProposal {
                document: document.clone(),
                selection: selection.clone(),
                mode,
                variants,
            })
        };
        Ok(self
            .rewrite
            .drive(&ticket, request, || self.active_document())
            .await)
    }

    /// Replace the rewritten selection with variant `index` of the current
    /// proposal, provided the selected text is still in place.
    pub async fn apply_rewrite(&self, index: usize) -> Result<HistoryEntry, EditError> {
        let _write = self.write_lock.lock().await;
        let proposal = self.rewrite.result().ok_or(EditError::NoProposal)?;
        let replacement = proposal
            .variants
            .get(index)
            .ok_or(EditError::NoSuchVariant(index))?;

        let applied = {
            let mut state = self.state();
            let document = state.active_id()?;
            if document != proposal.document || proposal.selection.is_stale(state.ledger.text()) {
                state.selection.clear();
                Err(EditError::StaleSelection)
            } else {
                let new_text = proposal.selection.splice(state.ledger.text(), replacement);
                let description = format!("Rewrite ({})", proposal.mode.label());
                let entry = state.ledger.commit(new_text, description, Author::User).clone();
                state.selection.clear();
                Ok((document, entry))
            }
        };
        self.rewrite.clear_result();

        let (document, entry) = applied?;
        self.note_change(document, entry.new_content.clone());
        self.persist().await?;
        Ok(entry)
    }

    /// Explain or define the current selection.
    pub async fn request_help(&self, kind: HelpKind) -> Result<Resolution, EditError> {
        let (document, selection) = {
            let mut state = self.state();
            (state.active_id()?, state.live_selection()?)
        };

        let ticket = self.help.start(document);
        Ok(self
            .help
            .drive(
                &ticket,
                self.service
                    .explain_or_define(&selection.text, kind, ticket.token()),
                || self.active_document(),
            )
            .await)
    }

    /// Apply an analysis suggestion: find `quote` in the buffer (tolerating
    /// whitespace and tail differences) and replace it.
    pub async fn apply_analysis_fix(
        &self,
        quote: &str,
        replacement: &str,
    ) -> Result<HistoryEntry, EditError> {
        let _write = self.write_lock.lock().await;
        let (document, entry) = {
            let mut state = self.state();
            let document = state.active_id()?;
            let text = state.ledger.text();
            let range = find_range(text, quote).ok_or(EditError::NotFound)?;
            let new_text = format!("{}{}{}", &text[..range.start], replacement, &text[range.end..]);
            let entry = state
                .ledger
                .commit(new_text, "Applied analysis fix", Author::User)
                .clone();
            (document, entry)
        };
        self.note_change(document, entry.new_content.clone());
        self.persist().await?;
        Ok(entry)
    }

    // ── Agent surface ────────────────────────────────────────────────────────

    /// Entry point for assistant tool calls.  Edits are queued for review;
    /// the returned text is relayed to the assistant.
    pub fn handle_agent_action(&self, name: &str, params: Value) -> Result<String, EditError> {
        let action = AgentAction::parse(name, params)?;
        let mut state = self.state();
        let document = state.active_id()?;

        match plan(&action, state.ledger.text()) {
            Ok(AgentPlan::Propose(diff)) => {
                let description = diff.description.clone();
                state.review.propose(diff);
                info!(document = %document, action = action.name(), "agent change awaiting review");
                Ok(format!(
                    "Proposed change \"{description}\" is waiting for the author to accept or reject it."
                ))
            }
            Ok(AgentPlan::Reply(message)) => Ok(message),
            Err(err) => {
                debug!(document = %document, action = action.name(), error = %err, "agent action refused");
                Err(err)
            }
        }
    }

    pub fn pending_diff(&self) -> Option<PendingDiff> {
        self.state().review.pending().cloned()
    }

    /// Commit the pending proposal.  Fails with [`EditError::StaleProposal`]
    /// (and drops the proposal) if the buffer changed since it was made.
    pub async fn accept_diff(&self) -> Result<HistoryEntry, EditError> {
        let _write = self.write_lock.lock().await;
        let (document, entry) = {
            let mut state = self.state();
            let document = state.active_id()?;
            let diff = state.review.accept().ok_or(EditError::NothingPending)?;
            if state.ledger.text() != diff.original {
                warn!(description = %diff.description, "buffer changed under a pending proposal");
                return Err(EditError::StaleProposal);
            }
            let entry = state
                .ledger
                .commit(diff.modified, diff.description, diff.author)
                .clone();
            (document, entry)
        };
        self.note_change(document, entry.new_content.clone());
        self.persist().await?;
        Ok(entry)
    }

    pub fn reject_diff(&self) -> Result<PendingDiff, EditError> {
        self.state().review.reject().ok_or(EditError::NothingPending)
    }

    // ── Lore index ───────────────────────────────────────────────────────────

    /// Latest merged lore index, when indexing is enabled.
    pub fn lore_index(&self) -> Option<Arc<ManuscriptIndex>> {
        self.indexer.as_ref().map(IndexerScheduler::index)
    }

    /// Index updates, including any contradictions found.
    pub fn index_events(&self) -> Option<broadcast::Receiver<IndexEvent>> {
        self.indexer.as_ref().map(IndexerScheduler::subscribe)
    }

    pub async fn shutdown(mut self) {
        self.analysis.reset();
        self.rewrite.reset();
        self.help.reset();
        if let Some(indexer) = self.indexer.take() {
            indexer.shutdown().await;
        }
    }
}
