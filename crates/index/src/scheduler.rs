//! Debounced, supersede-on-trigger driver for the background indexer.
//!
//! One worker task per project owns the in-memory [`ManuscriptIndex`], so
//! every merge and index write for that project is serialized.  Triggers
//! arrive over a channel; the worker never blocks the caller and never
//! reports extraction failures back to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quill_core::{Contradiction, DocumentId, Extraction, ManuscriptIndex, ProjectId};
use quill_llm::ServiceError;
use quill_store::DocumentStore;

use crate::extract::ManuscriptIndexer;
use crate::merge::{content_hash, merge_into};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Idle time after the last text change before indexing starts.
    pub debounce: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
        }
    }
}

/// Published after every successful merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEvent {
    pub chapter_id: DocumentId,
    pub characters: usize,
    pub contradictions: Vec<Contradiction>,
}

#[derive(Debug)]
enum Trigger {
    Changed { chapter_id: DocumentId, text: String },
    Immediate { chapter_id: DocumentId, text: String },
}

pub struct IndexerScheduler {
    tx: mpsc::UnboundedSender<Trigger>,
    events: broadcast::Sender<IndexEvent>,
    snapshot: watch::Receiver<Arc<ManuscriptIndex>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl IndexerScheduler {
    /// Start the worker for `project`.  The persisted index is loaded in the
    /// background; until then [`IndexerScheduler::index`] is empty.
    pub fn spawn(
        indexer: ManuscriptIndexer,
        store: Arc<dyn DocumentStore>,
        project: ProjectId,
        options: SchedulerOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot_tx, snapshot) = watch::channel(Arc::new(ManuscriptIndex::default()));
        let shutdown = CancellationToken::new();

        let worker = Worker {
            indexer,
            store,
            project,
            debounce: options.debounce,
            events: events.clone(),
            snapshot: snapshot_tx,
            index: ManuscriptIndex::default(),
            indexed: HashMap::new(),
            pending: None,
            deadline: None,
            in_flight: None,
        };
        let task = tokio::spawn(worker.run(rx, shutdown.clone()));

        Self {
            tx,
            events,
            snapshot,
            shutdown,
            task: Some(task),
        }
    }

    /// Record a text change; indexing starts once the chapter has been idle
    /// for the debounce interval.
    pub fn text_changed(&self, chapter_id: DocumentId, text: impl Into<String>) {
        self.send(Trigger::Changed {
            chapter_id,
            text: text.into(),
        });
    }

    /// Index `text` right away, e.g. for the chapter being navigated away from.
    pub fn chapter_switched(&self, chapter_id: DocumentId, text: impl Into<String>) {
        self.send(Trigger::Immediate {
            chapter_id,
            text: text.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Latest merged index.
    pub fn index(&self) -> Arc<ManuscriptIndex> {
        self.snapshot.borrow().clone()
    }

    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "indexer worker ended abnormally");
            }
        }
    }

    fn send(&self, trigger: Trigger) {
        if self.tx.send(trigger).is_err() {
            debug!("indexer worker stopped; trigger dropped");
        }
    }
}

impl Drop for IndexerScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Worker ───────────────────────────────────────────────────────────────────

struct Job {
    chapter_id: DocumentId,
    text: String,
    hash: String,
}

impl Job {
    fn new(chapter_id: DocumentId, text: String) -> Self {
        let hash = content_hash(&text);
        Self {
            chapter_id,
            text,
            hash,
        }
    }
}

type JobOutput = (Job, Result<Extraction, ServiceError>);

struct InFlight {
    chapter_id: DocumentId,
    hash: String,
    cancel: CancellationToken,
    handle: JoinHandle<JobOutput>,
}

struct Worker {
    indexer: ManuscriptIndexer,
    store: Arc<dyn DocumentStore>,
    project: ProjectId,
    debounce: Duration,
    events: broadcast::Sender<IndexEvent>,
    snapshot: watch::Sender<Arc<ManuscriptIndex>>,
    index: ManuscriptIndex,
    /// Hash of the last successfully merged text per chapter.
    indexed: HashMap<DocumentId, String>,
    pending: Option<Job>,
    deadline: Option<Instant>,
    in_flight: Option<InFlight>,
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_in_flight(in_flight: &mut Option<InFlight>) -> Result<JobOutput, JoinError> {
    match in_flight {
        Some(job) => (&mut job.handle).await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Trigger>, shutdown: CancellationToken) {
        match self.store.load_index(&self.project).await {
            Ok(index) => {
                info!(project = %self.project, characters = index.len(), "lore index loaded");
                self.index = index;
                self.publish_snapshot();
            }
            Err(err) => warn!(project = %self.project, error = %err, "failed to load lore index; starting empty"),
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                trigger = rx.recv() => match trigger {
                    Some(trigger) => self.on_trigger(trigger),
                    None => break,
                },
                _ = wait_deadline(self.deadline) => {
                    self.deadline = None;
                    if let Some(job) = self.pending.take() {
                        self.start(job);
                    }
                }
                done = wait_in_flight(&mut self.in_flight) => self.finish(done).await,
            }
        }

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
        debug!(project = %self.project, "indexer worker stopped");
    }

    fn on_trigger(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Changed { chapter_id, text } => {
                self.pending = Some(Job::new(chapter_id, text));
                self.deadline = Some(Instant::now() + self.debounce);
            }
            Trigger::Immediate { chapter_id, text } => {
                if self
                    .pending
                    .as_ref()
                    .is_some_and(|pending| pending.chapter_id == chapter_id)
                {
                    self.pending = None;
                    self.deadline = None;
                }
                self.start(Job::new(chapter_id, text));
            }
        }
    }

    fn start(&mut self, job: Job) {
        if self.indexed.get(&job.chapter_id) == Some(&job.hash) {
            debug!(chapter = %job.chapter_id, "chapter unchanged since last index; skipping");
            return;
        }

        if let Some(in_flight) = self.in_flight.take() {
            if in_flight.chapter_id == job.chapter_id && in_flight.hash == job.hash {
                self.in_flight = Some(in_flight);
                return;
            }
            debug!(chapter = %in_flight.chapter_id, "superseding in-flight extraction");
            in_flight.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let indexer = self.indexer.clone();
        let token = cancel.clone();
        let chapter_id = job.chapter_id.clone();
        let hash = job.hash.clone();
        let handle = tokio::spawn(async move {
            let result = indexer.extract(&job.text, &job.chapter_id, &token).await;
            (job, result)
        });
        self.in_flight = Some(InFlight {
            chapter_id,
            hash,
            cancel,
            handle,
        });
    }

    async fn finish(&mut self, done: Result<JobOutput, JoinError>) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        let (job, result) = match done {
            Ok(output) => output,
            Err(err) => {
                warn!(chapter = %in_flight.chapter_id, error = %err, "index extraction task failed");
                return;
            }
        };

        if in_flight.cancel.is_cancelled() {
            debug!(chapter = %job.chapter_id, "discarding cancelled extraction");
            return;
        }

        let extraction = match result {
            Ok(extraction) => extraction,
            Err(err) if err.is_cancelled() => {
                debug!(chapter = %job.chapter_id, "extraction cancelled");
                return;
            }
            Err(err) => {
                warn!(chapter = %job.chapter_id, error = %err, "index extraction failed");
                return;
            }
        };

        let contradictions = merge_into(&mut self.index, &extraction, &job.chapter_id);
        self.indexed.insert(job.chapter_id.clone(), job.hash);
        self.publish_snapshot();

        if let Err(err) = self.store.save_index(&self.project, &self.index).await {
            warn!(project = %self.project, error = %err, "failed to persist lore index");
        }

        for contradiction in &contradictions {
            info!(chapter = %job.chapter_id, "continuity conflict: {contradiction}");
        }
        let _ = self.events.send(IndexEvent {
            chapter_id: job.chapter_id,
            characters: extraction.characters.len(),
            contradictions,
        });
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(Arc::new(self.index.clone()));
    }
}
