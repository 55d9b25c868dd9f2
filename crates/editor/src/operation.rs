//! Category-scoped, cancellable AI requests.
//!
//! Each [`OperationLane`] admits one live request.  Starting another cancels
//! the previous one's token and bumps the lane generation; when any request
//! resumes, its result is only written if the token is still live, the
//! generation is still current, and the document it was issued for is still
//! the active one.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use quill_core::DocumentId;
use quill_llm::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Analysis,
    Rewrite,
    Help,
}

impl OperationCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Rewrite => "rewrite",
            Self::Help => "help",
        }
    }
}

/// How a driven request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Result written to the lane.
    Applied,
    /// Error written to the lane.
    Failed,
    /// Cancelled explicitly; nothing written.
    Cancelled,
    /// A newer request took the lane; nothing written.
    Superseded,
    /// The active document changed while in flight; nothing written.
    ContextChanged,
}

/// Handle for one started request.
#[derive(Debug, Clone)]
pub struct Ticket {
    generation: u64,
    token: CancellationToken,
    context: DocumentId,
}

impl Ticket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn context(&self) -> &DocumentId {
        &self.context
    }
}

/// Point-in-time view of a lane for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneState<T> {
    pub running: bool,
    pub result: Option<T>,
    pub error: Option<ServiceError>,
}

#[derive(Debug)]
struct Slots<T> {
    generation: u64,
    token: Option<CancellationToken>,
    running: bool,
    result: Option<T>,
    error: Option<ServiceError>,
}

#[derive(Debug)]
pub struct OperationLane<T> {
    category: OperationCategory,
    slots: Mutex<Slots<T>>,
}

impl<T> OperationLane<T> {
    pub fn new(category: OperationCategory) -> Self {
        Self {
            category,
            slots: Mutex::new(Slots {
                generation: 0,
                token: None,
                running: false,
                result: None,
                error: None,
            }),
        }
    }

    pub fn category(&self) -> OperationCategory {
        self.category
    }

    fn slots(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Supersede whatever is in flight and issue a ticket for `context`.
    pub fn start(&self, context: DocumentId) -> Ticket {
        let mut slots = self.slots();
        if let Some(previous) = slots.token.take() {
            if !previous.is_cancelled() {
                debug!(category = self.category.label(), "superseding in-flight request");
            }
            previous.cancel();
        }
        slots.generation += 1;
        let token = CancellationToken::new();
        slots.token = Some(token.clone());
        slots.running = true;
        slots.error = None;
        Ticket {
            generation: slots.generation,
            token,
            context,
        }
    }

    /// Await `request` raced against the ticket's token, then write its
    /// outcome if the ticket is still the lane's live one and `active`
    /// (evaluated after the await) still names the ticket's document.
    pub async fn drive<F>(
        &self,
        ticket: &Ticket,
        request: F,
        active: impl FnOnce() -> Option<DocumentId>,
    ) -> Resolution
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let outcome = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => Err(ServiceError::Cancelled),
            outcome = request => outcome,
        };

        let active = active();
        let mut slots = self.slots();
        if slots.generation != ticket.generation {
            debug!(category = self.category.label(), "discarding superseded result");
            return Resolution::Superseded;
        }
        if ticket.token.is_cancelled() || matches!(outcome, Err(ServiceError::Cancelled)) {
            debug!(category = self.category.label(), "discarding cancelled result");
            slots.running = false;
            return Resolution::Cancelled;
        }
        if active.as_ref() != Some(&ticket.context) {
            warn!(
                category = self.category.label(),
                document = %ticket.context,
                "active document changed mid-request; discarding result"
            );
            slots.running = false;
            slots.token = None;
            return Resolution::ContextChanged;
        }

        slots.running = false;
        slots.token = None;
        match outcome {
            Ok(result) => {
                slots.result = Some(result);
                Resolution::Applied
            }
            Err(err) => {
                debug!(category = self.category.label(), error = %err, "request failed");
                slots.error = Some(err);
                Resolution::Failed
            }
        }
    }

    pub fn cancel(&self) {
        let mut slots = self.slots();
        if let Some(token) = slots.token.take() {
            token.cancel();
        }
        slots.running = false;
    }

    /// Cancel and forget everything, e.g. when the document changes.
    pub fn reset(&self) {
        let mut slots = self.slots();
        if let Some(token) = slots.token.take() {
            token.cancel();
        }
        slots.running = false;
        slots.result = None;
        slots.error = None;
    }

    pub fn is_running(&self) -> bool {
        self.slots().running
    }

    pub fn clear_result(&self) {
        self.slots().result = None;
    }
}

impl<T: Clone> OperationLane<T> {
    pub fn result(&self) -> Option<T> {
        self.slots().result.clone()
    }

    pub fn error(&self) -> Option<ServiceError> {
        self.slots().error.clone()
    }

    pub fn snapshot(&self) -> LaneState<T> {
        let slots = self.slots();
        LaneState {
            running: slots.running,
            result: slots.result.clone(),
            error: slots.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    fn doc(id: &str) -> DocumentId {
        DocumentId::new(id)
    }

    #[tokio::test]
    async fn success_fills_the_result_slot() {
        let lane = OperationLane::<String>::new(OperationCategory::Help);
        let ticket = lane.start(doc("ch1"));
        assert!(lane.is_running());

        let resolution = lane
            .drive(&ticket, async { Ok("a small cat".to_string()) }, || Some(doc("ch1")))
            .await;
        assert_eq!(resolution, Resolution::Applied);
        assert_eq!(
            lane.snapshot(),
            LaneState {
                running: false,
                result: Some("a small cat".to_string()),
                error: None,
            }
        );
    }

    #[tokio::test]
    async fn failure_fills_the_error_slot_and_next_start_clears_it() {
        let lane = OperationLane::<String>::new(OperationCategory::Analysis);
        let ticket = lane.start(doc("ch1"));
        let resolution = lane
            .drive(
                &ticket,
                async { Err(ServiceError::RateLimited("slow down".into())) },
                || Some(doc("ch1")),
            )
            .await;
        assert_eq!(resolution, Resolution::Failed);
        assert_eq!(lane.error(), Some(ServiceError::RateLimited("slow down".into())));
        assert!(!lane.is_running());

        lane.start(doc("ch1"));
        assert_eq!(lane.error(), None);
    }

    #[tokio::test]
    async fn only_the_latest_request_is_observable() {
        let lane = Arc::new(OperationLane::<String>::new(OperationCategory::Rewrite));
        let (release_a, gate_a) = oneshot::channel::<()>();

        let first = lane.start(doc("ch1"));
        let lane_a = lane.clone();
        let a = tokio::spawn(async move {
            lane_a
                .drive(
                    &first,
                    async move {
                        // Ignores its token and answers late.
                        let _ = gate_a.await;
                        Ok("A".to_string())
                    },
                    || Some(doc("ch1")),
                )
                .await
        });
        tokio::task::yield_now().await;

        let second = lane.start(doc("ch1"));
        let b = lane
            .drive(&second, async { Ok("B".to_string()) }, || Some(doc("ch1")))
            .await;
        let _ = release_a.send(());

        assert_eq!(b, Resolution::Applied);
        assert_eq!(a.await.unwrap(), Resolution::Superseded);
        assert_eq!(lane.result(), Some("B".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_abandons_the_request() {
        let lane = Arc::new(OperationLane::<String>::new(OperationCategory::Help));
        let ticket = lane.start(doc("ch1"));
        let driver = lane.clone();
        let task = tokio::spawn(async move {
            driver
                .drive(
                    &ticket,
                    async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok("late".to_string())
                    },
                    || Some(doc("ch1")),
                )
                .await
        });
        tokio::task::yield_now().await;

        lane.cancel();
        assert!(!lane.is_running());
        assert_eq!(task.await.unwrap(), Resolution::Cancelled);
        assert_eq!(lane.result(), None);
    }

    #[tokio::test]
    async fn service_reported_cancellation_is_not_an_error() {
        let lane = OperationLane::<String>::new(OperationCategory::Help);
        let ticket = lane.start(doc("ch1"));
        let resolution = lane
            .drive(&ticket, async { Err(ServiceError::Cancelled) }, || Some(doc("ch1")))
            .await;
        assert_eq!(resolution, Resolution::Cancelled);
        assert_eq!(lane.error(), None);
    }

    #[tokio::test]
    async fn result_for_a_switched_document_is_dropped() {
        let lane = OperationLane::<String>::new(OperationCategory::Analysis);
        let ticket = lane.start(doc("ch1"));
        let resolution = lane
            .drive(&ticket, async { Ok("report".to_string()) }, || Some(doc("ch2")))
            .await;
        assert_eq!(resolution, Resolution::ContextChanged);
        assert_eq!(lane.result(), None);
        assert!(!lane.is_running());
    }

    #[tokio::test]
    async fn reset_forgets_previous_results() {
        let lane = OperationLane::<String>::new(OperationCategory::Help);
        let ticket = lane.start(doc("ch1"));
        lane.drive(&ticket, async { Ok("x".to_string()) }, || Some(doc("ch1")))
            .await;
        lane.reset();
        assert_eq!(lane.snapshot().result, None);

        let live = lane.start(doc("ch1"));
        lane.reset();
        assert!(live.token().is_cancelled());
        assert!(!lane.is_running());
    }
}
