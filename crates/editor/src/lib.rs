//! Editing orchestration: the authoritative buffer and its history, selection
//! tracking, cancellable AI operations, the agent edit router and review gate,
//! all owned by an [`EditorSession`].

pub mod agent;
mod error;
pub mod history;
pub mod locator;
pub mod operation;
pub mod review;
pub mod selection;
mod session;

pub use agent::{AgentAction, AgentPlan, agent_tool_schemas, plan};
pub use error::EditError;
pub use history::{HistoryEntry, HistoryLedger};
pub use locator::find_range;
pub use operation::{LaneState, OperationCategory, OperationLane, Resolution, Ticket};
pub use review::{DiffReviewGate, PendingDiff};
pub use selection::{ScreenAnchor, Selection, SelectionTracker};
pub use session::{EditorSession, IndexerOptions, RewriteProposal, SessionOptions};
