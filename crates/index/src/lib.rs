//! Background cross-chapter consistency indexing: entity extraction, the
//! provenance-preserving merge, and the debounced scheduler that drives them.

mod extract;
mod merge;
mod scheduler;

pub use extract::ManuscriptIndexer;
pub use merge::{MergeOutcome, content_hash, merge, merge_into};
pub use scheduler::{IndexEvent, IndexerScheduler, SchedulerOptions};
