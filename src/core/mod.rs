pub mod comparator;
pub mod engine;
pub mod error;
pub mod reconciler;

pub use comparator::{CompareConfig, FileComparator, LocalState};
pub use engine::{format_duration, SyncEngine, SyncMode, SyncOptions, SyncReport};
pub use error::SyncError;
pub use reconciler::{reconcile, ReconcileOutcome};
