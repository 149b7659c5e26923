pub mod assignment;
pub mod classifier;
pub mod reconcile;
pub mod view;

pub use assignment::{AssignOutcome, AssignmentWorkflow, UnassignOutcome};
pub use classifier::{classify, unassigned, PresenceEntry, PresenceReport, PresenceStatus};
pub use reconcile::{
    run_session, LoopStatus, ReconEvent, ReconciliationLoop, ScanPhase, TickOutcome, TickSummary,
};
pub use view::{PresenceView, UnassignedView};
