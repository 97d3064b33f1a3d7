//! Mailsweep core: pure selection state, sender grouping and run reporting.
mod group;
mod ledger;
mod progress;
mod report;
mod selection;
mod storage;
mod summary;

pub use group::{group_by_sender, SenderGroup, SenderGroups, SenderKey};
pub use ledger::{
    is_processed_sender, processed_senders, record_completed_run, record_processed_senders,
};
pub use progress::{ProgressBoard, SenderRow, SenderStatus};
pub use report::{
    ArchiveStatus, FailReason, LinkKind, ManualAction, ProcessingOutcome, RunError, RunReport,
};
pub use selection::{
    EmailId, SelectedEmail, SelectionError, SelectionSnapshot, SelectionStore,
    MAX_SELECTED_EMAILS,
};
pub use storage::{MemorySessionStorage, SessionStorage};
pub use summary::{summarize, OverallStatus, RunSummary, SenderLine, SUMMARY_SENDER_CAP};
