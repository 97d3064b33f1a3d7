use std::fmt;

use serde::{Deserialize, Serialize};

use crate::selection::EmailId;

/// Which unsubscribe mechanism a link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// One-click `List-Unsubscribe` endpoint; the only tier that can be
    /// completed without user interaction.
    Header,
    /// Unsubscribe URL found in the message body.
    Body,
    /// `mailto:` mechanism; always needs an explicit user send.
    Mailto,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Header => f.write_str("header"),
            LinkKind::Body => f.write_str("body"),
            LinkKind::Mailto => f.write_str("mailto"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    NoUnsubscribeLink,
    Backend(String),
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::NoUnsubscribeLink => f.write_str("no unsubscribe link"),
            FailReason::Backend(message) => write!(f, "backend error: {message}"),
        }
    }
}

/// Terminal state of one email within one run; produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Succeeded,
    ManualAction { link: String, kind: LinkKind },
    Failed(FailReason),
}

/// A link the user still has to follow personally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualAction {
    pub email_id: EmailId,
    pub sender: String,
    pub link: String,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// Absent for batch-level failures not attributable to one email.
    pub email_id: Option<EmailId>,
    pub message: String,
}

impl RunError {
    pub fn batch(message: impl Into<String>) -> Self {
        Self {
            email_id: None,
            message: message.into(),
        }
    }

    pub fn for_email(email_id: impl Into<EmailId>, message: impl Into<String>) -> Self {
        Self {
            email_id: Some(email_id.into()),
            message: message.into(),
        }
    }
}

/// Outcome of the best-effort batched archive call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveStatus {
    pub success: bool,
    /// The mailbox lacks archive scope (HTTP 403).
    pub permission_error: bool,
    pub message: Option<String>,
    pub help_text: Option<String>,
}

/// Aggregate over one unsubscribe invocation. Created at run start,
/// finalized at run end, then handed to the summarizer; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub total_selected: usize,
    /// Ids whose unsubscribe completed automatically, in selection order.
    pub succeeded: Vec<EmailId>,
    pub manual_actions: Vec<ManualAction>,
    /// Ids whose unsubscribe failed outright.
    pub failed: Vec<EmailId>,
    pub errors: Vec<RunError>,
    /// Senders covered by this run, first-seen order; backend-reported
    /// senders are appended after the client-side ones.
    pub senders: Vec<String>,
    pub archive_status: Option<ArchiveStatus>,
}

impl RunReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn manual_count(&self) -> usize {
        self.manual_actions.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn archived_count(&self) -> usize {
        match &self.archive_status {
            Some(status) if status.success => self.total_selected,
            _ => 0,
        }
    }
}
