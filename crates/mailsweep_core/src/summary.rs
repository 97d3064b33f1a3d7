use crate::report::{LinkKind, RunReport};

/// Most senders shown in the rendered summary. Manual-action senders are
/// never truncated, only automatic ones.
pub const SUMMARY_SENDER_CAP: usize = 10;

/// Three-way run classification. A run with pending manual links and zero
/// hard failures is a warning, never an unqualified success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Success,
    Warning,
    Error,
}

/// One sender line in the rendered summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderLine {
    pub sender: String,
    /// Present when the user still has to act for this sender.
    pub manual_link: Option<(String, LinkKind)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub overall: OverallStatus,
    /// Composed sentence; only nonzero counts contribute a clause.
    pub message: String,
    /// Manual-action senders first, then automatic ones up to the cap.
    pub senders: Vec<SenderLine>,
    /// `"And N more senders..."` when automatic senders were truncated.
    pub truncated_note: Option<String>,
}

pub fn summarize(report: &RunReport) -> RunSummary {
    let overall = if !report.errors.is_empty() {
        OverallStatus::Error
    } else if !report.manual_actions.is_empty() {
        OverallStatus::Warning
    } else {
        OverallStatus::Success
    };

    RunSummary {
        overall,
        message: compose_message(report),
        senders: sender_lines(report),
        truncated_note: truncated_note(report),
    }
}

fn compose_message(report: &RunReport) -> String {
    let mut clauses = Vec::new();
    let succeeded = report.succeeded_count();
    if succeeded > 0 {
        clauses.push(format!(
            "Automatically processed {succeeded} email{}.",
            plural(succeeded)
        ));
    }
    let manual = report.manual_count();
    if manual == 1 {
        clauses.push("1 email requires manual action.".to_string());
    } else if manual > 1 {
        clauses.push(format!("{manual} emails require manual action."));
    }
    let failed = report.failed_count();
    if failed > 0 {
        clauses.push(format!("{failed} email{} failed.", plural(failed)));
    }
    let archived = report.archived_count();
    if archived > 0 {
        clauses.push(format!("Archived {archived} email{}.", plural(archived)));
    }
    clauses.join(" ")
}

/// First manual link recorded for a sender, if any.
fn manual_link_for(report: &RunReport, sender: &str) -> Option<(String, LinkKind)> {
    report
        .manual_actions
        .iter()
        .find(|action| action.sender == sender)
        .map(|action| (action.link.clone(), action.kind))
}

fn sender_lines(report: &RunReport) -> Vec<SenderLine> {
    let mut manual = Vec::new();
    let mut automatic = Vec::new();
    for sender in &report.senders {
        match manual_link_for(report, sender) {
            Some(link) => manual.push(SenderLine {
                sender: sender.clone(),
                manual_link: Some(link),
            }),
            None => automatic.push(SenderLine {
                sender: sender.clone(),
                manual_link: None,
            }),
        }
    }
    let auto_slots = SUMMARY_SENDER_CAP.saturating_sub(manual.len());
    manual.extend(automatic.into_iter().take(auto_slots));
    manual
}

fn truncated_note(report: &RunReport) -> Option<String> {
    let shown = sender_lines(report).len();
    let remaining = report.senders.len().saturating_sub(shown);
    if remaining == 0 {
        return None;
    }
    Some(format!("And {remaining} more sender{}...", plural(remaining)))
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
