use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::stream::{FuturesUnordered, StreamExt};
use mailsweep_core::{
    group_by_sender, ArchiveStatus, EmailId, FailReason, LinkKind, ManualAction,
    ProcessingOutcome, RunError, RunReport, SelectionError, SelectionSnapshot, SenderGroup,
    SenderStatus, MAX_SELECTED_EMAILS,
};

use crate::backend::{BackendApi, BackendError, UnsubscribeRequest};
use crate::fetch::LinkFetcher;
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Issue one best-effort batched archive call over all selected ids,
    /// independent of per-email unsubscribe outcomes.
    pub archive: bool,
}

/// Drives one unsubscribe run: client-side link tiers fanned out per sender,
/// backend delegation for everything the client cannot resolve, then an
/// optional batched archive.
pub struct Orchestrator {
    fetcher: Arc<dyn LinkFetcher>,
    backend: Arc<dyn BackendApi>,
}

/// Everything a sender's fan-out future needs, precomputed so the future
/// owns its inputs.
struct SenderJob {
    sender: String,
    email_ids: Vec<EmailId>,
    header_link: Option<String>,
    body_link: Option<String>,
    mailto_link: Option<String>,
}

impl SenderJob {
    fn from_group(group: &SenderGroup, snapshot: &SelectionSnapshot) -> Self {
        let mut job = Self {
            sender: group.sender.clone(),
            email_ids: group.email_ids.clone(),
            header_link: None,
            body_link: None,
            mailto_link: None,
        };
        // The unsubscribe mechanism is sender-scoped: the first link of each
        // kind among the group's emails stands for the whole group.
        for id in &group.email_ids {
            let Some(meta) = snapshot.metadata_for(id) else {
                continue;
            };
            if job.header_link.is_none() {
                job.header_link = meta.header_link.clone();
            }
            if job.body_link.is_none() {
                job.body_link = meta.body_link.clone();
            }
            if job.mailto_link.is_none() {
                job.mailto_link = meta.mailto_link.clone();
            }
        }
        job
    }
}

struct SenderResolution {
    sender: String,
    email_ids: Vec<EmailId>,
    outcome: ProcessingOutcome,
    status: SenderStatus,
}

/// Enforces the progress contract at the emission source: `Processing`
/// precedes any terminal status per sender, and the first terminal status
/// sticks.
struct StatusGuard<'a> {
    sink: &'a dyn ProgressSink,
    seen: BTreeMap<String, SenderStatus>,
}

impl<'a> StatusGuard<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            seen: BTreeMap::new(),
        }
    }

    fn processing(&mut self, sender: &str) {
        if self.seen.contains_key(sender) {
            return;
        }
        self.seen
            .insert(sender.to_string(), SenderStatus::Processing);
        self.sink.emit(ProgressEvent::SenderStatus {
            sender: sender.to_string(),
            status: SenderStatus::Processing,
        });
    }

    fn terminal(&mut self, sender: &str, status: SenderStatus) {
        debug_assert!(status.is_terminal());
        if let Some(existing) = self.seen.get(sender) {
            if existing.is_terminal() {
                return;
            }
        } else {
            self.processing(sender);
        }
        self.seen.insert(sender.to_string(), status);
        self.sink.emit(ProgressEvent::SenderStatus {
            sender: sender.to_string(),
            status,
        });
    }
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn LinkFetcher>, backend: Arc<dyn BackendApi>) -> Self {
        Self { fetcher, backend }
    }

    /// Runs the full pipeline over a selection snapshot.
    ///
    /// Fails fast before any network I/O when the selection is empty or over
    /// [`MAX_SELECTED_EMAILS`]. Every selected email receives exactly one
    /// outcome in the returned report.
    pub async fn run(
        &self,
        snapshot: &SelectionSnapshot,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, SelectionError> {
        if snapshot.is_empty() {
            return Err(SelectionError::NoSelection);
        }
        if snapshot.len() > MAX_SELECTED_EMAILS {
            return Err(SelectionError::LimitExceeded {
                limit: MAX_SELECTED_EMAILS,
                attempted: snapshot.len(),
            });
        }

        let grouping = group_by_sender(snapshot);
        let total = snapshot.len();
        engine_info!(
            "starting unsubscribe run: {} emails across {} senders ({} deferred to backend)",
            total,
            grouping.groups.len(),
            grouping.deferred.len()
        );

        let selected: BTreeSet<&EmailId> = snapshot.ids.iter().collect();
        let mut guard = StatusGuard::new(sink);
        sink.emit(ProgressEvent::Progress { completed: 0, total });

        let mut outcomes: BTreeMap<EmailId, ProcessingOutcome> = BTreeMap::new();
        let mut senders: Vec<String> = Vec::new();
        let mut errors: Vec<RunError> = Vec::new();

        // Client-side tiers, all senders at once. Each future resolves only
        // its own emails; outcomes are merged here as senders settle, so no
        // map is written concurrently.
        let mut inflight = FuturesUnordered::new();
        for group in &grouping.groups {
            senders.push(group.sender.clone());
            guard.processing(&group.sender);
            inflight.push(self.resolve_sender(SenderJob::from_group(group, snapshot)));
        }

        while let Some(resolution) = inflight.next().await {
            guard.terminal(&resolution.sender, resolution.status);
            if let ProcessingOutcome::Failed(reason) = &resolution.outcome {
                for id in &resolution.email_ids {
                    errors.push(RunError::for_email(
                        id.clone(),
                        format!(
                            "Failed to process unsubscribe for {}: {reason}",
                            resolution.sender
                        ),
                    ));
                }
            }
            for id in resolution.email_ids {
                outcomes.insert(id, resolution.outcome.clone());
            }
            sink.emit(ProgressEvent::Progress {
                completed: outcomes.len().min(total),
                total,
            });
        }

        // Backend batch: everything with no local metadata, plus mailto-tier
        // emails (a mailto unsubscribe needs an explicit user send, so the
        // backend also gets to track or relay it).
        let batch: Vec<EmailId> = snapshot
            .ids
            .iter()
            .filter(|id| {
                grouping.deferred.contains(id)
                    || matches!(
                        outcomes.get(*id),
                        Some(ProcessingOutcome::ManualAction {
                            kind: LinkKind::Mailto,
                            ..
                        })
                    )
            })
            .cloned()
            .collect();

        if !batch.is_empty() {
            engine_debug!("delegating {} emails to the backend", batch.len());
            let request = build_unsubscribe_request(&batch, snapshot);
            match self.backend.unsubscribe(&request).await {
                Ok(response) if response.success => {
                    for id in &response.details.processed_email_ids {
                        if selected.contains(id) {
                            outcomes
                                .entry(id.clone())
                                .or_insert(ProcessingOutcome::Succeeded);
                        }
                    }
                    for entry in &response.details.mailto_links {
                        if selected.contains(&entry.message_id) {
                            outcomes.entry(entry.message_id.clone()).or_insert_with(|| {
                                ProcessingOutcome::ManualAction {
                                    link: entry.link.clone(),
                                    kind: LinkKind::Mailto,
                                }
                            });
                        }
                    }
                    for sender in &response.details.processed_senders {
                        if !senders.contains(sender) {
                            senders.push(sender.clone());
                        }
                        guard.terminal(sender, SenderStatus::Completed);
                    }
                    errors.extend(
                        response
                            .details
                            .unsubscribe_errors
                            .iter()
                            .cloned()
                            .map(RunError::batch),
                    );
                    // Batch ids the response never mentioned were still
                    // handled server-side; count them as processed.
                    for id in &batch {
                        outcomes
                            .entry(id.clone())
                            .or_insert(ProcessingOutcome::Succeeded);
                    }
                }
                Ok(response) => {
                    let message = response
                        .message
                        .unwrap_or_else(|| "Backend processing failed".to_string());
                    engine_warn!("backend unsubscribe rejected the batch: {message}");
                    errors.push(RunError::batch(message.clone()));
                    errors.extend(
                        response
                            .details
                            .unsubscribe_errors
                            .iter()
                            .cloned()
                            .map(RunError::batch),
                    );
                    fail_remaining(&mut outcomes, &batch, &message);
                }
                Err(err) => {
                    engine_warn!("backend unsubscribe call failed: {err}");
                    errors.push(RunError::batch(format!(
                        "Backend processing failed: {err}"
                    )));
                    fail_remaining(&mut outcomes, &batch, &err.to_string());
                }
            }
            sink.emit(ProgressEvent::Progress {
                completed: outcomes.len().min(total),
                total,
            });
        }

        // Archiving is orthogonal and best-effort: one batched call over all
        // originally selected ids, after every unsubscribe tier settled.
        let archive_status = if options.archive {
            let (status, archive_errors) = self.archive_batch(&snapshot.ids).await;
            errors.extend(archive_errors);
            Some(status)
        } else {
            None
        };

        sink.emit(ProgressEvent::Progress {
            completed: total,
            total,
        });

        let mut report = RunReport {
            total_selected: total,
            senders,
            errors,
            archive_status,
            ..Default::default()
        };
        for id in &snapshot.ids {
            match outcomes.get(id) {
                Some(ProcessingOutcome::ManualAction { link, kind }) => {
                    report.manual_actions.push(ManualAction {
                        email_id: id.clone(),
                        sender: display_sender(snapshot, id, link, *kind),
                        link: link.clone(),
                        kind: *kind,
                    });
                }
                Some(ProcessingOutcome::Failed(_)) => report.failed.push(id.clone()),
                // An untracked id means the backend path never ran for it;
                // mirror the server-side-processed assumption.
                Some(ProcessingOutcome::Succeeded) | None => report.succeeded.push(id.clone()),
            }
        }

        engine_info!(
            "run finished: {} succeeded, {} manual, {} failed",
            report.succeeded_count(),
            report.manual_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Archive without unsubscribing: the selection's ids in one batch.
    pub async fn archive_only(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<ArchiveStatus, SelectionError> {
        if snapshot.is_empty() {
            return Err(SelectionError::NoSelection);
        }
        let (status, _errors) = self.archive_batch(&snapshot.ids).await;
        Ok(status)
    }

    async fn resolve_sender(&self, job: SenderJob) -> SenderResolution {
        if let Some(url) = &job.header_link {
            match self.fetcher.fetch_unsubscribe(url).await {
                Ok(()) => {
                    engine_debug!("one-click unsubscribe succeeded for {}", job.sender);
                    return SenderResolution {
                        outcome: ProcessingOutcome::Succeeded,
                        status: SenderStatus::Completed,
                        sender: job.sender,
                        email_ids: job.email_ids,
                    };
                }
                Err(err) => {
                    engine_debug!("header link failed for {}: {err}", job.sender);
                }
            }
        }
        // Strict fallback order: body before mailto. Neither tier can be
        // completed automatically, so the first one present is surfaced as a
        // manual action rather than attempted.
        let manual = job
            .body_link
            .as_ref()
            .map(|link| (link.clone(), LinkKind::Body))
            .or_else(|| {
                job.mailto_link
                    .as_ref()
                    .map(|link| (link.clone(), LinkKind::Mailto))
            });
        match manual {
            Some((link, kind)) => SenderResolution {
                outcome: ProcessingOutcome::ManualAction { link, kind },
                status: SenderStatus::Manual,
                sender: job.sender,
                email_ids: job.email_ids,
            },
            None => SenderResolution {
                outcome: ProcessingOutcome::Failed(FailReason::NoUnsubscribeLink),
                status: SenderStatus::Error,
                sender: job.sender,
                email_ids: job.email_ids,
            },
        }
    }

    async fn archive_batch(&self, email_ids: &[EmailId]) -> (ArchiveStatus, Vec<RunError>) {
        match self.backend.archive(email_ids).await {
            Ok(response) if response.success => (
                ArchiveStatus {
                    success: true,
                    permission_error: false,
                    message: response.message,
                    help_text: None,
                },
                Vec::new(),
            ),
            Ok(response) => {
                let details = response.details.unwrap_or_default();
                let errors = if details.archive_errors.is_empty() {
                    vec![RunError::batch("Failed to archive some emails")]
                } else {
                    details
                        .archive_errors
                        .iter()
                        .cloned()
                        .map(RunError::batch)
                        .collect()
                };
                (
                    ArchiveStatus {
                        success: false,
                        permission_error: false,
                        message: response.message,
                        help_text: details.help_text,
                    },
                    errors,
                )
            }
            Err(BackendError::PermissionDenied { message, help_text }) => {
                engine_warn!("archive denied: {message}");
                let mut errors = vec![RunError::batch(message.clone())];
                if let Some(help) = &help_text {
                    errors.push(RunError::batch(help.clone()));
                }
                (
                    ArchiveStatus {
                        success: false,
                        permission_error: true,
                        message: Some(message),
                        help_text,
                    },
                    errors,
                )
            }
            Err(err) => {
                engine_warn!("archive call failed: {err}");
                (
                    ArchiveStatus {
                        success: false,
                        permission_error: false,
                        message: Some(err.to_string()),
                        help_text: None,
                    },
                    vec![RunError::batch(format!(
                        "Network error during archiving: {err}"
                    ))],
                )
            }
        }
    }
}

fn build_unsubscribe_request(batch: &[EmailId], snapshot: &SelectionSnapshot) -> UnsubscribeRequest {
    let mut request = UnsubscribeRequest {
        email_ids: batch.to_vec(),
        archive: false,
        ..Default::default()
    };
    for id in batch {
        let Some(meta) = snapshot.metadata_for(id) else {
            continue;
        };
        if let Some(link) = &meta.header_link {
            request.header_links.insert(id.clone(), link.clone());
        }
        if let Some(link) = &meta.body_link {
            request.body_links.insert(id.clone(), link.clone());
        }
        if let Some(link) = &meta.mailto_link {
            request.mailto_links.insert(id.clone(), link.clone());
        }
    }
    request
}

/// Marks batch ids that still have no outcome as failed, leaving completed
/// client-side tiers untouched.
fn fail_remaining(
    outcomes: &mut BTreeMap<EmailId, ProcessingOutcome>,
    batch: &[EmailId],
    message: &str,
) {
    for id in batch {
        outcomes
            .entry(id.clone())
            .or_insert_with(|| ProcessingOutcome::Failed(FailReason::Backend(message.to_string())));
    }
}

/// Sender shown next to a manual action: the stored display form when known,
/// otherwise the mailto address itself.
fn display_sender(snapshot: &SelectionSnapshot, id: &EmailId, link: &str, kind: LinkKind) -> String {
    if let Some(meta) = snapshot.metadata_for(id) {
        if !meta.sender.is_empty() {
            return meta.sender.clone();
        }
    }
    if kind == LinkKind::Mailto {
        let addr = link.trim_start_matches("mailto:");
        let addr = addr.split('?').next().unwrap_or(addr);
        if !addr.is_empty() {
            return addr.to_string();
        }
    }
    String::new()
}
