use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailsweep_core::{
    summarize, EmailId, LinkKind, OverallStatus, ProgressBoard, SelectedEmail, SelectionError,
    SelectionSnapshot, SenderStatus, MAX_SELECTED_EMAILS,
};
use mailsweep_engine::{
    ArchiveResponse, BackendApi, BackendError, FetchError, FetchKind, LinkFetcher, MailtoEntry,
    Orchestrator, ProgressEvent, ProgressSink, RunOptions, UnsubscribeDetails, UnsubscribeRequest,
    UnsubscribeResponse,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    engine_logging::initialize_for_tests();
}

fn email(id: &str, sender: &str) -> SelectedEmail {
    SelectedEmail {
        id: id.to_string(),
        sender: sender.to_string(),
        header_link: None,
        mailto_link: None,
        body_link: None,
    }
}

fn snapshot(emails: Vec<SelectedEmail>, deferred_ids: &[&str]) -> SelectionSnapshot {
    let mut snap = SelectionSnapshot::default();
    for e in emails {
        snap.ids.push(e.id.clone());
        snap.metadata.insert(e.id.clone(), e);
    }
    for id in deferred_ids {
        snap.ids.push(id.to_string());
    }
    snap
}

#[derive(Default)]
struct FakeFetcher {
    failing_urls: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn failing(urls: &[&str]) -> Self {
        Self {
            failing_urls: urls.iter().map(|u| u.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkFetcher for FakeFetcher {
    async fn fetch_unsubscribe(&self, url: &str) -> Result<(), FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing_urls.iter().any(|u| u == url) {
            return Err(FetchError::new(FetchKind::HttpStatus(500), "server error"));
        }
        Ok(())
    }
}

struct FakeBackend {
    unsubscribe_result: Result<UnsubscribeResponse, BackendError>,
    archive_result: Result<ArchiveResponse, BackendError>,
    unsubscribe_requests: Mutex<Vec<UnsubscribeRequest>>,
    archive_requests: Mutex<Vec<Vec<EmailId>>>,
}

impl FakeBackend {
    fn accepting() -> Self {
        Self {
            unsubscribe_result: Ok(UnsubscribeResponse {
                success: true,
                ..UnsubscribeResponse::default()
            }),
            archive_result: Ok(ArchiveResponse {
                success: true,
                ..ArchiveResponse::default()
            }),
            unsubscribe_requests: Mutex::new(Vec::new()),
            archive_requests: Mutex::new(Vec::new()),
        }
    }

    fn with_unsubscribe(mut self, result: Result<UnsubscribeResponse, BackendError>) -> Self {
        self.unsubscribe_result = result;
        self
    }

    fn with_archive(mut self, result: Result<ArchiveResponse, BackendError>) -> Self {
        self.archive_result = result;
        self
    }

    fn unsubscribe_requests(&self) -> Vec<UnsubscribeRequest> {
        self.unsubscribe_requests.lock().unwrap().clone()
    }

    fn archive_requests(&self) -> Vec<Vec<EmailId>> {
        self.archive_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn unsubscribe(
        &self,
        request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, BackendError> {
        self.unsubscribe_requests.lock().unwrap().push(request.clone());
        self.unsubscribe_result.clone()
    }

    async fn archive(&self, email_ids: &[EmailId]) -> Result<ArchiveResponse, BackendError> {
        self.archive_requests.lock().unwrap().push(email_ids.to_vec());
        self.archive_result.clone()
    }
}

#[derive(Default)]
struct TestSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl TestSink {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    fn statuses_of(&self, sender: &str) -> Vec<SenderStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::SenderStatus { sender: s, status } if s == sender => Some(status),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn orchestrator(fetcher: Arc<FakeFetcher>, backend: Arc<FakeBackend>) -> Orchestrator {
    Orchestrator::new(fetcher, backend)
}

#[tokio::test]
async fn header_tier_succeeds_for_the_whole_group() {
    init_logging();
    let mut one = email("m1", "News");
    one.header_link = Some("https://news.example/unsub".to_string());
    let two = email("m2", "News");

    let fetcher = Arc::new(FakeFetcher::default());
    let backend = Arc::new(FakeBackend::accepting());
    let sink = TestSink::default();

    let report = orchestrator(fetcher.clone(), backend.clone())
        .run(&snapshot(vec![one, two], &[]), RunOptions::default(), &sink)
        .await
        .unwrap();

    // One fetch covers both emails of the sender.
    assert_eq!(fetcher.calls(), vec!["https://news.example/unsub".to_string()]);
    assert_eq!(report.succeeded, vec!["m1".to_string(), "m2".to_string()]);
    assert_eq!(report.manual_count(), 0);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.senders, vec!["News".to_string()]);
    // Nothing was deferred, so the backend is never contacted.
    assert!(backend.unsubscribe_requests().is_empty());
    assert_eq!(
        sink.statuses_of("News"),
        vec![SenderStatus::Processing, SenderStatus::Completed]
    );
}

#[tokio::test]
async fn mixed_tiers_produce_a_warning_report() {
    init_logging();
    let mut a1 = email("a1", "News");
    a1.header_link = Some("https://news.example/unsub".to_string());
    let a2 = email("a2", "News");
    let a3 = email("a3", "News");
    let mut b1 = email("b1", "Deals");
    b1.mailto_link = Some("mailto:unsub@deals.example".to_string());
    let mut b2 = email("b2", "Deals");
    b2.mailto_link = Some("mailto:unsub@deals.example".to_string());

    let fetcher = Arc::new(FakeFetcher::default());
    let backend = Arc::new(FakeBackend::accepting());
    let sink = TestSink::default();

    let report = orchestrator(fetcher, backend)
        .run(
            &snapshot(vec![a1, a2, a3, b1, b2], &[]),
            RunOptions::default(),
            &sink,
        )
        .await
        .unwrap();

    // One header fetch resolves all three News emails; both Deals emails
    // surface the mailto link as manual actions.
    assert_eq!(
        report.succeeded,
        vec!["a1".to_string(), "a2".to_string(), "a3".to_string()]
    );
    assert_eq!(report.manual_actions.len(), 2);
    assert_eq!(report.manual_actions[0].email_id, "b1");
    assert_eq!(report.manual_actions[1].email_id, "b2");
    assert!(report
        .manual_actions
        .iter()
        .all(|action| action.kind == LinkKind::Mailto));
    assert!(report.failed.is_empty());
    assert!(report.errors.is_empty());
    assert_eq!(
        sink.statuses_of("News"),
        vec![SenderStatus::Processing, SenderStatus::Completed]
    );
    assert_eq!(
        sink.statuses_of("Deals"),
        vec![SenderStatus::Processing, SenderStatus::Manual]
    );

    let summary = summarize(&report);
    assert_eq!(summary.overall, OverallStatus::Warning);
    assert_eq!(
        summary.message,
        "Automatically processed 3 emails. 2 emails require manual action."
    );
}

#[tokio::test]
async fn failed_header_falls_back_to_body_link() {
    init_logging();
    let mut one = email("m1", "Shop");
    one.header_link = Some("https://shop.example/broken".to_string());
    one.body_link = Some("https://shop.example/unsub".to_string());

    let fetcher = Arc::new(FakeFetcher::failing(&["https://shop.example/broken"]));
    let backend = Arc::new(FakeBackend::accepting());
    let sink = TestSink::default();

    let report = orchestrator(fetcher, backend)
        .run(&snapshot(vec![one], &[]), RunOptions::default(), &sink)
        .await
        .unwrap();

    assert_eq!(report.manual_actions.len(), 1);
    assert_eq!(report.manual_actions[0].email_id, "m1");
    assert_eq!(report.manual_actions[0].link, "https://shop.example/unsub");
    assert_eq!(report.manual_actions[0].kind, LinkKind::Body);
    assert!(report.errors.is_empty());
    assert_eq!(
        sink.statuses_of("Shop"),
        vec![SenderStatus::Processing, SenderStatus::Manual]
    );
}

#[tokio::test]
async fn mailto_tier_is_manual_and_delegated() {
    init_logging();
    let mut one = email("m1", "Blog");
    one.mailto_link = Some("mailto:unsub@blog.example".to_string());

    let fetcher = Arc::new(FakeFetcher::default());
    let backend = Arc::new(FakeBackend::accepting());
    let sink = TestSink::default();

    let report = orchestrator(fetcher.clone(), backend.clone())
        .run(&snapshot(vec![one], &[]), RunOptions::default(), &sink)
        .await
        .unwrap();

    assert!(fetcher.calls().is_empty());
    assert_eq!(report.manual_actions.len(), 1);
    assert_eq!(report.manual_actions[0].kind, LinkKind::Mailto);
    // Mailto-tier emails are also handed to the backend batch, with the
    // link map carrying what the client resolved.
    let requests = backend.unsubscribe_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].email_ids, vec!["m1".to_string()]);
    assert_eq!(
        requests[0].mailto_links.get("m1").map(String::as_str),
        Some("mailto:unsub@blog.example")
    );
}

#[tokio::test]
async fn sender_without_any_link_fails() {
    init_logging();
    let one = email("m1", "Silent");
    let two = email("m2", "Silent");

    let sink = TestSink::default();
    let report = orchestrator(
        Arc::new(FakeFetcher::default()),
        Arc::new(FakeBackend::accepting()),
    )
    .run(&snapshot(vec![one, two], &[]), RunOptions::default(), &sink)
    .await
    .unwrap();

    assert_eq!(report.failed, vec!["m1".to_string(), "m2".to_string()]);
    // One error per affected email, each attributed to its id.
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].email_id.as_deref(), Some("m1"));
    assert_eq!(report.errors[1].email_id.as_deref(), Some("m2"));
    assert!(report.errors.iter().all(|e| e.message.contains("Silent")));
    assert_eq!(
        sink.statuses_of("Silent"),
        vec![SenderStatus::Processing, SenderStatus::Error]
    );
    assert_eq!(summarize(&report).overall, OverallStatus::Error);
}

#[tokio::test]
async fn empty_selection_is_rejected_before_any_network() {
    init_logging();
    let fetcher = Arc::new(FakeFetcher::default());
    let backend = Arc::new(FakeBackend::accepting());

    let err = orchestrator(fetcher.clone(), backend.clone())
        .run(
            &SelectionSnapshot::default(),
            RunOptions::default(),
            &TestSink::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, SelectionError::NoSelection);
    assert!(fetcher.calls().is_empty());
    assert!(backend.unsubscribe_requests().is_empty());
}

#[tokio::test]
async fn oversized_selection_is_rejected_before_any_network() {
    init_logging();
    let emails: Vec<SelectedEmail> = (0..MAX_SELECTED_EMAILS + 1)
        .map(|i| {
            let mut e = email(&format!("m{i}"), "News");
            e.header_link = Some("https://news.example/unsub".to_string());
            e
        })
        .collect();

    let fetcher = Arc::new(FakeFetcher::default());
    let backend = Arc::new(FakeBackend::accepting());

    let err = orchestrator(fetcher.clone(), backend.clone())
        .run(
            &snapshot(emails, &[]),
            RunOptions::default(),
            &TestSink::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SelectionError::LimitExceeded {
            limit: MAX_SELECTED_EMAILS,
            attempted: MAX_SELECTED_EMAILS + 1,
        }
    );
    assert!(fetcher.calls().is_empty());
    assert!(backend.unsubscribe_requests().is_empty());
    assert!(backend.archive_requests().is_empty());
}

#[tokio::test]
async fn deferred_ids_are_resolved_by_the_backend() {
    init_logging();
    let mut one = email("m1", "News");
    one.header_link = Some("https://news.example/unsub".to_string());

    let backend = Arc::new(FakeBackend::accepting().with_unsubscribe(Ok(UnsubscribeResponse {
        success: true,
        message: None,
        details: UnsubscribeDetails {
            processed_email_ids: vec!["offpage".to_string()],
            processed_senders: vec!["Remote".to_string()],
            ..UnsubscribeDetails::default()
        },
    })));
    let fetcher = Arc::new(FakeFetcher::default());
    let sink = TestSink::default();

    let report = orchestrator(fetcher.clone(), backend.clone())
        .run(&snapshot(vec![one], &["offpage"]), RunOptions::default(), &sink)
        .await
        .unwrap();

    // The off-page id never reaches the client-side fetcher.
    assert_eq!(fetcher.calls().len(), 1);
    let requests = backend.unsubscribe_requests();
    assert_eq!(requests[0].email_ids, vec!["offpage".to_string()]);

    assert_eq!(
        report.succeeded,
        vec!["m1".to_string(), "offpage".to_string()]
    );
    assert_eq!(
        report.senders,
        vec!["News".to_string(), "Remote".to_string()]
    );
    assert_eq!(
        sink.statuses_of("Remote"),
        vec![SenderStatus::Processing, SenderStatus::Completed]
    );
}

#[tokio::test]
async fn backend_mailto_entries_become_manual_actions() {
    init_logging();
    let backend = Arc::new(FakeBackend::accepting().with_unsubscribe(Ok(UnsubscribeResponse {
        success: true,
        message: None,
        details: UnsubscribeDetails {
            mailto_links: vec![MailtoEntry {
                message_id: "offpage".to_string(),
                link: "mailto:unsub@remote.example?subject=stop".to_string(),
            }],
            ..UnsubscribeDetails::default()
        },
    })));

    let report = orchestrator(Arc::new(FakeFetcher::default()), backend)
        .run(
            &snapshot(vec![], &["offpage"]),
            RunOptions::default(),
            &TestSink::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.manual_actions.len(), 1);
    assert_eq!(report.manual_actions[0].kind, LinkKind::Mailto);
    // No stored metadata for the id, so the address stands in as sender.
    assert_eq!(report.manual_actions[0].sender, "unsub@remote.example");
    assert_eq!(summarize(&report).overall, OverallStatus::Warning);
}

#[tokio::test]
async fn backend_failure_marks_only_unresolved_ids() {
    init_logging();
    let mut one = email("m1", "News");
    one.header_link = Some("https://news.example/unsub".to_string());

    let backend = Arc::new(
        FakeBackend::accepting()
            .with_unsubscribe(Err(BackendError::Unavailable("connection refused".into()))),
    );
    let report = orchestrator(Arc::new(FakeFetcher::default()), backend)
        .run(
            &snapshot(vec![one], &["offpage"]),
            RunOptions::default(),
            &TestSink::default(),
        )
        .await
        .unwrap();

    // The client-side success is untouched by the backend failure.
    assert_eq!(report.succeeded, vec!["m1".to_string()]);
    assert_eq!(report.failed, vec!["offpage".to_string()]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].message.contains("connection refused"));
}

#[tokio::test]
async fn rejected_batch_keeps_client_side_manual_outcomes() {
    init_logging();
    let mut one = email("m1", "Blog");
    one.mailto_link = Some("mailto:unsub@blog.example".to_string());

    let backend = Arc::new(FakeBackend::accepting().with_unsubscribe(Ok(UnsubscribeResponse {
        success: false,
        message: Some("quota exhausted".to_string()),
        details: UnsubscribeDetails::default(),
    })));
    let report = orchestrator(Arc::new(FakeFetcher::default()), backend)
        .run(
            &snapshot(vec![one], &["offpage"]),
            RunOptions::default(),
            &TestSink::default(),
        )
        .await
        .unwrap();

    // The mailto email keeps its manual outcome; only the deferred id with
    // no outcome at all becomes a failure.
    assert_eq!(report.manual_actions.len(), 1);
    assert_eq!(report.manual_actions[0].email_id, "m1");
    assert_eq!(report.failed, vec!["offpage".to_string()]);
    assert!(report
        .errors
        .iter()
        .any(|e| e.message.contains("quota exhausted")));
}

#[tokio::test]
async fn archive_success_covers_the_whole_selection() {
    init_logging();
    let mut one = email("m1", "News");
    one.header_link = Some("https://news.example/unsub".to_string());
    let mut two = email("m2", "Shop");
    two.header_link = Some("https://shop.example/unsub".to_string());

    let backend = Arc::new(FakeBackend::accepting());
    let report = orchestrator(Arc::new(FakeFetcher::default()), backend.clone())
        .run(
            &snapshot(vec![one, two], &[]),
            RunOptions { archive: true },
            &TestSink::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        backend.archive_requests(),
        vec![vec!["m1".to_string(), "m2".to_string()]]
    );
    let status = report.archive_status.clone().unwrap();
    assert!(status.success);
    assert_eq!(report.archived_count(), 2);
    assert_eq!(
        summarize(&report).message,
        "Automatically processed 2 emails. Archived 2 emails."
    );
}

#[tokio::test]
async fn archive_permission_error_is_surfaced() {
    init_logging();
    let mut one = email("m1", "News");
    one.header_link = Some("https://news.example/unsub".to_string());

    let backend = Arc::new(FakeBackend::accepting().with_archive(Err(
        BackendError::PermissionDenied {
            message: "Archiving requires the modify scope".to_string(),
            help_text: Some("Re-connect the mailbox to grant it".to_string()),
        },
    )));
    let report = orchestrator(Arc::new(FakeFetcher::default()), backend)
        .run(
            &snapshot(vec![one], &[]),
            RunOptions { archive: true },
            &TestSink::default(),
        )
        .await
        .unwrap();

    let status = report.archive_status.clone().unwrap();
    assert!(!status.success);
    assert!(status.permission_error);
    assert_eq!(
        status.help_text.as_deref(),
        Some("Re-connect the mailbox to grant it")
    );
    assert_eq!(report.archived_count(), 0);
    // The unsubscribe itself still counts; only the archive failed.
    assert_eq!(report.succeeded, vec!["m1".to_string()]);
    assert!(report
        .errors
        .iter()
        .any(|e| e.message.contains("modify scope")));
    assert_eq!(summarize(&report).overall, OverallStatus::Error);
}

#[tokio::test]
async fn progress_events_replay_into_a_settled_board() {
    init_logging();
    let mut one = email("m1", "News");
    one.header_link = Some("https://news.example/unsub".to_string());
    let mut two = email("m2", "Shop");
    two.body_link = Some("https://shop.example/unsub".to_string());
    let three = email("m3", "Silent");

    let sink = TestSink::default();
    orchestrator(
        Arc::new(FakeFetcher::default()),
        Arc::new(FakeBackend::accepting()),
    )
    .run(
        &snapshot(vec![one, two, three], &[]),
        RunOptions::default(),
        &sink,
    )
    .await
    .unwrap();

    let events = sink.events();
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::Progress { completed: 0, total: 3 })
    );

    // Exactly one terminal status per sender, always after Processing.
    for sender in ["News", "Shop", "Silent"] {
        let statuses = sink.statuses_of(sender);
        assert_eq!(statuses[0], SenderStatus::Processing, "{sender}");
        assert_eq!(statuses.len(), 2, "{sender}");
        assert!(statuses[1].is_terminal(), "{sender}");
    }

    let mut board = ProgressBoard::begin(
        ["News", "Shop", "Silent"].map(String::from),
    );
    for event in &events {
        event.apply_to(&mut board);
    }
    assert_eq!(board.progress(), (3, 3));
    assert!(board.is_settled());
}

#[tokio::test]
async fn archive_only_rejects_empty_selection() {
    init_logging();
    let backend = Arc::new(FakeBackend::accepting());
    let err = orchestrator(Arc::new(FakeFetcher::default()), backend.clone())
        .archive_only(&SelectionSnapshot::default())
        .await
        .unwrap_err();
    assert_eq!(err, SelectionError::NoSelection);
    assert!(backend.archive_requests().is_empty());
}

#[tokio::test]
async fn archive_only_batches_all_ids() {
    init_logging();
    let backend = Arc::new(FakeBackend::accepting());
    let status = orchestrator(Arc::new(FakeFetcher::default()), backend.clone())
        .archive_only(&snapshot(vec![email("m1", "News"), email("m2", "Shop")], &[]))
        .await
        .unwrap();

    assert!(status.success);
    assert_eq!(
        backend.archive_requests(),
        vec![vec!["m1".to_string(), "m2".to_string()]]
    );
}
