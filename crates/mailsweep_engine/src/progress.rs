use mailsweep_core::{ProgressBoard, SenderStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    SenderStatus {
        sender: String,
        status: SenderStatus,
    },
    /// `total` counts emails to process, not senders.
    Progress { completed: usize, total: usize },
}

impl ProgressEvent {
    /// Feeds the event into a render-side board.
    pub fn apply_to(&self, board: &mut ProgressBoard) {
        match self {
            ProgressEvent::SenderStatus { sender, status } => {
                board.on_sender_status(sender, *status);
            }
            ProgressEvent::Progress { completed, total } => {
                board.on_progress(*completed, *total);
            }
        }
    }
}

/// Receives orchestrator progress. The orchestrator guarantees that a
/// `Processing` status precedes any terminal status per sender and that no
/// terminal status is emitted twice.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink over a channel, for hosts that poll events from a render loop.
pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: ProgressEvent) {}
}
