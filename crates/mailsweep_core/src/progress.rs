/// Per-sender lifecycle during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderStatus {
    Waiting,
    Processing,
    Completed,
    Manual,
    Error,
}

impl SenderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SenderStatus::Completed | SenderStatus::Manual | SenderStatus::Error
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderRow {
    pub sender: String,
    pub status: SenderStatus,
}

/// Render-side view of run progress, fed by orchestrator events.
///
/// Applying the same event twice leaves the board unchanged, a sender's
/// first terminal status sticks, and progress counters never move backward,
/// so a renderer can redraw from the board at any time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressBoard {
    rows: Vec<SenderRow>,
    completed: usize,
    total: usize,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one `Waiting` row per sender, preserving order.
    pub fn begin(senders: impl IntoIterator<Item = String>) -> Self {
        Self {
            rows: senders
                .into_iter()
                .map(|sender| SenderRow {
                    sender,
                    status: SenderStatus::Waiting,
                })
                .collect(),
            completed: 0,
            total: 0,
        }
    }

    pub fn on_sender_status(&mut self, sender: &str, status: SenderStatus) {
        match self.rows.iter_mut().find(|row| row.sender == sender) {
            Some(row) => {
                if row.status.is_terminal() {
                    return;
                }
                row.status = status;
            }
            None => self.rows.push(SenderRow {
                sender: sender.to_string(),
                status,
            }),
        }
    }

    /// `total` counts emails, not senders. Regressions are ignored.
    pub fn on_progress(&mut self, completed: usize, total: usize) {
        if total > self.total {
            self.total = total;
        }
        let completed = completed.min(self.total);
        if completed > self.completed {
            self.completed = completed;
        }
    }

    /// Rows in first-seen order.
    pub fn rows(&self) -> &[SenderRow] {
        &self.rows
    }

    pub fn status_of(&self, sender: &str) -> Option<SenderStatus> {
        self.rows
            .iter()
            .find(|row| row.sender == sender)
            .map(|row| row.status)
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.completed, self.total)
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100) / self.total) as u8
    }

    pub fn is_settled(&self) -> bool {
        self.total > 0
            && self.completed == self.total
            && self.rows.iter().all(|row| row.status.is_terminal())
    }
}
