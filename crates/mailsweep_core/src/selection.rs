use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{
    read_or_default, write_json, SessionStorage, EMAIL_DETAILS_KEY, SELECTED_IDS_KEY,
};

/// Opaque message identifier assigned by the mail provider.
pub type EmailId = String;

/// Hard cap on how many emails one run may cover.
pub const MAX_SELECTED_EMAILS: usize = 25;

/// Per-email metadata captured when a row is observed by the rendering
/// collaborator. Link fields describe the unsubscribe mechanisms available
/// for the message; extraction from MIME content happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedEmail {
    pub id: EmailId,
    /// Display-form originator, e.g. `"Name <addr@example.com>"`.
    pub sender: String,
    #[serde(default)]
    pub header_link: Option<String>,
    #[serde(default)]
    pub mailto_link: Option<String>,
    #[serde(default)]
    pub body_link: Option<String>,
}

impl SelectedEmail {
    /// Field-wise merge: newer link values win, absent ones keep the stored
    /// value. The sender is only replaced by a non-empty one.
    fn merged_with(mut self, newer: SelectedEmail) -> SelectedEmail {
        if !newer.sender.is_empty() {
            self.sender = newer.sender;
        }
        self.header_link = newer.header_link.or(self.header_link);
        self.mailto_link = newer.mailto_link.or(self.mailto_link);
        self.body_link = newer.body_link.or(self.body_link);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("selection limit of {limit} exceeded (attempted {attempted})")]
    LimitExceeded { limit: usize, attempted: usize },
    #[error("no emails selected")]
    NoSelection,
}

/// Immutable view of the selection handed to the orchestrator at run start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionSnapshot {
    /// Selected ids in selection order.
    pub ids: Vec<EmailId>,
    pub metadata: BTreeMap<EmailId, SelectedEmail>,
}

impl SelectionSnapshot {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn metadata_for(&self, id: &str) -> Option<&SelectedEmail> {
        self.metadata.get(id)
    }
}

/// Selection state shared across paginated pages.
///
/// Every mutation persists synchronously through the session storage, so the
/// selection survives page navigation within the tab. All cap checks are
/// atomic: an operation that would exceed [`MAX_SELECTED_EMAILS`] fails
/// without touching either storage key.
#[derive(Debug)]
pub struct SelectionStore<S: SessionStorage> {
    storage: S,
}

impl<S: SessionStorage> SelectionStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Selected email ids, in selection order.
    pub fn selected(&self) -> Vec<EmailId> {
        read_or_default(&self.storage, SELECTED_IDS_KEY)
    }

    pub fn len(&self) -> usize {
        self.selected().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected().is_empty()
    }

    pub fn metadata(&self, id: &str) -> Option<SelectedEmail> {
        let details: BTreeMap<EmailId, SelectedEmail> =
            read_or_default(&self.storage, EMAIL_DETAILS_KEY);
        details.get(id).cloned()
    }

    /// Replaces the whole selected set. Metadata for ids no longer selected
    /// is dropped; metadata for retained ids is kept.
    pub fn set_selected(&mut self, ids: Vec<EmailId>) -> Result<(), SelectionError> {
        if ids.len() > MAX_SELECTED_EMAILS {
            return Err(SelectionError::LimitExceeded {
                limit: MAX_SELECTED_EMAILS,
                attempted: ids.len(),
            });
        }
        let mut details: BTreeMap<EmailId, SelectedEmail> =
            read_or_default(&self.storage, EMAIL_DETAILS_KEY);
        details.retain(|id, _| ids.contains(id));
        write_json(&mut self.storage, SELECTED_IDS_KEY, &ids);
        write_json(&mut self.storage, EMAIL_DETAILS_KEY, &details);
        Ok(())
    }

    /// Marks one email selected and records its metadata.
    pub fn select(&mut self, email: SelectedEmail) -> Result<(), SelectionError> {
        let mut ids = self.selected();
        if !ids.contains(&email.id) {
            if ids.len() >= MAX_SELECTED_EMAILS {
                return Err(SelectionError::LimitExceeded {
                    limit: MAX_SELECTED_EMAILS,
                    attempted: ids.len() + 1,
                });
            }
            ids.push(email.id.clone());
            write_json(&mut self.storage, SELECTED_IDS_KEY, &ids);
        }
        self.upsert_metadata(email);
        Ok(())
    }

    /// Bulk select (select-all-on-page). Fails atomically when the combined
    /// selection would exceed the cap.
    pub fn select_many(
        &mut self,
        emails: impl IntoIterator<Item = SelectedEmail>,
    ) -> Result<(), SelectionError> {
        let emails: Vec<SelectedEmail> = emails.into_iter().collect();
        let ids = self.selected();
        let added = emails.iter().filter(|e| !ids.contains(&e.id)).count();
        if ids.len() + added > MAX_SELECTED_EMAILS {
            return Err(SelectionError::LimitExceeded {
                limit: MAX_SELECTED_EMAILS,
                attempted: ids.len() + added,
            });
        }
        for email in emails {
            self.select(email)?;
        }
        Ok(())
    }

    pub fn deselect(&mut self, id: &str) {
        let mut ids = self.selected();
        ids.retain(|existing| existing != id);
        write_json(&mut self.storage, SELECTED_IDS_KEY, &ids);
        self.remove_metadata(id);
    }

    /// Merges metadata fields for an email, keeping previously stored link
    /// values where the new record has none.
    pub fn upsert_metadata(&mut self, email: SelectedEmail) {
        let mut details: BTreeMap<EmailId, SelectedEmail> =
            read_or_default(&self.storage, EMAIL_DETAILS_KEY);
        let merged = match details.remove(&email.id) {
            Some(existing) => existing.merged_with(email),
            None => email,
        };
        details.insert(merged.id.clone(), merged);
        write_json(&mut self.storage, EMAIL_DETAILS_KEY, &details);
    }

    pub fn remove_metadata(&mut self, id: &str) {
        let mut details: BTreeMap<EmailId, SelectedEmail> =
            read_or_default(&self.storage, EMAIL_DETAILS_KEY);
        if details.remove(id).is_some() {
            write_json(&mut self.storage, EMAIL_DETAILS_KEY, &details);
        }
    }

    /// Empties both the selected set and the metadata map. Idempotent.
    pub fn clear_all(&mut self) {
        self.storage.remove(SELECTED_IDS_KEY);
        self.storage.remove(EMAIL_DETAILS_KEY);
    }

    /// Immutable snapshot for one orchestrator run.
    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            ids: self.selected(),
            metadata: read_or_default(&self.storage, EMAIL_DETAILS_KEY),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}
