use std::fmt;

use sha2::{Digest, Sha256};

use crate::selection::{EmailId, SelectionSnapshot};

/// Opaque, stable identifier derived from a sender display name.
///
/// Replaces ad hoc string sanitizing of sender names: the key is safe to use
/// anywhere an id is needed and identical for identical senders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderKey(String);

impl SenderKey {
    pub fn derive(sender: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sender.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            use std::fmt::Write;
            let _ = write!(&mut hex, "{byte:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One sender and the selected emails attributed to it, in selection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderGroup {
    pub key: SenderKey,
    pub sender: String,
    pub email_ids: Vec<EmailId>,
}

/// Result of partitioning a selection snapshot by sender.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderGroups {
    /// Senders in first-seen order.
    pub groups: Vec<SenderGroup>,
    /// Selected ids with no usable local metadata (picked on another page,
    /// or missing a sender); these are resolved by the backend instead.
    pub deferred: Vec<EmailId>,
}

impl SenderGroups {
    pub fn grouped_email_count(&self) -> usize {
        self.groups.iter().map(|g| g.email_ids.len()).sum()
    }
}

/// Groups the snapshot's selected ids by sender.
///
/// Deterministic: the same snapshot always yields the same groups in the
/// same order (senders first-seen, emails in selection order).
pub fn group_by_sender(snapshot: &SelectionSnapshot) -> SenderGroups {
    let mut result = SenderGroups::default();
    for id in &snapshot.ids {
        let Some(email) = snapshot.metadata.get(id) else {
            result.deferred.push(id.clone());
            continue;
        };
        if email.sender.is_empty() {
            result.deferred.push(id.clone());
            continue;
        }
        match result
            .groups
            .iter_mut()
            .find(|group| group.sender == email.sender)
        {
            Some(group) => group.email_ids.push(id.clone()),
            None => result.groups.push(SenderGroup {
                key: SenderKey::derive(&email.sender),
                sender: email.sender.clone(),
                email_ids: vec![id.clone()],
            }),
        }
    }
    result
}
