use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) const SELECTED_IDS_KEY: &str = "selectedEmailIds";
pub(crate) const EMAIL_DETAILS_KEY: &str = "emailDetails";
pub(crate) const PROCESSED_SENDERS_KEY: &str = "processedSenders";

/// Synchronous string key/value store with per-tab session lifetime.
///
/// The embedding host supplies the real storage; [`MemorySessionStorage`]
/// backs tests and headless use. Writes must be durable for the session the
/// moment they return, so a page navigation never loses selection state.
pub trait SessionStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory [`SessionStorage`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    entries: HashMap<String, String>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Reads a JSON value from storage. A missing or malformed entry degrades to
/// the type's default; corruption is logged, never surfaced to the caller.
pub(crate) fn read_or_default<S, T>(storage: &S, key: &str) -> T
where
    S: SessionStorage + ?Sized,
    T: DeserializeOwned + Default,
{
    let Some(raw) = storage.get(key) else {
        return T::default();
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("discarding malformed session value under {key:?}: {err}");
            T::default()
        }
    }
}

pub(crate) fn write_json<S, T>(storage: &mut S, key: &str, value: &T)
where
    S: SessionStorage + ?Sized,
    T: Serialize,
{
    match serde_json::to_string(value) {
        Ok(raw) => storage.set(key, &raw),
        Err(err) => log::error!("failed to serialize session value for {key:?}: {err}"),
    }
}
