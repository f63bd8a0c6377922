//! Live domains by UUID

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::Domain;
use crate::error::{Error, Result};

#[derive(Default)]
struct Entries {
    domains: BTreeMap<String, Arc<Domain>>,
    /// UUIDs claimed by a create or recover still in progress
    pending: BTreeSet<String>,
}

impl Entries {
    fn taken(&self, uuid: &str) -> bool {
        self.domains.contains_key(uuid) || self.pending.contains(uuid)
    }
}

/// At most one domain per UUID
///
/// The lock only covers the map itself; domain operations run on the
/// `Arc<Domain>` handed out after it is released.
#[derive(Default)]
pub struct Directory {
    entries: Mutex<Entries>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, domain: Arc<Domain>) -> Result<()> {
        let mut entries = self.lock();
        let uuid = domain.uuid().to_string();
        if entries.taken(&uuid) {
            return Err(already_exists(&uuid));
        }
        log::debug!("Added domain {}", uuid);
        entries.domains.insert(uuid, domain);
        Ok(())
    }

    /// Claim `uuid` before launching anything for it
    ///
    /// The claim is released when the returned [`Reservation`] is dropped
    /// without being committed.
    pub fn reserve(&self, uuid: &str) -> Result<Reservation<'_>> {
        let mut entries = self.lock();
        if entries.taken(uuid) {
            return Err(already_exists(uuid));
        }
        entries.pending.insert(uuid.to_string());
        log::debug!("Reserved domain {}", uuid);
        Ok(Reservation {
            directory: self,
            uuid: uuid.to_string(),
            committed: false,
        })
    }

    pub fn remove(&self, uuid: &str) -> Result<Arc<Domain>> {
        let removed = self
            .lock()
            .domains
            .remove(uuid)
            .ok_or_else(|| Error::NotFound(uuid.to_string()))?;
        log::debug!("Removed domain {}", uuid);
        Ok(removed)
    }

    pub fn get(&self, uuid: &str) -> Result<Arc<Domain>> {
        self.lock()
            .domains
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::NotFound(uuid.to_string()))
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.lock().domains.contains_key(uuid)
    }

    /// Snapshot, ordered by UUID
    pub fn list_all(&self) -> Vec<Arc<Domain>> {
        self.lock().domains.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().domains.is_empty()
    }
}

// Only the keys: formatting a Domain takes its lock
impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.lock();
        f.debug_struct("Directory")
            .field("domains", &entries.domains.keys().collect::<Vec<_>>())
            .field("pending", &entries.pending)
            .finish()
    }
}

fn already_exists(uuid: &str) -> Error {
    Error::failed(format!("domain {} already exists", uuid))
}

/// A claimed UUID with no domain registered yet
pub struct Reservation<'a> {
    directory: &'a Directory,
    uuid: String,
    committed: bool,
}

impl Reservation<'_> {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Register `domain` under the claimed UUID
    pub fn commit(mut self, domain: Arc<Domain>) {
        let mut entries = self.directory.lock();
        entries.pending.remove(&self.uuid);
        entries.domains.insert(self.uuid.clone(), domain);
        self.committed = true;
        log::debug!("Added domain {}", self.uuid);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.directory.lock().pending.remove(&self.uuid);
            log::debug!("Released domain {}", self.uuid);
        }
    }
}
