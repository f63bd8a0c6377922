//! Detecting containers that exited on their own

use std::collections::HashSet;

use chrono::Utc;

use super::Manager;
use crate::error::Result;
use crate::events::{Event, EventKind};

impl Manager {
    /// Mark running domains whose unit is gone as stopped
    ///
    /// Fires `Stopped` once per domain and returns the affected UUIDs.
    /// Domains created or reset while the listing ran are skipped. The
    /// identifier artifact is kept for destroy.
    pub fn watchdog(&self) -> Result<Vec<String>> {
        let listed_at = Utc::now();
        let alive: HashSet<String> = self.running_units()?.into_iter().collect();
        let mut stopped = Vec::new();

        for domain in self.directory().list_all() {
            if alive.contains(domain.uuid()) {
                continue;
            }
            if domain.mark_stopped(listed_at) {
                log::info!("Domain {} stopped", domain.uuid());
                self.events()
                    .fire(Event::new(EventKind::Stopped, domain.uuid()));
                stopped.push(domain.uuid().to_string());
            }
        }

        Ok(stopped)
    }
}
