//! Reattaching to running containers at startup

use std::sync::Arc;

use super::Manager;
use crate::domain::Domain;
use crate::error::Result;

impl Manager {
    /// Rebuild the directory from the units systemd still runs
    ///
    /// Each running `convirt-<uuid>` unit is matched with its cached
    /// descriptor. A unit that cannot be recovered is logged and skipped.
    /// Returns the directory contents afterwards.
    pub fn recover_all(&self) -> Result<Vec<Arc<Domain>>> {
        let mut recovered = 0;

        for uuid in self.running_units()? {
            if self.directory().contains(&uuid) {
                log::debug!("Domain {} already known", uuid);
                continue;
            }
            if uuid::Uuid::parse_str(&uuid).is_err() {
                log::warn!("Ignoring unit with malformed id {:?}", uuid);
                continue;
            }

            let xml = match self.cache().read(&uuid) {
                Ok(xml) => xml,
                Err(e) => {
                    log::error!("Cannot recover domain {}: {}", uuid, e);
                    continue;
                }
            };

            match Domain::recover(self, &uuid, &xml) {
                Ok(_) => recovered += 1,
                Err(e) => log::error!("Failed to recover domain {}: {}", uuid, e),
            }
        }

        log::info!("Recovered {} domains", recovered);
        Ok(self.directory().list_all())
    }
}
