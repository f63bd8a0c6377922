//! Domain lifecycle
//!
//! A domain ties one descriptor to one runtime backend instance.
//!
//! ```text
//!   create:   Unconfigured ──configure──▶ Configured ──start──▶ Running
//!   recover:                                         resync ──▶ Running
//!
//!   Running ──reset (stop)──▶ Stopped ──reset (start)──▶ Running
//!   Running ──watchdog──────▶ Stopped
//!   any     ──destroy───────▶ Destroyed
//! ```
//!
//! A domain is only added to the directory once it is running, so a failed
//! create never leaves an entry behind.

pub mod directory;
mod ops;

pub use directory::Directory;
pub use ops::{DomainOp, Outcome};

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::manager::Manager;
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
    Destroyed,
}

impl DomainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status report for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub uuid: String,
    pub name: Option<String>,
    pub kind: String,
    pub state: DomainState,
    pub unit_name: String,
    pub runtime_name: Option<String>,
    pub running: bool,
    /// Time of the last state change
    pub since: DateTime<Utc>,
    pub memory_mib: Option<u64>,
    pub image: Option<String>,
}

struct Inner {
    runtime: Box<dyn Runtime>,
    state: DomainState,
    state_changed: DateTime<Utc>,
}

impl Inner {
    fn set_state(&mut self, uuid: &str, state: DomainState) {
        if self.state != state {
            log::debug!("Domain {}: {} -> {}", uuid, self.state, state);
        }
        self.state = state;
        self.state_changed = Utc::now();
    }
}

pub struct Domain {
    uuid: String,
    descriptor: Descriptor,
    inner: Mutex<Inner>,
}

impl Domain {
    pub fn new(descriptor: Descriptor, runtime: Box<dyn Runtime>, state: DomainState) -> Self {
        Self {
            uuid: descriptor.uuid().to_string(),
            descriptor,
            inner: Mutex::new(Inner {
                runtime,
                state,
                state_changed: Utc::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock, refusing a destroyed domain
    fn lock_live(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.lock();
        if inner.state == DomainState::Destroyed {
            return Err(Error::failed("destroyed"));
        }
        Ok(inner)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn state(&self) -> DomainState {
        self.lock().state
    }

    pub fn kind(&self) -> &'static str {
        self.lock().runtime.kind()
    }

    /// Launch a new domain from its XML and register it
    pub fn create(manager: &Manager, xml: &str) -> Result<Arc<Domain>> {
        let desc = Descriptor::parse(xml)?;
        let uuid = desc.uuid().to_string();
        let kind = runtime_kind(&desc)?;
        let claim = manager.directory().reserve(&uuid)?;

        let runtime = manager.registry().create(&kind, &uuid, manager.context())?;
        let domain = Arc::new(Domain::new(desc, runtime, DomainState::Unconfigured));
        domain.boot()?;

        if let Err(e) = manager.cache().save(&uuid, xml) {
            domain.abort();
            return Err(e);
        }
        claim.commit(domain.clone());

        log::info!("Domain {} started ({})", uuid, kind);
        manager.events().fire(Event::new(EventKind::Started, &uuid));
        Ok(domain)
    }

    /// setup, configure, start; anything set up is torn down on failure
    fn boot(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.runtime.setup()?;

        if let Err(e) = self.configure_and_start(&mut inner) {
            log::warn!("Domain {} failed to start: {}", self.uuid, e);
            if let Err(te) = inner.runtime.teardown() {
                log::warn!("Domain {} teardown failed: {}", self.uuid, te);
            }
            return Err(e);
        }

        inner.set_state(&self.uuid, DomainState::Running);
        Ok(())
    }

    fn configure_and_start(&self, inner: &mut Inner) -> Result<()> {
        inner.runtime.configure(&self.descriptor)?;
        inner.set_state(&self.uuid, DomainState::Configured);
        inner.runtime.start(None)
    }

    /// Undo a successful boot that could not be registered
    fn abort(&self) {
        let mut inner = self.lock();
        if let Err(e) = inner.runtime.stop() {
            log::warn!("Domain {} stop failed: {}", self.uuid, e);
        }
        if let Err(e) = inner.runtime.teardown() {
            log::warn!("Domain {} teardown failed: {}", self.uuid, e);
        }
        inner.set_state(&self.uuid, DomainState::Destroyed);
    }

    /// Reattach to a container that kept running across a restart
    pub fn recover(manager: &Manager, uuid: &str, xml: &str) -> Result<Arc<Domain>> {
        let desc = Descriptor::parse(xml)?;
        if desc.uuid() != uuid {
            return Err(Error::Config(format!(
                "descriptor uuid {} does not match {}",
                desc.uuid(),
                uuid
            )));
        }
        let kind = runtime_kind(&desc)?;
        let claim = manager.directory().reserve(uuid)?;

        let mut runtime = manager.registry().create(&kind, uuid, manager.context())?;
        runtime.resync()?;

        let domain = Arc::new(Domain::new(desc, runtime, DomainState::Running));
        claim.commit(domain.clone());

        log::info!("Domain {} recovered ({})", uuid, kind);
        manager.events().fire(Event::new(EventKind::Recovered, uuid));
        Ok(domain)
    }

    pub fn destroy(&self, manager: &Manager) -> Result<()> {
        let mut inner = self.lock_live()?;
        if !manager.directory().contains(&self.uuid) {
            return Err(Error::NotFound(self.uuid.clone()));
        }

        match inner.runtime.stop() {
            Ok(()) => {}
            Err(Error::OperationFailed(msg)) if !inner.runtime.running() => {
                log::info!("Domain {} was not running: {}", self.uuid, msg);
            }
            Err(e) => return Err(e),
        }
        if let Err(e) = inner.runtime.teardown() {
            log::warn!("Domain {} teardown failed: {}", self.uuid, e);
        }
        manager.cache().clear(&self.uuid);
        manager.directory().remove(&self.uuid)?;
        inner.set_state(&self.uuid, DomainState::Destroyed);
        drop(inner);

        log::info!("Domain {} destroyed", self.uuid);
        manager.events().fire(Event::new(EventKind::Destroyed, &self.uuid));
        Ok(())
    }

    /// Stop if running, then start again
    ///
    /// Not atomic: if the start fails the domain stays stopped.
    pub fn reset(&self, manager: &Manager) -> Result<()> {
        let mut inner = self.lock_live()?;

        if inner.runtime.running() {
            inner.runtime.stop()?;
            inner.set_state(&self.uuid, DomainState::Stopped);
        }
        // Recovered domains are configured on first use
        if inner.runtime.run_config().is_none() {
            inner.runtime.configure(&self.descriptor)?;
        }
        inner.runtime.start(None)?;
        inner.set_state(&self.uuid, DomainState::Running);
        drop(inner);

        log::info!("Domain {} reset", self.uuid);
        manager.events().fire(Event::new(EventKind::Started, &self.uuid));
        Ok(())
    }

    pub fn describe(&self) -> Result<String> {
        self.lock_live()?;
        Ok(self.descriptor.xml().to_string())
    }

    pub fn status(&self) -> Result<DomainInfo> {
        let inner = self.lock_live()?;
        Ok(self.info(&inner))
    }

    fn info(&self, inner: &Inner) -> DomainInfo {
        let run_conf = inner.runtime.run_config();
        DomainInfo {
            uuid: self.uuid.clone(),
            name: self.descriptor.name().map(str::to_string),
            kind: inner.runtime.kind().to_string(),
            state: inner.state,
            unit_name: inner.runtime.unit_name().to_string(),
            runtime_name: inner.runtime.runtime_name(),
            running: inner.runtime.running(),
            since: inner.state_changed,
            memory_mib: run_conf.map(|c| c.memory_size_mib),
            image: run_conf.map(|c| c.image_path.clone()),
        }
    }

    /// Dispatch a named operation
    pub fn call(&self, manager: &Manager, op: DomainOp) -> Result<Outcome> {
        self.lock_live()?;
        match op {
            DomainOp::Destroy => self.destroy(manager).map(|()| Outcome::Done),
            DomainOp::Reset => self.reset(manager).map(|()| Outcome::Done),
            DomainOp::Describe => self.describe().map(Outcome::Xml),
            DomainOp::Status => self.status().map(Outcome::Info),
            other => Err(Error::UnsupportedOperation(other)),
        }
    }

    /// The unit vanished on its own; returns false if not running
    ///
    /// `since` is when the unit listing was taken. A domain whose state
    /// changed after it may not be in the listing yet and is left alone.
    pub fn mark_stopped(&self, since: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        if inner.state != DomainState::Running || inner.state_changed > since {
            return false;
        }
        inner.runtime.detach();
        inner.set_state(&self.uuid, DomainState::Stopped);
        true
    }
}

fn runtime_kind(desc: &Descriptor) -> Result<String> {
    desc.emulator()
        .map(str::to_string)
        .ok_or_else(|| Error::Config("emulator".to_string()))
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("uuid", &self.uuid)
            .field("state", &self.state())
            .finish()
    }
}
