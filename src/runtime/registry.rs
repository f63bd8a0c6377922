//! Runtime registry
//!
//! A fixed table of backend factories, filtered once by what is installed
//! on the host.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use super::docker::DockerFactory;
use super::rkt::RktFactory;
use super::systemd::SystemdFactory;
use super::{Runtime, RuntimeContext};
use crate::command::Resolver;
use crate::config::Config;
use crate::error::{Error, Result};

/// Creates backend instances of one kind
pub trait RuntimeFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Program that must be installed for this backend to work
    fn executable(&self) -> Option<&'static str>;

    fn available(&self, resolver: &Resolver) -> bool {
        self.executable().map_or(true, |exe| resolver.available(exe))
    }

    fn create(&self, uuid: &str, ctx: &RuntimeContext) -> Box<dyn Runtime>;

    /// Host-wide preparation, run once by [`Registry::setup`]
    fn setup_runtime(&self, _config: &Config) -> Result<()> {
        Ok(())
    }

    fn teardown_runtime(&self, _config: &Config) -> Result<()> {
        Ok(())
    }
}

/// Backends shipped with convirt
pub fn builtin_factories() -> Vec<Arc<dyn RuntimeFactory>> {
    vec![
        Arc::new(SystemdFactory),
        Arc::new(RktFactory),
        Arc::new(DockerFactory),
    ]
}

type Available = BTreeMap<&'static str, Arc<dyn RuntimeFactory>>;

pub struct Registry {
    factories: Vec<Arc<dyn RuntimeFactory>>,
    resolver: Arc<Resolver>,
    available: Mutex<Option<Available>>,
    ready: Mutex<bool>,
}

impl Registry {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self::with_factories(resolver, builtin_factories())
    }

    pub fn with_factories(resolver: Arc<Resolver>, factories: Vec<Arc<dyn RuntimeFactory>>) -> Self {
        Self {
            factories,
            resolver,
            available: Mutex::new(None),
            ready: Mutex::new(false),
        }
    }

    fn probe(&self) -> Available {
        let mut found = Available::new();
        for factory in &self.factories {
            if factory.available(&self.resolver) {
                log::debug!("Runtime {} available", factory.name());
                found.insert(factory.name(), factory.clone());
            } else {
                log::debug!("Runtime {} not available", factory.name());
            }
        }
        found
    }

    fn with_available<T>(&self, f: impl FnOnce(&Available) -> T) -> T {
        let mut available = self.available.lock().unwrap_or_else(|e| e.into_inner());
        let found = available.get_or_insert_with(|| self.probe());
        f(found)
    }

    /// Probe the host on first call; later calls reuse the result
    pub fn register(&self) -> BTreeSet<String> {
        self.with_available(|found| found.keys().map(|k| k.to_string()).collect())
    }

    pub fn supported(&self) -> BTreeSet<String> {
        self.register()
    }

    pub fn factory(&self, kind: &str) -> Result<Arc<dyn RuntimeFactory>> {
        self.with_available(|found| found.get(kind).cloned())
            .ok_or_else(|| Error::Unsupported(kind.to_string()))
    }

    pub fn create(&self, kind: &str, uuid: &str, ctx: &RuntimeContext) -> Result<Box<dyn Runtime>> {
        let factory = self.factory(kind)?;
        log::debug!("Creating {} runtime for {}", kind, uuid);
        Ok(factory.create(uuid, ctx))
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run every available backend's host-wide setup
    pub fn setup(&self, config: &Config) -> Result<()> {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        if *ready {
            return Err(Error::Setup("runtimes already set up".to_string()));
        }
        let factories: Vec<_> = self.with_available(|found| found.values().cloned().collect());
        for factory in factories {
            log::debug!("Setting up runtime {}", factory.name());
            factory.setup_runtime(config)?;
        }
        *ready = true;
        Ok(())
    }

    /// Undo [`Registry::setup`]; individual failures are logged
    pub fn teardown(&self, config: &Config) -> Result<()> {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        if !*ready {
            return Err(Error::Setup("runtimes not set up".to_string()));
        }
        let factories: Vec<_> = self.with_available(|found| found.values().cloned().collect());
        for factory in factories {
            if let Err(e) = factory.teardown_runtime(config) {
                log::warn!("Teardown of runtime {} failed: {}", factory.name(), e);
            }
        }
        *ready = false;
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.factories.iter().map(|f| f.name()).collect();
        f.debug_struct("Registry")
            .field("factories", &names)
            .field("ready", &self.is_ready())
            .finish()
    }
}
