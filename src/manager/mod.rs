//! Domain manager
//!
//! Owns the runtime registry, the directory of live domains, the descriptor
//! cache and the event handler. There is no global state: one `Manager` is
//! built at startup and shared by reference.

mod recovery;
mod watchdog;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::DescriptorCache;
use crate::clock::{Clock, SystemClock};
use crate::command::{Launcher, Resolver, Subprocess};
use crate::config::Config;
use crate::domain::{Directory, Domain, DomainOp, Outcome};
use crate::error::Result;
use crate::events::Handler;
use crate::runtime::{builtin_factories, Registry, RuntimeContext, RuntimeFactory};
use crate::units;

pub struct Manager {
    config: Arc<Config>,
    ctx: RuntimeContext,
    registry: Registry,
    directory: Directory,
    cache: DescriptorCache,
    events: Handler,
}

impl Manager {
    /// Manager running real commands found on the configured search path
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> ManagerBuilder {
        ManagerBuilder {
            config,
            launcher: None,
            resolver: None,
            clock: None,
            factories: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    pub fn events(&self) -> &Handler {
        &self.events
    }

    pub fn create(&self, xml: &str) -> Result<Arc<Domain>> {
        Domain::create(self, xml)
    }

    pub fn lookup(&self, uuid: &str) -> Result<Arc<Domain>> {
        self.directory.get(uuid)
    }

    pub fn list(&self) -> Vec<Arc<Domain>> {
        self.directory.list_all()
    }

    pub fn destroy(&self, uuid: &str) -> Result<()> {
        self.lookup(uuid)?.destroy(self)
    }

    pub fn reset(&self, uuid: &str) -> Result<()> {
        self.lookup(uuid)?.reset(self)
    }

    pub fn call(&self, uuid: &str, op: DomainOp) -> Result<Outcome> {
        self.lookup(uuid)?.call(self, op)
    }

    pub fn supported(&self) -> BTreeSet<String> {
        self.registry.supported()
    }

    /// Identifiers of our units systemd reports as running
    pub fn running_units(&self) -> Result<Vec<String>> {
        let found = units::list_running_units(
            self.ctx.launcher.as_ref(),
            &self.ctx.resolver,
            units::PREFIX,
        )?;
        Ok(found.collect())
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("run_dir", &self.config.run_dir)
            .field("registry", &self.registry)
            .field("domains", &self.directory.len())
            .finish()
    }
}

/// Builder for [`Manager`], for swapping out collaborators
pub struct ManagerBuilder {
    config: Config,
    launcher: Option<Arc<dyn Launcher>>,
    resolver: Option<Arc<Resolver>>,
    clock: Option<Arc<dyn Clock>>,
    factories: Option<Vec<Arc<dyn RuntimeFactory>>>,
}

impl ManagerBuilder {
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn factories(mut self, factories: Vec<Arc<dyn RuntimeFactory>>) -> Self {
        self.factories = Some(factories);
        self
    }

    pub fn build(self) -> Manager {
        let config = Arc::new(self.config);
        let resolver = self.resolver.unwrap_or_else(|| {
            Arc::new(match &config.search_path {
                Some(paths) => Resolver::new(paths.clone()),
                None => Resolver::from_env(),
            })
        });
        let launcher: Arc<dyn Launcher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(Subprocess::new(resolver.clone(), config.use_sudo)),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let factories = self.factories.unwrap_or_else(builtin_factories);

        let ctx = RuntimeContext {
            config: config.clone(),
            launcher,
            resolver: resolver.clone(),
            clock,
        };

        Manager {
            registry: Registry::with_factories(resolver, factories),
            directory: Directory::new(),
            cache: DescriptorCache::new(config.run_dir.clone()),
            events: Handler::new(),
            ctx,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::FakeLauncher;
    use crate::error::Error;
    use crate::runtime::fake::FakeFactory;

    #[test]
    fn test_defaults_use_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let m = Manager::new(Config {
            run_dir: dir.path().to_path_buf(),
            search_path: Some(vec![dir.path().to_path_buf()]),
            ..Config::default()
        });
        // Nothing installed in an empty directory
        assert!(m.supported().is_empty());
        assert_eq!(m.cache().dir(), dir.path());
    }

    #[test]
    fn test_lookup_missing() {
        let m = Manager::builder(Config::default())
            .launcher(Arc::new(FakeLauncher::new()))
            .clock(Arc::new(ManualClock::new()))
            .factories(vec![Arc::new(FakeFactory::default())])
            .build();
        assert!(matches!(m.lookup("nope"), Err(Error::NotFound(_))));
        assert!(matches!(m.destroy("nope"), Err(Error::NotFound(_))));
        assert!(matches!(
            m.call("nope", DomainOp::Status),
            Err(Error::NotFound(_))
        ));
        assert_eq!(
            m.supported().into_iter().collect::<Vec<_>>(),
            vec!["fake".to_string()]
        );
    }

    #[test]
    fn test_running_units() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.respond(
            "systemctl",
            "convirt-A.service loaded active running x\nfoobar.service loaded active running y\n",
        );
        let m = Manager::builder(Config::default())
            .launcher(launcher)
            .resolver(Arc::new(Resolver::pinned([("systemctl", "/bin/systemctl")])))
            .build();
        assert_eq!(m.running_units().unwrap(), vec!["A".to_string()]);
    }
}
