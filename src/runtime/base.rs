//! State shared by every engine backend

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::RunConfig;
use crate::clock::Clock;
use crate::command::{Launcher, Resolver};
use crate::config::Config;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::runner::Runner;
use crate::units;

/// Collaborators handed to every backend instance
#[derive(Clone)]
pub struct RuntimeContext {
    pub config: Arc<Config>,
    pub launcher: Arc<dyn Launcher>,
    pub resolver: Arc<Resolver>,
    pub clock: Arc<dyn Clock>,
}

impl RuntimeContext {
    pub fn runner(&self, unit_name: &str) -> Runner {
        Runner::new(
            unit_name,
            &self.config,
            self.launcher.clone(),
            self.resolver.clone(),
        )
    }
}

/// Identity, run configuration and engine identifier of one container
///
/// The engine identifier is written by the engine into
/// `<run_dir>/<uuid>.<kind>`; it is `Some` exactly while the container is
/// known to be running.
pub struct RuntimeCore {
    uuid: String,
    kind: &'static str,
    engine_prefix: &'static str,
    ctx: RuntimeContext,
    runner: Runner,
    run_conf: Option<RunConfig>,
    engine_id: Option<String>,
    id_path: PathBuf,
}

impl RuntimeCore {
    pub fn new(
        kind: &'static str,
        engine_prefix: &'static str,
        uuid: &str,
        ctx: &RuntimeContext,
    ) -> Self {
        let unit_name = units::unit_name(uuid);
        let id_path = ctx.config.run_dir.join(format!("{}.{}", uuid, kind));
        Self {
            uuid: uuid.to_string(),
            kind,
            engine_prefix,
            runner: ctx.runner(&unit_name),
            ctx: ctx.clone(),
            run_conf: None,
            engine_id: None,
            id_path,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn unit_name(&self) -> &str {
        self.runner.unit_name()
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.ctx.resolver
    }

    pub fn run_config(&self) -> Option<&RunConfig> {
        self.run_conf.as_ref()
    }

    pub fn engine_id(&self) -> Option<&str> {
        self.engine_id.as_deref()
    }

    pub fn id_path(&self) -> &Path {
        &self.id_path
    }

    pub fn running(&self) -> bool {
        self.engine_id.is_some()
    }

    pub fn runtime_name(&self) -> Option<String> {
        self.engine_id
            .as_ref()
            .map(|id| format!("{}{}", self.engine_prefix, id))
    }

    /// Replace the run configuration; a failure keeps the previous one
    pub fn configure(&mut self, desc: &Descriptor) -> Result<()> {
        let conf = RunConfig::from_descriptor(desc, self.ctx.config.net_fallback)?;
        self.run_conf = Some(conf);
        Ok(())
    }

    pub fn ensure_stopped(&self) -> Result<()> {
        if self.running() {
            return Err(Error::failed("already running"));
        }
        Ok(())
    }

    pub fn ensure_running(&self) -> Result<()> {
        if !self.running() {
            return Err(Error::failed("not running"));
        }
        Ok(())
    }

    pub fn require_run_config(&self) -> Result<&RunConfig> {
        self.run_conf
            .as_ref()
            .ok_or_else(|| Error::failed("not configured"))
    }

    /// Image to launch: the override if given, the configured one otherwise
    pub fn image<'a>(&'a self, target: Option<&'a str>) -> Result<&'a str> {
        let conf = self.require_run_config()?;
        Ok(target.unwrap_or(&conf.image_path))
    }

    /// Drop a leftover identifier so it cannot be mistaken for a fresh one
    pub fn prepare_artifact(&self) -> Result<()> {
        std::fs::create_dir_all(&self.ctx.config.run_dir)?;
        match std::fs::remove_file(&self.id_path) {
            Ok(()) => {
                log::debug!("Removed stale {}", self.id_path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll the identifier artifact until the engine has written it
    pub fn read_id(&mut self) -> Result<()> {
        let attempts = self.ctx.config.id_read_attempts;
        let delay = self.ctx.config.id_read_delay();

        for attempt in 1..=attempts {
            match std::fs::read_to_string(&self.id_path) {
                Ok(content) => {
                    let id = content.trim();
                    if !id.is_empty() {
                        log::debug!("{} {}: engine id {}", self.kind, self.uuid, id);
                        self.engine_id = Some(id.to_string());
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            log::debug!(
                "{} {}: identifier not ready ({}/{})",
                self.kind,
                self.uuid,
                attempt,
                attempts
            );
            self.ctx.clock.sleep(delay);
        }

        Err(Error::failed("failed to read identifier"))
    }

    /// [`RuntimeCore::read_id`] right after a launch
    ///
    /// If the identifier never shows up the unit is stopped, so a failed
    /// start does not leave an untracked container behind.
    pub fn read_launched_id(&mut self) -> Result<()> {
        let err = match self.read_id() {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        let unit = self.unit_name();
        log::warn!("{} {}: stopping unit {}: {}", self.kind, self.uuid, unit, err);
        if let Err(e) = self.runner.stop_unit(unit) {
            log::warn!("Failed to stop unit {}: {}", unit, e);
        }
        Err(err)
    }

    pub(crate) fn set_engine_id(&mut self, id: Option<String>) {
        self.engine_id = id;
    }

    /// Remove the identifier artifact; already gone is fine
    pub fn clear_artifact(&self) {
        match std::fs::remove_file(&self.id_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("{} already removed", self.id_path.display());
            }
            Err(e) => {
                log::warn!("Failed to remove {}: {}", self.id_path.display(), e);
            }
        }
    }

    /// Forget the engine identifier and its artifact
    pub fn forget(&mut self) {
        self.engine_id = None;
        self.clear_artifact();
    }

    /// Drop the identifier but keep the artifact
    ///
    /// The artifact is left for `teardown` or the next `prepare_artifact`.
    pub fn detach(&mut self) {
        self.engine_id = None;
    }

    pub fn setup(&self) -> Result<()> {
        std::fs::create_dir_all(&self.ctx.config.run_dir)?;
        Ok(())
    }

    pub fn teardown(&self) -> Result<()> {
        match std::fs::remove_file(&self.id_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for RuntimeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeCore")
            .field("uuid", &self.uuid)
            .field("kind", &self.kind)
            .field("engine_id", &self.engine_id)
            .field("id_path", &self.id_path)
            .finish_non_exhaustive()
    }
}
