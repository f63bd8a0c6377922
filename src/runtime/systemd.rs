//! Plain command backend
//!
//! The image path is a command line run directly as the unit's main
//! process. There is no engine with its own identifiers, so a small shell
//! wrapper writes the domain UUID as the identifier before exec'ing the
//! command; the runtime name is then the unit name itself.

use super::registry::RuntimeFactory;
use super::{Runtime, RuntimeContext, RuntimeCore};
use crate::error::{Error, Result};
use crate::units;

pub const NAME: &str = "systemd";

const WRAPPER: &str = r#"printf '%s\n' "$1" > "$2" && shift 2 && exec "$@""#;

pub struct SystemdRuntime {
    core: RuntimeCore,
}

impl SystemdRuntime {
    pub fn new(uuid: &str, ctx: &RuntimeContext) -> Self {
        Self {
            core: RuntimeCore::new(NAME, units::PREFIX, uuid, ctx),
        }
    }

    fn command(&self, target: Option<&str>) -> Result<Vec<String>> {
        let image = self.core.image(target)?;
        let program = shlex::split(image)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| Error::Config(format!("cannot parse command {:?}", image)))?;

        let mut argv = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            WRAPPER.to_string(),
            "convirt-sh".to_string(),
            self.core.uuid().to_string(),
            self.core.id_path().to_string_lossy().into_owned(),
        ];
        argv.extend(program);
        Ok(argv)
    }
}

impl Runtime for SystemdRuntime {
    fn core(&self) -> &RuntimeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuntimeCore {
        &mut self.core
    }

    fn start(&mut self, target: Option<&str>) -> Result<()> {
        self.core.ensure_stopped()?;
        let command = self.command(target)?;
        let memory = self.core.require_run_config()?.memory_size_mib;
        let properties = vec![format!("--property=MemoryMax={}M", memory)];

        self.core.prepare_artifact()?;
        self.core.runner().start(&properties, &command)?;
        self.core.read_launched_id()
    }

    fn stop(&mut self) -> Result<()> {
        self.core.ensure_running()?;
        let name = self.runtime_name().unwrap_or_else(|| self.unit_name().to_string());
        self.core.runner().stop_unit(&name)?;
        self.core.forget();
        Ok(())
    }
}

pub struct SystemdFactory;

impl RuntimeFactory for SystemdFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn executable(&self) -> Option<&'static str> {
        Some("systemd-run")
    }

    fn create(&self, uuid: &str, ctx: &RuntimeContext) -> Box<dyn Runtime> {
        Box::new(SystemdRuntime::new(uuid, ctx))
    }
}
