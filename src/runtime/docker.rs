//! docker backend
//!
//! `docker run` stays in the foreground inside the unit; the container id
//! lands in the `--cidfile`. The container is named after the unit and
//! stopped by container id. The `dkr-<cid>` runtime name is only shown to
//! users; no command addresses a container by it.

use super::registry::RuntimeFactory;
use super::{Runtime, RuntimeContext, RuntimeCore};
use crate::error::Result;

pub const NAME: &str = "docker";
const PREFIX: &str = "dkr-";

pub struct DockerRuntime {
    core: RuntimeCore,
}

impl DockerRuntime {
    pub fn new(uuid: &str, ctx: &RuntimeContext) -> Self {
        Self {
            core: RuntimeCore::new(NAME, PREFIX, uuid, ctx),
        }
    }

    fn docker(&self) -> Result<String> {
        Ok(self.core.resolver().command("docker")?)
    }

    fn command(&self, target: Option<&str>) -> Result<Vec<String>> {
        let image = self.core.image(target)?;
        let conf = self.core.require_run_config()?;

        let mut argv = vec![
            self.docker()?,
            "run".to_string(),
            "--rm".to_string(),
            format!("--cidfile={}", self.core.id_path().display()),
            format!("--name={}", self.core.unit_name()),
            format!("--memory={}m", conf.memory_size_mib),
        ];
        if let Some(net) = &conf.network {
            argv.push(format!("--network={}", net));
        }
        for vol in &conf.volumes {
            argv.push(format!("--volume={}:/{}", vol.source, vol.name));
        }
        argv.push(image.to_string());
        Ok(argv)
    }
}

impl Runtime for DockerRuntime {
    fn core(&self) -> &RuntimeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuntimeCore {
        &mut self.core
    }

    fn start(&mut self, target: Option<&str>) -> Result<()> {
        self.core.ensure_stopped()?;
        let command = self.command(target)?;
        // docker refuses to overwrite an existing cidfile
        self.core.prepare_artifact()?;
        self.core.runner().start(&[], &command)?;
        self.core.read_launched_id()
    }

    fn stop(&mut self) -> Result<()> {
        self.core.ensure_running()?;
        if let Some(id) = self.core.engine_id() {
            let argv = vec![self.docker()?, "stop".to_string(), id.to_string()];
            self.core.runner().call(&argv)?;
        }
        self.core.forget();
        Ok(())
    }
}

pub struct DockerFactory;

impl RuntimeFactory for DockerFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn executable(&self) -> Option<&'static str> {
        Some("docker")
    }

    fn create(&self, uuid: &str, ctx: &RuntimeContext) -> Box<dyn Runtime> {
        Box::new(DockerRuntime::new(uuid, ctx))
    }
}
