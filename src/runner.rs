//! Transient unit supervisor
//!
//! Every engine process is wrapped in a transient systemd service so it shows
//! up in `systemctl list-units` under a name derived from the domain UUID.
//!
//! ```text
//! systemd-run --unit=convirt-<uuid> --slice=<slice>
//!             --property=CPUAccounting=1
//!             --property=MemoryAccounting=1
//!             --property=BlockIOAccounting=1
//!             [--uid=N] [--gid=N] [extra properties] <command...>
//! ```

use std::sync::Arc;

use crate::command::{display, LaunchError, Launcher, Resolver};
use crate::config::Config;

const ACCOUNTING: [&str; 3] = [
    "--property=CPUAccounting=1",
    "--property=MemoryAccounting=1",
    "--property=BlockIOAccounting=1",
];

pub struct Runner {
    unit_name: String,
    slice: String,
    uid: Option<u32>,
    gid: Option<u32>,
    launcher: Arc<dyn Launcher>,
    resolver: Arc<Resolver>,
}

impl Runner {
    pub fn new(
        unit_name: impl Into<String>,
        config: &Config,
        launcher: Arc<dyn Launcher>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            unit_name: unit_name.into(),
            slice: config.cgroup_slice.clone(),
            uid: config.uid,
            gid: config.gid,
            launcher,
            resolver,
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Full systemd-run command line wrapping `command`
    pub fn systemd_run_argv(
        &self,
        properties: &[String],
        command: &[String],
    ) -> Result<Vec<String>, LaunchError> {
        if command.is_empty() {
            return Err(LaunchError::Empty);
        }

        let mut argv = vec![
            self.resolver.command("systemd-run")?,
            format!("--unit={}", self.unit_name),
            format!("--slice={}", self.slice),
        ];
        argv.extend(ACCOUNTING.iter().map(|p| p.to_string()));
        if let Some(uid) = self.uid {
            argv.push(format!("--uid={}", uid));
        }
        if let Some(gid) = self.gid {
            argv.push(format!("--gid={}", gid));
        }
        argv.extend(properties.iter().cloned());
        argv.extend(command.iter().cloned());
        Ok(argv)
    }

    /// Launch `command` as the transient unit
    pub fn start(&self, properties: &[String], command: &[String]) -> Result<(), LaunchError> {
        let argv = self.systemd_run_argv(properties, command)?;
        log::info!("Starting unit {}: {}", self.unit_name, display(command));
        self.launcher.run(&argv, true)?;
        Ok(())
    }

    /// `systemctl stop <name>`
    pub fn stop_unit(&self, name: &str) -> Result<(), LaunchError> {
        let argv = vec![
            self.resolver.command("systemctl")?,
            "stop".to_string(),
            name.to_string(),
        ];
        self.launcher.run(&argv, true)?;
        Ok(())
    }

    /// `machinectl poweroff <name>`
    pub fn poweroff(&self, machine: &str) -> Result<(), LaunchError> {
        let argv = vec![
            self.resolver.command("machinectl")?,
            "poweroff".to_string(),
            machine.to_string(),
        ];
        self.launcher.run(&argv, true)?;
        Ok(())
    }

    /// Run an engine command directly, outside any unit
    pub fn call(&self, argv: &[String]) -> Result<String, LaunchError> {
        self.launcher.run(argv, true)
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("unit_name", &self.unit_name)
            .field("slice", &self.slice)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .finish_non_exhaustive()
    }
}
