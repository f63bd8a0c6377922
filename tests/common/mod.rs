//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use convirt::clock::ManualClock;
use convirt::command::{FakeLauncher, Resolver};
use convirt::runtime::RuntimeFactory;
use convirt::{Config, Manager};
use tempfile::TempDir;

pub const UUID_A: &str = "d7a0005e-ee05-4e61-9fbe-d2e93d59327c";
pub const UUID_B: &str = "0f3b8c52-6a1e-4c1d-9b7e-3f0d2a9c5e11";
pub const ENGINE_ID: &str = "4e0dd2a5-0d42-4bde-a0d9-7a4c8d4cc8c3";

pub fn config(dir: &Path) -> Config {
    Config {
        run_dir: dir.join("run"),
        rkt_net_dir: dir.join("net.d"),
        use_sudo: false,
        id_read_attempts: 3,
        id_read_delay_ms: 250,
        ..Config::default()
    }
}

/// Every program the built-in backends call, pinned to fixed paths
pub fn resolver() -> Arc<Resolver> {
    Arc::new(Resolver::pinned([
        ("systemd-run", "/usr/bin/systemd-run"),
        ("systemctl", "/usr/bin/systemctl"),
        ("machinectl", "/usr/bin/machinectl"),
        ("rkt", "/usr/bin/rkt"),
        ("docker", "/usr/bin/docker"),
    ]))
}

/// Fake `systemd-run` that writes the engine identifier the way each
/// backend's engine would
pub fn launcher() -> Arc<FakeLauncher> {
    let launcher = Arc::new(FakeLauncher::new());
    launcher.on("systemd-run", |argv| {
        let save = argv.iter().find_map(|a| {
            a.strip_prefix("--uuid-file-save=")
                .or_else(|| a.strip_prefix("--cidfile="))
        });
        if let Some(path) = save {
            std::fs::write(path, ENGINE_ID).unwrap();
            return Ok(String::new());
        }
        if let Some(at) = argv.iter().position(|a| a == "convirt-sh") {
            std::fs::write(&argv[at + 2], &argv[at + 1]).unwrap();
        }
        Ok(String::new())
    });
    launcher
}

/// Fake `systemd-run` that never produces an identifier
pub fn silent_launcher() -> Arc<FakeLauncher> {
    Arc::new(FakeLauncher::new())
}

/// Make `systemctl list-units` report these rows
pub fn report_units(launcher: &FakeLauncher, rows: &str) {
    launcher.respond("systemctl", rows);
}

pub fn unit_row(uuid: &str) -> String {
    format!(
        "convirt-{}.service loaded active running convirt container\n",
        uuid
    )
}

pub fn domain_xml(uuid: &str, emulator: &str) -> String {
    format!(
        r#"<domain type="kvm">
  <name>test-{emulator}</name>
  <uuid>{uuid}</uuid>
  <maxMemory>4294967296</maxMemory>
  <devices>
    <emulator>{emulator}</emulator>
    <disk type="file" device="disk">
      <source file="/img/disk0"/>
      <target dev="vda"/>
    </disk>
  </devices>
</domain>"#
    )
}

pub struct Harness {
    pub dir: TempDir,
    pub launcher: Arc<FakeLauncher>,
    pub clock: Arc<ManualClock>,
    pub manager: Manager,
}

impl Harness {
    pub fn builtin() -> Self {
        Self::with(launcher(), None)
    }

    pub fn with(launcher: Arc<FakeLauncher>, factories: Option<Vec<Arc<dyn RuntimeFactory>>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut builder = Manager::builder(config(dir.path()))
            .launcher(launcher.clone())
            .resolver(resolver())
            .clock(clock.clone());
        if let Some(factories) = factories {
            builder = builder.factories(factories);
        }
        Self {
            manager: builder.build(),
            dir,
            launcher,
            clock,
        }
    }

    pub fn uuids(&self) -> Vec<String> {
        self.manager
            .list()
            .iter()
            .map(|d| d.uuid().to_string())
            .collect()
    }
}
