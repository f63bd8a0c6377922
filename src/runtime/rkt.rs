//! rkt backend
//!
//! rkt saves the pod UUID with `--uuid-file-save`; the pod registers with
//! machined as `rkt-<pod uuid>`, which is how it is powered off.
//!
//! The host bridge is described to rkt by a CNI network file installed once
//! per host in `setup_runtime`.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Serialize;

use super::registry::RuntimeFactory;
use super::{Runtime, RuntimeContext, RuntimeCore};
use crate::config::{Config, NetworkConfig};
use crate::error::Result;

pub const NAME: &str = "rkt";
const PREFIX: &str = "rkt-";

pub struct RktRuntime {
    core: RuntimeCore,
}

impl RktRuntime {
    pub fn new(uuid: &str, ctx: &RuntimeContext) -> Self {
        Self {
            core: RuntimeCore::new(NAME, PREFIX, uuid, ctx),
        }
    }

    fn command(&self, target: Option<&str>) -> Result<Vec<String>> {
        let image = self.core.image(target)?;
        let conf = self.core.require_run_config()?;

        let mut argv = vec![
            self.core.resolver().command("rkt")?,
            format!("--uuid-file-save={}", self.core.id_path().display()),
            "--insecure-options=image".to_string(),
            "run".to_string(),
        ];
        if let Some(net) = &conf.network {
            argv.push(format!("--net={}", net));
        }
        for vol in &conf.volumes {
            argv.push(format!("--volume={},kind=host,source={}", vol.name, vol.source));
        }
        argv.push(format!("--memory={}M", conf.memory_size_mib));
        argv.push(image.to_string());
        Ok(argv)
    }
}

impl Runtime for RktRuntime {
    fn core(&self) -> &RuntimeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuntimeCore {
        &mut self.core
    }

    fn start(&mut self, target: Option<&str>) -> Result<()> {
        self.core.ensure_stopped()?;
        let command = self.command(target)?;
        self.core.prepare_artifact()?;
        self.core.runner().start(&[], &command)?;
        self.core.read_launched_id()
    }

    fn stop(&mut self) -> Result<()> {
        self.core.ensure_running()?;
        if let Some(name) = self.runtime_name() {
            self.core.runner().poweroff(&name)?;
        }
        self.core.forget();
        Ok(())
    }
}

/// CNI bridge network definition, as read by rkt
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CniNetwork<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    bridge: &'a str,
    is_gateway: bool,
    ip_masq: bool,
    ipam: Ipam,
}

#[derive(Debug, Serialize)]
struct Ipam {
    #[serde(rename = "type")]
    kind: &'static str,
    subnet: String,
}

fn cni_network(net: &NetworkConfig) -> CniNetwork<'_> {
    CniNetwork {
        name: &net.name,
        kind: "bridge",
        bridge: &net.bridge,
        is_gateway: true,
        ip_masq: true,
        ipam: Ipam {
            kind: "host-local",
            subnet: format!("{}/{}", net.subnet, net.mask),
        },
    }
}

/// `<rkt_net_dir>/50-<network name>.conf`
pub fn network_file(config: &Config) -> PathBuf {
    config
        .rkt_net_dir
        .join(format!("50-{}.conf", config.network.name))
}

pub struct RktFactory;

impl RuntimeFactory for RktFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn executable(&self) -> Option<&'static str> {
        Some("rkt")
    }

    fn create(&self, uuid: &str, ctx: &RuntimeContext) -> Box<dyn Runtime> {
        Box::new(RktRuntime::new(uuid, ctx))
    }

    fn setup_runtime(&self, config: &Config) -> Result<()> {
        let path = network_file(config);
        let body = serde_json::to_string_pretty(&cni_network(&config.network))
            .map_err(std::io::Error::other)?;
        std::fs::create_dir_all(&config.rkt_net_dir)?;
        std::fs::write(&path, body + "\n")?;
        log::info!("Installed rkt network {}", path.display());
        Ok(())
    }

    fn teardown_runtime(&self, config: &Config) -> Result<()> {
        let path = network_file(config);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("{} already removed", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::{FakeLauncher, Resolver};
    use crate::descriptor::Descriptor;
    use crate::error::Error;
    use std::sync::Arc;

    const UUID: &str = "d7a0005e-ee05-4e61-9fbe-d2e93d59327c";
    const POD: &str = "4e0dd2a5-0d42-4bde-a0d9-7a4c8d4cc8c3";

    fn resolver() -> Arc<Resolver> {
        Arc::new(Resolver::pinned([
            ("systemd-run", "/usr/bin/systemd-run"),
            ("machinectl", "/usr/bin/machinectl"),
            ("rkt", "/usr/bin/rkt"),
        ]))
    }

    fn launcher() -> Arc<FakeLauncher> {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.on("systemd-run", |argv| {
            let path = argv
                .iter()
                .find_map(|a| a.strip_prefix("--uuid-file-save="))
                .unwrap();
            std::fs::write(path, POD).unwrap();
            Ok(String::new())
        });
        launcher
    }

    fn context(config: Config, launcher: Arc<FakeLauncher>) -> RuntimeContext {
        RuntimeContext {
            config: Arc::new(config),
            launcher,
            resolver: resolver(),
            clock: Arc::new(ManualClock::new()),
        }
    }

    fn descriptor() -> Descriptor {
        Descriptor::parse(&format!(
            r#"<domain>
              <uuid>{UUID}</uuid>
              <maxMemory unit="KiB">262144</maxMemory>
              <metadata><drivemap><volume name="data" drive="vdb"/></drivemap></metadata>
              <devices>
                <emulator>rkt</emulator>
                <disk type="file" device="disk"><source file="/img/app.aci"/><target dev="vda"/></disk>
                <disk type="file" device="disk"><source file="/srv/data"/><target dev="vdb"/></disk>
                <interface type="bridge"><source bridge="convirt-net"/><link state="up"/></interface>
              </devices>
            </domain>"#
        ))
        .unwrap()
    }

    #[test]
    fn test_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher();
        let config = Config {
            run_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let mut rt = RktRuntime::new(UUID, &context(config, launcher.clone()));
        rt.configure(&descriptor()).unwrap();
        rt.start(None).unwrap();

        let run = &launcher.executions()[0];
        let rkt = run.iter().position(|a| a == "/usr/bin/rkt").unwrap();
        assert_eq!(
            &run[rkt..],
            [
                "/usr/bin/rkt".to_string(),
                format!("--uuid-file-save={}/{}.rkt", dir.path().display(), UUID),
                "--insecure-options=image".to_string(),
                "run".to_string(),
                "--net=convirt-net".to_string(),
                "--volume=data,kind=host,source=/srv/data".to_string(),
                "--memory=256M".to_string(),
                "/img/app.aci".to_string(),
            ]
        );
        assert_eq!(rt.runtime_name(), Some(format!("rkt-{}", POD)));
    }

    #[test]
    fn test_stop_powers_off_pod() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher();
        let config = Config {
            run_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let mut rt = RktRuntime::new(UUID, &context(config, launcher.clone()));
        rt.configure(&descriptor()).unwrap();
        rt.start(None).unwrap();
        rt.stop().unwrap();

        assert!(!rt.running());
        assert!(rt.runtime_name().is_none());
        assert_eq!(
            launcher.executions()[1],
            vec![
                "/usr/bin/machinectl".to_string(),
                "poweroff".to_string(),
                format!("rkt-{}", POD),
            ]
        );
        assert!(matches!(rt.stop(), Err(Error::OperationFailed(_))));
    }

    #[test]
    fn test_failed_poweroff_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher();
        launcher.fail("machinectl");
        let config = Config {
            run_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let mut rt = RktRuntime::new(UUID, &context(config, launcher));
        rt.configure(&descriptor()).unwrap();
        rt.start(None).unwrap();

        assert!(matches!(rt.stop(), Err(Error::Launch(_))));
        assert!(rt.running());
    }

    #[test]
    fn test_network_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            rkt_net_dir: dir.path().join("net.d"),
            ..Config::default()
        };
        let factory = RktFactory;
        factory.setup_runtime(&config).unwrap();

        let path = network_file(&config);
        assert!(path.ends_with("50-convirt-net.conf"));
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["name"], "convirt-net");
        assert_eq!(value["type"], "bridge");
        assert_eq!(value["bridge"], "convirt");
        assert_eq!(value["isGateway"], true);
        assert_eq!(value["ipam"]["subnet"], "10.1.0.0/16");

        factory.teardown_runtime(&config).unwrap();
        assert!(!path.exists());
        // Second teardown only warns
        factory.teardown_runtime(&config).unwrap();
    }
}
