//! Daemon configuration
//!
//! Loaded from a YAML file. Every field has a default, so a missing file or
//! a partial one is fine.
//!
//! ```yaml
//! run_dir: /run/convirt
//! cgroup_slice: convirt
//! use_sudo: false
//! net_fallback: true
//! network:
//!   bridge: convirt
//!   subnet: 10.1.0.0
//!   mask: 16
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/convirt/convirt.yaml";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to parse {0}: {1}")]
    Yaml(PathBuf, serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run containers as this user (systemd-run --uid=)
    pub uid: Option<u32>,
    /// Run containers as this group (systemd-run --gid=)
    pub gid: Option<u32>,
    /// Identifier artifacts and cached descriptors live here
    pub run_dir: PathBuf,
    /// Prefix privileged commands with sudo when not already root
    pub use_sudo: bool,
    /// Slice the transient units are placed in
    pub cgroup_slice: String,
    /// Treat a malformed bridge declaration as "no network" instead of an error
    pub net_fallback: bool,
    pub id_read_attempts: u32,
    pub id_read_delay_ms: u64,
    pub watchdog_interval_secs: u64,
    /// Overrides $PATH for executable lookup
    pub search_path: Option<Vec<PathBuf>>,
    pub network: NetworkConfig,
    /// Where the rkt runtime drops its CNI network file
    pub rkt_net_dir: PathBuf,
}

/// Host bridge shared by container runtimes that need one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub name: String,
    pub bridge: String,
    pub subnet: String,
    pub mask: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "convirt-net".to_string(),
            bridge: "convirt".to_string(),
            subnet: "10.1.0.0".to_string(),
            mask: 16,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uid: None,
            gid: None,
            run_dir: PathBuf::from("/run/convirt"),
            use_sudo: true,
            cgroup_slice: "convirt".to_string(),
            net_fallback: true,
            id_read_attempts: 10,
            id_read_delay_ms: 1000,
            watchdog_interval_secs: 5,
            search_path: None,
            network: NetworkConfig::default(),
            rkt_net_dir: PathBuf::from("/etc/rkt/net.d"),
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to an empty map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| LoadError::Io(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| LoadError::Yaml(path.to_path_buf(), e))
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn id_read_delay(&self) -> Duration {
        Duration::from_millis(self.id_read_delay_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let conf = Config::default();
        assert_eq!(conf.run_dir, PathBuf::from("/run/convirt"));
        assert_eq!(conf.cgroup_slice, "convirt");
        assert!(conf.use_sudo);
        assert!(conf.net_fallback);
        assert_eq!(conf.id_read_attempts, 10);
        assert_eq!(conf.id_read_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_yaml() {
        let conf = Config::from_yaml(
            r#"
run_dir: /tmp/convirt
uid: 1764
net_fallback: false
network:
  bridge: br0
"#,
        )
        .unwrap();
        assert_eq!(conf.run_dir, PathBuf::from("/tmp/convirt"));
        assert_eq!(conf.uid, Some(1764));
        assert!(conf.gid.is_none());
        assert!(!conf.net_fallback);
        assert_eq!(conf.network.bridge, "br0");
        assert_eq!(conf.network.mask, 16);
        assert_eq!(conf.cgroup_slice, "convirt");
    }

    #[test]
    fn test_empty_yaml() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_bad_yaml() {
        assert!(Config::from_yaml("uid: [not a number").is_err());
    }

    #[test]
    fn test_load_or_default_missing() {
        let conf = Config::load_or_default(Path::new("/nonexistent/convirt.yaml")).unwrap();
        assert_eq!(conf, Config::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convirt.yaml");
        std::fs::write(&path, "cgroup_slice: machine\n").unwrap();
        let conf = Config::load(&path).unwrap();
        assert_eq!(conf.cgroup_slice, "machine");
    }
}
