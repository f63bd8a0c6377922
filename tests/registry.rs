//! Runtime discovery and host-wide setup

mod common;

use std::sync::Arc;

use common::*;
use convirt::command::Resolver;
use convirt::runtime::{rkt, Registry};
use convirt::Error;

#[test]
fn test_supported_follows_installed_executables() {
    let registry = Registry::new(Arc::new(Resolver::pinned([
        ("systemd-run", "/usr/bin/systemd-run"),
        ("docker", "/usr/bin/docker"),
    ])));
    let supported: Vec<_> = registry.supported().into_iter().collect();
    assert_eq!(supported, vec!["docker".to_string(), "systemd".to_string()]);
    assert!(matches!(registry.factory("rkt"), Err(Error::Unsupported(_))));
}

#[test]
fn test_setup_writes_rkt_network() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let registry = Registry::new(resolver());

    registry.setup(&config).unwrap();
    assert!(registry.is_ready());

    let path = rkt::network_file(&config);
    let net: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(net["type"], "bridge");
    assert_eq!(net["bridge"], config.network.bridge.as_str());
    assert_eq!(net["ipam"]["subnet"], "10.1.0.0/16");

    assert!(matches!(registry.setup(&config), Err(Error::Setup(_))));

    registry.teardown(&config).unwrap();
    assert!(!registry.is_ready());
    assert!(!path.exists());
    assert!(matches!(registry.teardown(&config), Err(Error::Setup(_))));
}

#[test]
fn test_no_network_file_without_rkt() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let registry = Registry::new(Arc::new(Resolver::pinned([(
        "systemd-run",
        "/usr/bin/systemd-run",
    )])));

    registry.setup(&config).unwrap();
    assert!(!rkt::network_file(&config).exists());
}
