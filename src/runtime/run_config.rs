//! Run configuration derived from a descriptor

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

/// Everything an engine needs to launch one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub image_path: String,
    pub memory_size_mib: u64,
    /// Host bridge to attach to, if any
    pub network: Option<String>,
    /// Volume name to guest drive, as declared
    pub drive_map: BTreeMap<String, String>,
    /// Drive map entries resolved to host paths
    pub volumes: Vec<Volume>,
}

/// A named host path exposed to the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub source: String,
}

impl RunConfig {
    /// Extract the run configuration
    ///
    /// `net_fallback` decides what a bridge interface without a usable source
    /// or link means: no network (true) or a configuration error (false).
    pub fn from_descriptor(desc: &Descriptor, net_fallback: bool) -> Result<Self> {
        let memory_size_mib = desc
            .memory_mib()?
            .ok_or_else(|| Error::Config("memory".to_string()))?;
        let image_path = find_image(desc)?;
        let network = find_network(desc, net_fallback)?;
        let volumes = resolve_volumes(desc);

        log::debug!(
            "Domain {}: image={} memory={}MiB network={:?}",
            desc.uuid(),
            image_path,
            memory_size_mib,
            network
        );

        Ok(Self {
            image_path,
            memory_size_mib,
            network,
            drive_map: desc.drive_map().clone(),
            volumes,
        })
    }
}

fn find_image(desc: &Descriptor) -> Result<String> {
    let mut images = desc
        .disks()
        .iter()
        .filter(|d| d.is_image())
        .filter_map(|d| d.source_file.as_deref());

    let first = images
        .next()
        .ok_or_else(|| Error::Config("image path not found".to_string()))?;
    let extra = images.count();
    if extra > 0 {
        log::warn!(
            "Domain {} declares {} disk images, using {}",
            desc.uuid(),
            extra + 1,
            first
        );
    }
    Ok(first.trim_matches('"').to_string())
}

fn find_network(desc: &Descriptor, net_fallback: bool) -> Result<Option<String>> {
    let mut bridges = desc.interfaces().iter().filter(|i| i.is_bridge()).peekable();
    if bridges.peek().is_none() {
        return Ok(None);
    }

    let found = bridges
        .filter(|i| i.is_up())
        .find_map(|i| i.source_bridge.as_deref())
        .map(|b| b.trim_matches('"').to_string());

    match found {
        Some(bridge) => Ok(Some(bridge)),
        None if net_fallback => {
            log::debug!("Domain {}: no usable bridge, running without network", desc.uuid());
            Ok(None)
        }
        None => Err(Error::Config("network settings not found".to_string())),
    }
}

fn resolve_volumes(desc: &Descriptor) -> Vec<Volume> {
    desc.drive_map()
        .iter()
        .filter_map(|(name, drive)| {
            let source = desc
                .disks()
                .iter()
                .find(|d| d.target_dev.as_deref() == Some(drive.as_str()))
                .and_then(|d| d.source_file.clone())
                .filter(|s| !s.is_empty());
            if source.is_none() {
                log::warn!(
                    "Domain {}: volume {} maps to unknown drive {}",
                    desc.uuid(),
                    name,
                    drive
                );
            }
            source.map(|source| Volume {
                name: name.clone(),
                source: source.trim_matches('"').to_string(),
            })
        })
        .collect()
}
