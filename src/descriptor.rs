//! Domain descriptor
//!
//! A libvirt-style domain XML document, parsed once. Only the elements the
//! container runtimes consume are modelled; everything else is ignored.
//!
//! ```xml
//! <domain type="kvm">
//!   <uuid>d7a0005e-ee05-4e61-9fbe-d2e93d59327c</uuid>
//!   <maxMemory slots="16" unit="KiB">4194304</maxMemory>
//!   <metadata>
//!     <drivemap>
//!       <volume name="data" drive="vdb"/>
//!     </drivemap>
//!   </metadata>
//!   <devices>
//!     <emulator>rkt</emulator>
//!     <disk type="file" device="disk">
//!       <source file="/img/disk0"/>
//!       <target dev="vda"/>
//!     </disk>
//!     <interface type="bridge">
//!       <source bridge="convirt"/>
//!       <link state="up"/>
//!     </interface>
//!   </devices>
//! </domain>
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Malformed domain XML: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    #[error("Missing element: {0}")]
    MissingField(&'static str),

    #[error("Invalid UUID: {0:?}")]
    InvalidUuid(String),

    #[error("Invalid memory value: {0:?}")]
    InvalidMemory(String),

    #[error("Unknown memory unit: {0:?}")]
    UnknownUnit(String),
}

// Raw serde mirror of the XML

#[derive(Debug, Default, Deserialize)]
struct DomainXml {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "maxMemory", default)]
    max_memory: Option<MemoryXml>,
    #[serde(default)]
    metadata: Option<MetadataXml>,
    #[serde(default)]
    devices: Option<DevicesXml>,
}

#[derive(Debug, Deserialize)]
struct MemoryXml {
    #[serde(rename = "@unit", default)]
    unit: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataXml {
    #[serde(default)]
    drivemap: Option<DriveMapXml>,
}

#[derive(Debug, Default, Deserialize)]
struct DriveMapXml {
    #[serde(rename = "volume", default)]
    volumes: Vec<VolumeXml>,
}

#[derive(Debug, Deserialize)]
struct VolumeXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@drive")]
    drive: String,
}

#[derive(Debug, Default, Deserialize)]
struct DevicesXml {
    #[serde(default)]
    emulator: Option<String>,
    #[serde(rename = "disk", default)]
    disks: Vec<DiskXml>,
    #[serde(rename = "interface", default)]
    interfaces: Vec<InterfaceXml>,
}

#[derive(Debug, Deserialize)]
struct DiskXml {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@device", default)]
    device: String,
    #[serde(default)]
    source: Option<SourceXml>,
    #[serde(default)]
    target: Option<TargetXml>,
}

#[derive(Debug, Deserialize)]
struct SourceXml {
    #[serde(rename = "@file", default)]
    file: Option<String>,
    #[serde(rename = "@bridge", default)]
    bridge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetXml {
    #[serde(rename = "@dev", default)]
    dev: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InterfaceXml {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(default)]
    source: Option<SourceXml>,
    #[serde(default)]
    link: Option<LinkXml>,
}

#[derive(Debug, Deserialize)]
struct LinkXml {
    #[serde(rename = "@state", default)]
    state: Option<String>,
}

/// A `<disk>` device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    /// `type` attribute (`file`, `block`, ...)
    pub kind: String,
    /// `device` attribute (`disk`, `cdrom`, ...)
    pub device: String,
    pub source_file: Option<String>,
    pub target_dev: Option<String>,
}

impl Disk {
    /// A file-backed disk with a usable source
    pub fn is_image(&self) -> bool {
        self.kind == "file"
            && self.device == "disk"
            && self.source_file.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// An `<interface>` device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub kind: String,
    pub source_bridge: Option<String>,
    pub link_state: Option<String>,
}

impl Interface {
    pub fn is_bridge(&self) -> bool {
        self.kind == "bridge"
    }

    pub fn is_up(&self) -> bool {
        self.link_state.as_deref() == Some("up")
    }
}

/// Memory ceiling as written, before unit conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    pub value: String,
    pub unit: Option<String>,
}

impl Memory {
    /// Size in whole MiB
    ///
    /// Without a `unit` attribute the value is taken as bytes.
    pub fn to_mib(&self) -> Result<u64, DescriptorError> {
        let value: u64 = self
            .value
            .trim()
            .parse()
            .map_err(|_| DescriptorError::InvalidMemory(self.value.clone()))?;
        let scale = match self.unit.as_deref() {
            None => 1,
            Some(unit) => unit_scale(unit).ok_or_else(|| DescriptorError::UnknownUnit(unit.to_string()))?,
        };
        let bytes = value
            .checked_mul(scale)
            .ok_or_else(|| DescriptorError::InvalidMemory(self.value.clone()))?;
        Ok(bytes / MIB)
    }
}

fn unit_scale(unit: &str) -> Option<u64> {
    let scale = match unit {
        "b" | "bytes" => 1,
        "KB" => 1_000,
        "k" | "KiB" => 1 << 10,
        "MB" => 1_000_000,
        "M" | "MiB" => 1 << 20,
        "GB" => 1_000_000_000,
        "G" | "GiB" => 1 << 30,
        "TB" => 1_000_000_000_000,
        "T" | "TiB" => 1 << 40,
        _ => return None,
    };
    Some(scale)
}

/// Parsed domain descriptor, keeping the source text
#[derive(Debug, Clone)]
pub struct Descriptor {
    xml: String,
    uuid: String,
    name: Option<String>,
    emulator: Option<String>,
    memory: Option<Memory>,
    disks: Vec<Disk>,
    interfaces: Vec<Interface>,
    drive_map: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn parse(xml: &str) -> Result<Self, DescriptorError> {
        let raw: DomainXml = quick_xml::de::from_str(xml)?;

        let uuid = raw
            .uuid
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(DescriptorError::MissingField("uuid"))?;
        if uuid::Uuid::parse_str(&uuid).is_err() {
            return Err(DescriptorError::InvalidUuid(uuid));
        }

        let devices = raw.devices.unwrap_or_default();

        let disks = devices
            .disks
            .into_iter()
            .map(|d| Disk {
                kind: d.kind,
                device: d.device,
                source_file: d.source.and_then(|s| s.file),
                target_dev: d.target.and_then(|t| t.dev),
            })
            .collect();

        let interfaces = devices
            .interfaces
            .into_iter()
            .map(|i| Interface {
                kind: i.kind,
                source_bridge: i.source.and_then(|s| s.bridge),
                link_state: i.link.and_then(|l| l.state),
            })
            .collect();

        let drive_map = raw
            .metadata
            .and_then(|m| m.drivemap)
            .map(|dm| {
                dm.volumes
                    .into_iter()
                    .map(|v| (v.name, v.drive))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            xml: xml.to_string(),
            uuid,
            name: raw.name.map(|n| n.trim().to_string()),
            emulator: devices
                .emulator
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            memory: raw.max_memory.map(|m| Memory {
                value: m.value,
                unit: m.unit,
            }),
            disks,
            interfaces,
            drive_map,
        })
    }

    /// Source text, as given to [`Descriptor::parse`]
    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Runtime kind, carried in `<devices><emulator>`
    pub fn emulator(&self) -> Option<&str> {
        self.emulator.as_deref()
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    /// `None` when no `<maxMemory>` is declared
    pub fn memory_mib(&self) -> Result<Option<u64>, DescriptorError> {
        self.memory.as_ref().map(Memory::to_mib).transpose()
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Volume name to guest drive (`<target dev>`) mapping
    pub fn drive_map(&self) -> &BTreeMap<String, String> {
        &self.drive_map
    }
}

impl std::str::FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
