//! Per-domain operations
//!
//! The virtualization API has many more domain calls than a container can
//! honor. They are all listed here so an unsupported call is rejected by
//! name rather than silently ignored.

use serde::{Deserialize, Serialize};

use super::DomainInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainOp {
    Destroy,
    Reset,
    Describe,
    Status,

    Suspend,
    Resume,
    Shutdown,
    Reboot,
    Undefine,
    SetMemory,
    SetVcpus,
    BlockInfo,
    SetTime,
    Info,
    MigrateToUri,
    AttachDevice,
    DetachDevice,
    Snapshot,
}

impl DomainOp {
    pub const ALL: [DomainOp; 18] = [
        Self::Destroy,
        Self::Reset,
        Self::Describe,
        Self::Status,
        Self::Suspend,
        Self::Resume,
        Self::Shutdown,
        Self::Reboot,
        Self::Undefine,
        Self::SetMemory,
        Self::SetVcpus,
        Self::BlockInfo,
        Self::SetTime,
        Self::Info,
        Self::MigrateToUri,
        Self::AttachDevice,
        Self::DetachDevice,
        Self::Snapshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::Reset => "reset",
            Self::Describe => "describe",
            Self::Status => "status",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Shutdown => "shutdown",
            Self::Reboot => "reboot",
            Self::Undefine => "undefine",
            Self::SetMemory => "set-memory",
            Self::SetVcpus => "set-vcpus",
            Self::BlockInfo => "block-info",
            Self::SetTime => "set-time",
            Self::Info => "info",
            Self::MigrateToUri => "migrate-to-uri",
            Self::AttachDevice => "attach-device",
            Self::DetachDevice => "detach-device",
            Self::Snapshot => "snapshot",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::Destroy | Self::Reset | Self::Describe | Self::Status
        )
    }
}

impl std::fmt::Display for DomainOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown domain operation: {}", s))
    }
}

/// Result of a supported operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Done,
    Xml(String),
    Info(DomainInfo),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for op in DomainOp::ALL {
            assert_eq!(op.as_str().parse::<DomainOp>().unwrap(), op);
        }
        assert!("hibernate".parse::<DomainOp>().is_err());
    }

    #[test]
    fn test_supported_subset() {
        let supported: Vec<_> = DomainOp::ALL.iter().filter(|op| op.is_supported()).collect();
        assert_eq!(supported.len(), 4);
        assert!(!DomainOp::Suspend.is_supported());
        assert_eq!(DomainOp::Suspend.to_string(), "suspend");
    }
}
