//! Crate-wide error type
//!
//! Every failure keeps its kind so callers at the protocol boundary can map
//! it onto a coarser error convention without losing information.

use serde::{Deserialize, Serialize};

use crate::command::LaunchError;
use crate::descriptor::DescriptorError;
use crate::domain::DomainOp;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported runtime: {0}")]
    Unsupported(String),

    #[error("Operation not supported by this implementation: {0}")]
    UnsupportedOperation(DomainOp),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Domain not found: {0}")]
    NotFound(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Config,
    Unsupported,
    UnsupportedOperation,
    OperationFailed,
    NotFound,
    Setup,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Unsupported => "unsupported",
            Self::UnsupportedOperation => "unsupported-operation",
            Self::OperationFailed => "operation-failed",
            Self::NotFound => "not-found",
            Self::Setup => "setup",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Descriptor(_) => ErrorKind::Config,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::OperationFailed(_) | Self::Launch(_) | Self::Io(_) => ErrorKind::OperationFailed,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Setup(_) => ErrorKind::Setup,
        }
    }

    pub(crate) fn failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_wrapped_errors() {
        let launch = Error::from(LaunchError::NotFound("rkt".into()));
        assert_eq!(launch.kind(), ErrorKind::OperationFailed);

        let desc = Error::from(DescriptorError::MissingField("uuid"));
        assert_eq!(desc.kind(), ErrorKind::Config);

        let io = Error::from(std::io::Error::other("boom"));
        assert_eq!(io.kind(), ErrorKind::OperationFailed);
    }

    #[test]
    fn test_unsupported_operation_message() {
        let err = Error::UnsupportedOperation(DomainOp::Suspend);
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(err.to_string().contains("suspend"));
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not-found");
        assert_eq!(ErrorKind::Setup.as_str(), "setup");
    }
}
