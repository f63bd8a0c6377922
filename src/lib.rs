//! convirt - containers dressed up as virtual machines
//!
//! A Rust implementation that:
//! - Parses libvirt-style domain XML into a container run configuration
//! - Launches rkt, docker or plain commands as transient systemd units
//! - Reattaches to still-running units after the managing process restarts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    Manager                       │
//! ├─────────────────────────────────────────────────┤
//! │  Domain lifecycle  │  Directory  │  Events       │
//! ├─────────────────────────────────────────────────┤
//! │  Runtime registry  │  systemd / rkt / docker     │
//! ├─────────────────────────────────────────────────┤
//! │  Runner (systemd-run)  │  Unit discovery         │
//! ├─────────────────────────────────────────────────┤
//! │               Process launcher                   │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod clock;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod domain;
pub mod error;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod runner;
pub mod runtime;
pub mod units;

pub use config::Config;
pub use descriptor::Descriptor;
pub use domain::{Domain, DomainInfo, DomainOp, DomainState};
pub use error::{Error, ErrorKind, Result};
pub use manager::Manager;
pub use runtime::{RunConfig, Runtime};
