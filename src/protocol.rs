//! IPC protocol for convirtd
//!
//! Defines request/response types for convirtctl ↔ daemon communication,
//! and the daemon-side dispatch onto a [`Manager`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainInfo, DomainOp, Outcome};
use crate::error::{Error, ErrorKind};
use crate::manager::Manager;

pub const SOCKET_PATH: &str = "/run/convirt.sock";

/// Socket of the system daemon, or of the per-user one
pub fn socket_path(user: bool) -> String {
    if !user {
        return SOCKET_PATH.to_string();
    }
    match dirs::runtime_dir() {
        Some(dir) => dir.join("convirt.sock").to_string_lossy().into_owned(),
        None => format!("/run/user/{}/convirt.sock", nix::unistd::getuid()),
    }
}

/// Request from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Create and start a domain from its XML
    Create { xml: String },
    /// Stop and forget a domain
    Destroy { uuid: String },
    /// Restart a domain
    Reset { uuid: String },
    /// Get the domain XML
    Describe { uuid: String },
    /// Get domain status
    Status { uuid: String },
    /// Any other named domain operation
    Call { uuid: String, op: DomainOp },
    /// List live domains
    List,
    /// Reattach to running units
    Recover,
    /// Runtime kinds usable on this host
    Supported,
    /// Ping (health check)
    Ping,
}

/// Response from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Success with no data
    Ok,
    /// Single domain status
    Domain(DomainInfo),
    /// Status of several domains
    Domains(Vec<DomainInfo>),
    /// Domain XML
    Xml(String),
    /// Runtime kinds
    Runtimes(Vec<String>),
    /// Error with its kind
    Error { kind: ErrorKind, message: String },
    /// Pong (response to ping)
    Pong,
}

impl From<Error> for Response {
    fn from(e: Error) -> Self {
        Response::Error {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Response::Ok,
            Outcome::Xml(xml) => Response::Xml(xml),
            Outcome::Info(info) => Response::Domain(info),
        }
    }
}

fn reply<T>(result: crate::Result<T>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => {
            log::warn!("Request failed: {}", e);
            e.into()
        }
    }
}

/// Run one request against the manager
///
/// Blocks on backend commands; call from a thread that may block.
pub fn dispatch(manager: &Manager, request: Request) -> Response {
    log::debug!("Handling {:?}", request);
    match request {
        Request::Ping => Response::Pong,

        Request::Create { xml } => reply(manager.create(&xml), |dom| match dom.status() {
            Ok(info) => Response::Domain(info),
            Err(e) => e.into(),
        }),

        Request::Destroy { uuid } => reply(manager.destroy(&uuid), |()| Response::Ok),

        Request::Reset { uuid } => reply(manager.reset(&uuid), |()| Response::Ok),

        Request::Describe { uuid } => reply(
            manager.lookup(&uuid).and_then(|dom| dom.describe()),
            Response::Xml,
        ),

        Request::Status { uuid } => reply(
            manager.lookup(&uuid).and_then(|dom| dom.status()),
            Response::Domain,
        ),

        Request::Call { uuid, op } => reply(manager.call(&uuid, op), Response::from),

        Request::List => Response::Domains(
            manager
                .list()
                .iter()
                .filter_map(|dom| dom.status().ok())
                .collect(),
        ),

        Request::Recover => reply(manager.recover_all(), |doms| {
            Response::Domains(doms.iter().filter_map(|dom| dom.status().ok()).collect())
        }),

        Request::Supported => Response::Runtimes(manager.supported().into_iter().collect()),
    }
}

/// [`dispatch`] on tokio's blocking pool
pub async fn handle_request(manager: Arc<Manager>, request: Request) -> Response {
    match tokio::task::spawn_blocking(move || dispatch(&manager, request)).await {
        Ok(response) => response,
        Err(e) => {
            log::error!("Request handler panicked: {}", e);
            Response::Error {
                kind: ErrorKind::OperationFailed,
                message: "internal error".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::{FakeLauncher, Resolver};
    use crate::config::Config;
    use crate::runtime::fake::FakeFactory;

    const UUID: &str = "d7a0005e-ee05-4e61-9fbe-d2e93d59327c";

    fn manager(dir: &std::path::Path) -> Manager {
        Manager::builder(Config {
            run_dir: dir.to_path_buf(),
            ..Config::default()
        })
        .launcher(Arc::new(FakeLauncher::new()))
        .resolver(Arc::new(Resolver::new(Vec::new())))
        .clock(Arc::new(ManualClock::new()))
        .factories(vec![Arc::new(FakeFactory::default())])
        .build()
    }

    fn xml() -> String {
        format!(
            r#"<domain><uuid>{UUID}</uuid><maxMemory unit="MiB">32</maxMemory>
            <devices><emulator>fake</emulator>
            <disk type="file" device="disk"><source file="/img/disk0"/></disk></devices></domain>"#
        )
    }

    #[test]
    fn request_roundtrip() {
        let requests = vec![
            Request::Create { xml: xml() },
            Request::Destroy { uuid: UUID.into() },
            Request::Call {
                uuid: UUID.into(),
                op: DomainOp::Suspend,
            },
            Request::List,
            Request::Ping,
        ];

        for req in requests {
            let encoded = rmp_serde::to_vec(&req).unwrap();
            let decoded: Request = rmp_serde::from_slice(&encoded).unwrap();
            assert_eq!(format!("{:?}", req), format!("{:?}", decoded));
        }
    }

    #[test]
    fn response_roundtrip() {
        let responses = vec![
            Response::Ok,
            Response::Error {
                kind: ErrorKind::NotFound,
                message: "test error".into(),
            },
            Response::Runtimes(vec!["rkt".into(), "docker".into()]),
            Response::Pong,
        ];

        for resp in responses {
            let encoded = rmp_serde::to_vec(&resp).unwrap();
            let decoded: Response = rmp_serde::from_slice(&encoded).unwrap();
            assert_eq!(format!("{:?}", resp), format!("{:?}", decoded));
        }
    }

    #[test]
    fn test_socket_path_system() {
        assert_eq!(socket_path(false), SOCKET_PATH);
        assert!(socket_path(true).ends_with("convirt.sock"));
    }

    #[test]
    fn test_dispatch_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());

        match dispatch(&m, Request::Create { xml: xml() }) {
            Response::Domain(info) => {
                assert_eq!(info.uuid, UUID);
                assert_eq!(info.kind, "fake");
            }
            other => panic!("unexpected response: {:?}", other),
        }

        assert!(matches!(
            dispatch(&m, Request::Describe { uuid: UUID.into() }),
            Response::Xml(ref x) if *x == xml()
        ));
        assert!(matches!(dispatch(&m, Request::List), Response::Domains(ref d) if d.len() == 1));
        assert!(matches!(
            dispatch(
                &m,
                Request::Call {
                    uuid: UUID.into(),
                    op: DomainOp::Suspend
                }
            ),
            Response::Error {
                kind: ErrorKind::UnsupportedOperation,
                ..
            }
        ));
        assert!(matches!(
            dispatch(&m, Request::Destroy { uuid: UUID.into() }),
            Response::Ok
        ));
        assert!(matches!(
            dispatch(&m, Request::Destroy { uuid: UUID.into() }),
            Response::Error {
                kind: ErrorKind::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_dispatch_bad_xml() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        assert!(matches!(
            dispatch(&m, Request::Create { xml: "<domain>".into() }),
            Response::Error {
                kind: ErrorKind::Config,
                ..
            }
        ));
        assert!(matches!(
            dispatch(&m, Request::Supported),
            Response::Runtimes(ref r) if r == &["fake".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_handle_request_off_thread() {
        let dir = tempfile::tempdir().unwrap();
        let m = Arc::new(manager(dir.path()));
        assert!(matches!(
            handle_request(m.clone(), Request::Ping).await,
            Response::Pong
        ));
        assert!(matches!(
            handle_request(m, Request::Create { xml: xml() }).await,
            Response::Domain(_)
        ));
    }
}
