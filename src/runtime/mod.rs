//! Container engine backends
//!
//! Each backend launches its engine inside a transient systemd unit and
//! learns the engine's own identifier from a file the engine writes.
//!
//! ```text
//!              configure            start
//! Descriptor ────────────▶ RunConfig ─────▶ systemd-run ... <engine> ...
//!                                                 │
//!                                                 ▼
//!                                   <run_dir>/<uuid>.<kind>  (engine id)
//!                                                 │
//!                          stop                   ▼
//!      systemctl stop / machinectl poweroff ◀── runtime name
//! ```

mod base;
pub mod docker;
pub mod fake;
pub mod registry;
pub mod rkt;
mod run_config;
pub mod systemd;

pub use base::{RuntimeContext, RuntimeCore};
pub use registry::{builtin_factories, Registry, RuntimeFactory};
pub use run_config::{RunConfig, Volume};

use crate::descriptor::Descriptor;
use crate::error::Result;

/// One container, driven through its engine
///
/// Implementors provide `start`, `stop` and access to their [`RuntimeCore`];
/// the rest has shared behavior.
pub trait Runtime: Send {
    fn core(&self) -> &RuntimeCore;

    fn core_mut(&mut self) -> &mut RuntimeCore;

    /// Launch the container; `target` replaces the configured image
    fn start(&mut self, target: Option<&str>) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn kind(&self) -> &'static str {
        self.core().kind()
    }

    fn uuid(&self) -> &str {
        self.core().uuid()
    }

    fn unit_name(&self) -> &str {
        self.core().unit_name()
    }

    fn running(&self) -> bool {
        self.core().running()
    }

    fn run_config(&self) -> Option<&RunConfig> {
        self.core().run_config()
    }

    /// Name the supervisor knows the engine process by, once started
    fn runtime_name(&self) -> Option<String> {
        self.core().runtime_name()
    }

    fn configure(&mut self, desc: &Descriptor) -> Result<()> {
        self.core_mut().configure(desc)
    }

    /// Reattach to a container started by an earlier process
    fn resync(&mut self) -> Result<()> {
        self.core_mut().read_id()
    }

    fn setup(&mut self) -> Result<()> {
        self.core().setup()
    }

    fn teardown(&mut self) -> Result<()> {
        self.core().teardown()
    }

    /// Drop the engine identifier after the unit went away on its own
    fn detach(&mut self) {
        self.core_mut().detach()
    }
}

impl std::fmt::Debug for dyn Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("kind", &self.kind())
            .field("uuid", &self.uuid())
            .field("running", &self.running())
            .finish()
    }
}
