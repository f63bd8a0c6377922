//! Backend that launches nothing
//!
//! Counts what it was asked to do. Used for dry runs and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::registry::RuntimeFactory;
use super::{Runtime, RuntimeContext, RuntimeCore};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

pub const NAME: &str = "fake";
const PREFIX: &str = "fake-";

/// Action counters shared by every instance of one factory
#[derive(Debug, Default)]
pub struct FakeActions {
    pub setup: AtomicUsize,
    pub teardown: AtomicUsize,
    pub configure: AtomicUsize,
    pub start: AtomicUsize,
    pub stop: AtomicUsize,
    pub resync: AtomicUsize,
}

impl FakeActions {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeRuntime {
    core: RuntimeCore,
    actions: Arc<FakeActions>,
    fail_start: bool,
}

impl FakeRuntime {
    pub fn new(uuid: &str, ctx: &RuntimeContext, actions: Arc<FakeActions>) -> Self {
        Self {
            core: RuntimeCore::new(NAME, PREFIX, uuid, ctx),
            actions,
            fail_start: false,
        }
    }

    pub fn actions(&self) -> &FakeActions {
        &self.actions
    }
}

impl Runtime for FakeRuntime {
    fn core(&self) -> &RuntimeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuntimeCore {
        &mut self.core
    }

    fn configure(&mut self, desc: &Descriptor) -> Result<()> {
        FakeActions::bump(&self.actions.configure);
        self.core.configure(desc)
    }

    fn start(&mut self, _target: Option<&str>) -> Result<()> {
        self.core.ensure_stopped()?;
        FakeActions::bump(&self.actions.start);
        if self.fail_start {
            return Err(Error::failed("fake start failure"));
        }
        let id = self.core.uuid().to_string();
        self.core.set_engine_id(Some(id));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.core.ensure_running()?;
        FakeActions::bump(&self.actions.stop);
        self.core.set_engine_id(None);
        Ok(())
    }

    fn resync(&mut self) -> Result<()> {
        FakeActions::bump(&self.actions.resync);
        let id = self.core.uuid().to_string();
        self.core.set_engine_id(Some(id));
        Ok(())
    }

    fn setup(&mut self) -> Result<()> {
        FakeActions::bump(&self.actions.setup);
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        FakeActions::bump(&self.actions.teardown);
        Ok(())
    }
}

/// Always available; all instances report into the same [`FakeActions`]
#[derive(Debug, Default)]
pub struct FakeFactory {
    actions: Arc<FakeActions>,
    fail_start: bool,
}

impl FakeFactory {
    pub fn new(actions: Arc<FakeActions>) -> Self {
        Self {
            actions,
            fail_start: false,
        }
    }

    /// Instances whose `start` fails
    pub fn failing_start(actions: Arc<FakeActions>) -> Self {
        Self {
            actions,
            fail_start: true,
        }
    }

    pub fn actions(&self) -> Arc<FakeActions> {
        self.actions.clone()
    }
}

impl RuntimeFactory for FakeFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn executable(&self) -> Option<&'static str> {
        None
    }

    fn create(&self, uuid: &str, ctx: &RuntimeContext) -> Box<dyn Runtime> {
        let mut rt = FakeRuntime::new(uuid, ctx, self.actions.clone());
        rt.fail_start = self.fail_start;
        Box::new(rt)
    }
}
