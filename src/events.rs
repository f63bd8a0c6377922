//! Domain lifecycle events
//!
//! Callbacks are registered per event kind and invoked synchronously on the
//! thread that fired the event, outside the registry lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Started,
    Stopped,
    Recovered,
    Destroyed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Recovered => "recovered",
            Self::Destroyed => "destroyed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub uuid: String,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, uuid: &str) -> Self {
        Self {
            kind,
            uuid: uuid.to_string(),
            at: Utc::now(),
        }
    }
}

pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
pub struct Handler {
    callbacks: Mutex<HashMap<EventKind, Vec<Callback>>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        log::debug!("Registered callback for {} events", kind.as_str());
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));
    }

    fn callbacks(&self, kind: EventKind) -> Vec<Callback> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Deliver `event` to its callbacks, returning how many ran
    pub fn fire(&self, event: Event) -> usize {
        let callbacks = self.callbacks(event.kind);
        if callbacks.is_empty() {
            log::warn!("Unhandled {} event for {}", event.kind.as_str(), event.uuid);
            return 0;
        }
        log::debug!("Firing {} event for {}", event.kind.as_str(), event.uuid);
        for callback in &callbacks {
            callback(&event);
        }
        callbacks.len()
    }

    /// Kinds with at least one callback
    pub fn registered(&self) -> Vec<EventKind> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, cbs)| !cbs.is_empty())
            .map(|(kind, _)| *kind)
            .collect()
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("registered", &self.registered())
            .finish()
    }
}
