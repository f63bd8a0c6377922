//! systemd unit state vocabulary
//!
//! The three state columns printed by `systemctl list-units`:
//!
//! ```text
//! UNIT                    LOAD   ACTIVE SUB     DESCRIPTION
//! convirt-<uuid>.service  loaded active running /usr/bin/rkt ...
//! ```

/// Whether the unit definition was loaded (LOAD column)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loaded,
    NotFound,
    BadSetting,
    Error,
    Masked,
}

impl LoadState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "loaded" => Some(Self::Loaded),
            "not-found" => Some(Self::NotFound),
            "bad-setting" => Some(Self::BadSetting),
            "error" => Some(Self::Error),
            "masked" => Some(Self::Masked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::NotFound => "not-found",
            Self::BadSetting => "bad-setting",
            Self::Error => "error",
            Self::Masked => "masked",
        }
    }
}

/// High-level unit state (ACTIVE column)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Active,
    Reloading,
    Inactive,
    Failed,
    Activating,
    Deactivating,
}

impl ActiveState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "reloading" => Some(Self::Reloading),
            "inactive" => Some(Self::Inactive),
            "failed" => Some(Self::Failed),
            "activating" => Some(Self::Activating),
            "deactivating" => Some(Self::Deactivating),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Reloading => "reloading",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
            Self::Activating => "activating",
            Self::Deactivating => "deactivating",
        }
    }
}

/// Service sub-state (SUB column)
///
/// Only the service vocabulary is modelled; other unit types report
/// sub-states like `plugged` or `mounted` which parse to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    Dead,
    Start,
    Running,
    Stop,
    Failed,
    Exited,
    AutoRestart,
}

impl SubState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dead" => Some(Self::Dead),
            "start" => Some(Self::Start),
            "running" => Some(Self::Running),
            "stop" => Some(Self::Stop),
            "failed" => Some(Self::Failed),
            "exited" => Some(Self::Exited),
            "auto-restart" => Some(Self::AutoRestart),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dead => "dead",
            Self::Start => "start",
            Self::Running => "running",
            Self::Stop => "stop",
            Self::Failed => "failed",
            Self::Exited => "exited",
            Self::AutoRestart => "auto-restart",
        }
    }
}

/// True for the loaded/active/running triple
pub fn is_running(load: &str, active: &str, sub: &str) -> bool {
    matches!(
        (
            LoadState::parse(load),
            ActiveState::parse(active),
            SubState::parse(sub)
        ),
        (
            Some(LoadState::Loaded),
            Some(ActiveState::Active),
            Some(SubState::Running)
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_running() {
        assert!(is_running("loaded", "active", "running"));
        assert!(!is_running("loaded", "active", "exited"));
        assert!(!is_running("loaded", "failed", "failed"));
        assert!(!is_running("not-found", "active", "running"));
        assert!(!is_running("loaded", "active", "plugged"));
    }

    #[test]
    fn test_load_state_roundtrip() {
        for s in ["loaded", "not-found", "bad-setting", "error", "masked"] {
            assert_eq!(LoadState::parse(s).unwrap().as_str(), s);
        }
        assert!(LoadState::parse("bogus").is_none());
    }

    #[test]
    fn test_active_state_as_str() {
        assert_eq!(ActiveState::Active.as_str(), "active");
        assert_eq!(ActiveState::Inactive.as_str(), "inactive");
        assert_eq!(ActiveState::Activating.as_str(), "activating");
        assert_eq!(ActiveState::Deactivating.as_str(), "deactivating");
        assert_eq!(ActiveState::Failed.as_str(), "failed");
    }

    #[test]
    fn test_sub_state_as_str() {
        assert_eq!(SubState::Dead.as_str(), "dead");
        assert_eq!(SubState::Start.as_str(), "start");
        assert_eq!(SubState::Running.as_str(), "running");
        assert_eq!(SubState::Stop.as_str(), "stop");
        assert_eq!(SubState::Failed.as_str(), "failed");
        assert_eq!(SubState::Exited.as_str(), "exited");
        assert_eq!(SubState::AutoRestart.as_str(), "auto-restart");
        assert!(SubState::parse("mounted").is_none());
    }
}
