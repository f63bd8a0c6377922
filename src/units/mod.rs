//! Unit naming and discovery
//!
//! Every managed container runs as a transient systemd service named
//! `convirt-<uuid>.service`. The name is computed from the UUID alone so that
//! after a restart the running set can be rebuilt from `systemctl list-units`
//! without any other saved state.

mod list;
mod state;

pub use list::{list_default, list_running_units, parse_list_units, RunningUnits};
pub use state::{is_running, ActiveState, LoadState, SubState};

/// Prefix shared by all our unit names
pub const PREFIX: &str = "convirt-";

/// Suffix systemd appends to service units
pub const SERVICE_SUFFIX: &str = ".service";

/// Unit name for a container identifier
pub fn unit_name(id: &str) -> String {
    format!("{}{}", PREFIX, id)
}

/// Inverse of [`unit_name`], accepting an optional `.service` suffix
pub fn id_from_unit<'a>(unit: &'a str, prefix: &str) -> Option<&'a str> {
    let name = unit.strip_suffix(SERVICE_SUFFIX).unwrap_or(unit);
    name.strip_prefix(prefix).filter(|id| !id.is_empty())
}
