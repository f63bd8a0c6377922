//! Parsing of `systemctl list-units` output

use super::{is_running, PREFIX, SERVICE_SUFFIX};
use crate::command::{LaunchError, Launcher, Resolver};

/// Identifiers of running units in `output` whose name starts with `prefix`
///
/// Rows that are not five whitespace separated fields are skipped with a
/// warning, so one garbled line does not hide the rest.
pub fn parse_list_units<'a>(output: &'a str, prefix: &'a str) -> impl Iterator<Item = String> + 'a {
    output.lines().filter_map(move |line| parse_row(line, prefix))
}

fn parse_row(line: &str, prefix: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // unit load active sub description...
    let mut fields = line.split_whitespace();
    let (Some(unit), Some(load), Some(active), Some(sub), Some(_desc)) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        log::warn!("Unexpected systemctl line: {:?}", line);
        return None;
    };

    if !is_running(load, active, sub) {
        return None;
    }

    let id = unit.strip_suffix(SERVICE_SUFFIX)?.strip_prefix(prefix)?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// One pass over the running units reported by systemd
///
/// Owns the captured output and parses it row by row as it is consumed.
#[derive(Debug)]
pub struct RunningUnits {
    output: String,
    prefix: String,
    pos: usize,
}

impl RunningUnits {
    pub fn new(output: String, prefix: &str) -> Self {
        Self {
            output,
            prefix: prefix.to_string(),
            pos: 0,
        }
    }
}

impl Iterator for RunningUnits {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.pos < self.output.len() {
            let rest = &self.output[self.pos..];
            let (line, advance) = match rest.find('\n') {
                Some(end) => (&rest[..end], end + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;
            if let Some(id) = parse_row(line, &self.prefix) {
                return Some(id);
            }
        }
        None
    }
}

/// Ask systemd for running units named `<prefix>*`
pub fn list_running_units(
    launcher: &dyn Launcher,
    resolver: &Resolver,
    prefix: &str,
) -> Result<RunningUnits, LaunchError> {
    let argv = vec![
        resolver.command("systemctl")?,
        "list-units".to_string(),
        "--no-pager".to_string(),
        "--no-legend".to_string(),
        format!("{}*", prefix),
    ];
    let output = launcher.run(&argv, false)?;
    Ok(RunningUnits::new(output, prefix))
}

/// Running units with the default prefix
pub fn list_default(launcher: &dyn Launcher, resolver: &Resolver) -> Result<RunningUnits, LaunchError> {
    list_running_units(launcher, resolver, PREFIX)
}
