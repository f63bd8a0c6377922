//! External command execution and executable lookup

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

/// Runs an external program to completion
pub trait Launcher: Send + Sync {
    /// Run `argv`, returning its stdout.
    ///
    /// `privileged` asks for the command to run as root; implementations may
    /// prefix a privilege-escalation helper.
    fn run(&self, argv: &[String], privileged: bool) -> Result<String, LaunchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Empty command line")]
    Empty,

    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn {0}: {1}")]
    Spawn(String, String),

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Render a command line for logs
pub fn display(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Resolves logical command names to absolute paths
///
/// Lookups are cached per name, including misses.
#[derive(Debug)]
pub struct Resolver {
    search_path: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl Resolver {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Search $PATH
    pub fn from_env() -> Self {
        let paths = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self::new(paths)
    }

    /// Resolver that knows only the given names
    pub fn pinned<I, S, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        let resolver = Self::new(Vec::new());
        for (name, path) in entries {
            resolver.pin(name, path);
        }
        resolver
    }

    /// Seed the cache, bypassing the search
    pub fn pin(&self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), Some(path.into()));
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, LaunchError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let found = cache
            .entry(name.to_string())
            .or_insert_with(|| self.search(name));
        found.clone().ok_or_else(|| LaunchError::NotFound(name.to_string()))
    }

    /// Resolve to a string, for building argv vectors
    pub fn command(&self, name: &str) -> Result<String, LaunchError> {
        Ok(self.resolve(name)?.to_string_lossy().into_owned())
    }

    pub fn available(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    fn search(&self, name: &str) -> Option<PathBuf> {
        if name.contains('/') {
            let path = PathBuf::from(name);
            return is_executable(&path).then_some(path);
        }
        let found = self
            .search_path
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate));
        log::debug!("Resolved {} -> {:?}", name, found);
        found
    }
}

/// Launcher backed by real child processes
pub struct Subprocess {
    resolver: Arc<Resolver>,
    use_sudo: bool,
}

impl Subprocess {
    pub fn new(resolver: Arc<Resolver>, use_sudo: bool) -> Self {
        Self { resolver, use_sudo }
    }

    fn needs_sudo(&self, privileged: bool) -> bool {
        privileged && self.use_sudo && !nix::unistd::Uid::effective().is_root()
    }
}

impl Launcher for Subprocess {
    fn run(&self, argv: &[String], privileged: bool) -> Result<String, LaunchError> {
        let (program, args) = argv.split_first().ok_or(LaunchError::Empty)?;

        let mut cmd = if self.needs_sudo(privileged) {
            let mut cmd = Command::new(self.resolver.resolve("sudo")?);
            cmd.arg("-n").arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.args(args);
        cmd.stdin(Stdio::null());

        log::debug!("Calling {}", display(argv));
        let output = cmd.output().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LaunchError::NotFound(program.clone()),
            _ => LaunchError::Spawn(program.clone(), e.to_string()),
        })?;

        if !output.status.success() {
            return Err(LaunchError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

type Handler = Arc<dyn Fn(&[String]) -> Result<String, LaunchError> + Send + Sync>;

/// Launcher that records command lines instead of executing them
///
/// Handlers are keyed by the file name of `argv[0]`; unhandled programs
/// succeed with empty output.
#[derive(Default)]
pub struct FakeLauncher {
    handlers: Mutex<HashMap<String, Handler>>,
    executions: Mutex<Vec<(Vec<String>, bool)>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, program: &str, handler: F) -> &Self
    where
        F: Fn(&[String]) -> Result<String, LaunchError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(program.to_string(), Arc::new(handler));
        self
    }

    /// Reply to `program` with fixed output
    pub fn respond(&self, program: &str, output: &str) -> &Self {
        let output = output.to_string();
        self.on(program, move |_| Ok(output.clone()))
    }

    /// Make `program` exit non-zero
    pub fn fail(&self, program: &str) -> &Self {
        let name = program.to_string();
        self.on(program, move |_| {
            Err(LaunchError::Failed {
                program: name.clone(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            })
        })
    }

    pub fn executions(&self) -> Vec<Vec<String>> {
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(argv, _)| argv.clone())
            .collect()
    }

    /// File names of every program run so far
    pub fn programs(&self) -> Vec<String> {
        self.executions().iter().filter_map(|argv| program_name(argv)).collect()
    }
}

fn program_name(argv: &[String]) -> Option<String> {
    let first = argv.first()?;
    Path::new(first)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

impl Launcher for FakeLauncher {
    fn run(&self, argv: &[String], privileged: bool) -> Result<String, LaunchError> {
        let name = program_name(argv).ok_or(LaunchError::Empty)?;
        log::info!("Faking call: {}", display(argv));
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((argv.to_vec(), privileged));

        // Handlers may run commands of their own
        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&name)
            .cloned();
        match handler {
            Some(handler) => handler(argv),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolver_finds_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_executable(dir.path(), "rkt");
        let resolver = Resolver::new(vec![dir.path().to_path_buf()]);
        assert_eq!(resolver.resolve("rkt").unwrap(), path);
        assert!(resolver.available("rkt"));
    }

    #[test]
    fn test_resolver_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker"), "").unwrap();
        let resolver = Resolver::new(vec![dir.path().to_path_buf()]);
        assert!(matches!(
            resolver.resolve("docker"),
            Err(LaunchError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolver_caches_misses() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(vec![dir.path().to_path_buf()]);
        assert!(!resolver.available("machinectl"));

        // Appearing later does not change a cached answer
        make_executable(dir.path(), "machinectl");
        assert!(!resolver.available("machinectl"));
    }

    #[test]
    fn test_resolver_pinned() {
        let resolver = Resolver::pinned([("systemd-run", "/usr/bin/systemd-run")]);
        assert_eq!(resolver.command("systemd-run").unwrap(), "/usr/bin/systemd-run");
        assert!(!resolver.available("systemctl"));
    }

    #[test]
    fn test_display_quotes() {
        assert_eq!(display(&argv(&["echo", "a b"])), "echo 'a b'");
    }

    #[test]
    fn test_subprocess_output() {
        let launcher = Subprocess::new(Arc::new(Resolver::from_env()), false);
        let out = launcher
            .run(&argv(&["/bin/sh", "-c", "echo hello"]), false)
            .unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_subprocess_failure() {
        let launcher = Subprocess::new(Arc::new(Resolver::from_env()), false);
        let err = launcher
            .run(&argv(&["/bin/sh", "-c", "echo oops >&2; exit 3"]), false)
            .unwrap_err();
        match err {
            LaunchError::Failed { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_subprocess_missing_program() {
        let launcher = Subprocess::new(Arc::new(Resolver::from_env()), false);
        let err = launcher
            .run(&argv(&["/nonexistent/convirt-test-binary"]), false)
            .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound(_)));
    }

    #[test]
    fn test_subprocess_empty() {
        let launcher = Subprocess::new(Arc::new(Resolver::from_env()), false);
        assert!(matches!(launcher.run(&[], false), Err(LaunchError::Empty)));
    }

    #[test]
    fn test_fake_launcher_records() {
        let launcher = FakeLauncher::new();
        launcher.respond("systemctl", "output");
        let out = launcher
            .run(&argv(&["/usr/bin/systemctl", "list-units"]), false)
            .unwrap();
        assert_eq!(out, "output");
        assert_eq!(launcher.programs(), vec!["systemctl".to_string()]);
    }

    #[test]
    fn test_fake_launcher_fail() {
        let launcher = FakeLauncher::new();
        launcher.fail("machinectl");
        assert!(launcher
            .run(&argv(&["machinectl", "poweroff", "rkt-x"]), true)
            .is_err());
    }

    #[test]
    fn test_fake_handler_can_run_commands() {
        let launcher = Arc::new(FakeLauncher::new());
        let inner = Arc::downgrade(&launcher);
        launcher.on("systemctl", move |_| match inner.upgrade() {
            Some(l) => l.run(&argv(&["docker", "ps"]), false),
            None => Ok(String::new()),
        });
        launcher
            .run(&argv(&["systemctl", "list-units"]), false)
            .unwrap();
        assert_eq!(
            launcher.programs(),
            vec!["systemctl".to_string(), "docker".to_string()]
        );
    }
}
