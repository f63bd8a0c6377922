//! convirtctl - CLI for convirtd
//!
//! Communicates with the convirt daemon over /run/convirt.sock.
//! Use --user to talk to a per-user daemon.

use clap::{Parser, Subcommand};
use peercred_ipc::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use convirt::command::{Resolver, Subprocess};
use convirt::protocol::{socket_path, Request, Response};
use convirt::{units, Descriptor, DomainInfo, DomainOp, RunConfig};

#[derive(Parser)]
#[command(name = "convirtctl")]
#[command(about = "Control containers managed by convirtd")]
struct Args {
    /// Connect to the per-user daemon instead of the system one
    #[arg(long, global = true)]
    user: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and start a domain from an XML descriptor
    Create {
        /// Path to the domain XML
        path: PathBuf,
    },

    /// Stop a domain and forget it
    Destroy {
        /// Domain UUID
        uuid: String,
    },

    /// Restart a domain
    Reset {
        /// Domain UUID
        uuid: String,
    },

    /// Print the domain XML
    Describe {
        /// Domain UUID
        uuid: String,
    },

    /// Show domain status
    Status {
        /// Domain UUID
        uuid: String,
    },

    /// Invoke a named domain operation (e.g. "suspend", "status")
    Call {
        /// Domain UUID
        uuid: String,
        /// Operation name
        op: DomainOp,
    },

    /// List live domains
    List,

    /// Reattach to containers still running
    Recover,

    /// List runtimes available on the daemon host
    Supported,

    /// Parse a domain XML locally and print its run configuration (doesn't require daemon)
    Parse {
        /// Path to the domain XML
        path: PathBuf,
        /// Fail on unusable bridge interfaces instead of running without network
        #[arg(long)]
        strict_network: bool,
    },

    /// List running convirt units as systemd sees them (doesn't require daemon)
    Units,

    /// Ping the daemon
    Ping,
}

fn main() {
    let args = Args::parse();
    let user_mode = args.user;

    // Parse and Units are local-only
    match &args.command {
        Command::Parse {
            path,
            strict_network,
        } => {
            parse_local(path, !strict_network);
            return;
        }
        Command::Units => {
            list_units_local();
            return;
        }
        _ => {}
    }

    let request = match args.command {
        Command::Create { path } => match std::fs::read_to_string(&path) {
            Ok(xml) => Request::Create { xml },
            Err(e) => {
                eprintln!("convirtctl: cannot read {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        Command::Destroy { uuid } => Request::Destroy { uuid },
        Command::Reset { uuid } => Request::Reset { uuid },
        Command::Describe { uuid } => Request::Describe { uuid },
        Command::Status { uuid } => Request::Status { uuid },
        Command::Call { uuid, op } => Request::Call { uuid, op },
        Command::List => Request::List,
        Command::Recover => Request::Recover,
        Command::Supported => Request::Supported,
        Command::Ping => Request::Ping,
        Command::Parse { .. } | Command::Units => unreachable!(),
    };

    let sock_path = socket_path(user_mode);

    match Client::call(&sock_path, &request) {
        Ok(response) => print_response(response),
        Err(e) => {
            if e.to_string().contains("connect") || e.to_string().contains("No such file") {
                if user_mode {
                    eprintln!("convirtctl: user daemon not running");
                    eprintln!("  start with: convirtd --user");
                } else {
                    eprintln!("convirtctl: daemon not running");
                    eprintln!("  start with: sudo convirtd");
                }
            } else {
                eprintln!("convirtctl: {}", e);
            }
            std::process::exit(1);
        }
    }
}

fn print_domain(info: &DomainInfo) {
    println!("● {}", info.uuid);
    if let Some(name) = &info.name {
        println!("     Name: {}", name);
    }
    println!("  Runtime: {}", info.kind);
    println!("    State: {} since {}", info.state, info.since.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("     Unit: {}", info.unit_name);
    if let Some(runtime_name) = &info.runtime_name {
        println!("   Engine: {}", runtime_name);
    }
    if let Some(image) = &info.image {
        println!("    Image: {}", image);
    }
    if let Some(mib) = info.memory_mib {
        println!("   Memory: {} MiB", mib);
    }
}

fn print_response(response: Response) {
    match response {
        Response::Ok => {} // Silent success
        Response::Pong => println!("pong"),
        Response::Error { kind, message } => {
            eprintln!("error ({}): {}", kind.as_str(), message);
            std::process::exit(1);
        }
        Response::Domain(info) => print_domain(&info),
        Response::Domains(domains) => {
            if domains.is_empty() {
                println!("No domains");
                return;
            }
            println!("{:<38} {:>8} {:>10}  {}", "UUID", "RUNTIME", "STATE", "UNIT");
            for dom in domains {
                println!(
                    "{:<38} {:>8} {:>10}  {}",
                    dom.uuid, dom.kind, dom.state, dom.unit_name
                );
            }
        }
        Response::Xml(xml) => println!("{}", xml),
        Response::Runtimes(kinds) => {
            if kinds.is_empty() {
                println!("No runtimes available");
            } else {
                for kind in kinds {
                    println!("{}", kind);
                }
            }
        }
    }
}

fn parse_local(path: &Path, net_fallback: bool) {
    let parsed = std::fs::read_to_string(path)
        .map_err(convirt::Error::from)
        .and_then(|xml| Ok(Descriptor::parse(&xml)?))
        .and_then(|desc| {
            println!("UUID: {}", desc.uuid());
            if let Some(emulator) = desc.emulator() {
                println!("Runtime: {}", emulator);
            }
            RunConfig::from_descriptor(&desc, net_fallback)
        });

    match parsed {
        Ok(run_conf) => match serde_yaml::to_string(&run_conf) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => {
                eprintln!("convirtctl: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Failed to parse {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn list_units_local() {
    let resolver = Arc::new(Resolver::from_env());
    let launcher = Subprocess::new(resolver.clone(), false);
    match units::list_default(&launcher, &resolver) {
        Ok(ids) => {
            for id in ids {
                println!("{}", units::unit_name(&id));
            }
        }
        Err(e) => {
            eprintln!("convirtctl: {}", e);
            std::process::exit(1);
        }
    }
}
