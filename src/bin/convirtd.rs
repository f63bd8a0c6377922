//! convirtd - container lifecycle daemon
//!
//! Listens on /run/convirt.sock for commands from convirtctl.
//!
//! On startup it prepares the container runtimes, then reattaches to any
//! `convirt-*` units systemd still runs. A watchdog marks domains whose
//! unit went away as stopped.

use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use convirt::config::{Config, DEFAULT_CONFIG_PATH};
use convirt::events::EventKind;
use convirt::manager::Manager;
use convirt::protocol::{handle_request, socket_path, Request, Response};
use convirt::ErrorKind;
use peercred_ipc::{CallerInfo, Connection, Server};

#[derive(Parser)]
#[command(name = "convirtd")]
#[command(about = "Container lifecycle daemon with a VM-style API")]
struct Args {
    /// Configuration file
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Listen on the per-user socket
    #[arg(long)]
    user: bool,

    /// Don't reattach to running units at startup
    #[arg(long)]
    no_recover: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(&args.config)?;
    let watchdog_interval = config.watchdog_interval();
    let manager = Arc::new(Manager::new(config));

    let supported = manager.registry().register();
    info!("Available runtimes: {:?}", supported);

    if let Err(e) = manager.registry().setup(manager.config()) {
        log::warn!("Failed to set up runtimes: {}", e);
    }

    for kind in [
        EventKind::Started,
        EventKind::Stopped,
        EventKind::Recovered,
        EventKind::Destroyed,
    ] {
        manager.events().register(kind, |event| {
            info!("{} {}", event.kind.as_str(), event.uuid);
        });
    }

    if !args.no_recover {
        let manager_rec = Arc::clone(&manager);
        match tokio::task::spawn_blocking(move || manager_rec.recover_all()).await {
            Ok(Ok(domains)) => info!("{} domains live after recovery", domains.len()),
            Ok(Err(e)) => log::error!("Recovery failed: {}", e),
            Err(e) => log::error!("Recovery task failed: {}", e),
        }
    }

    let manager_bg = Arc::clone(&manager);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(watchdog_interval);
        loop {
            interval.tick().await;
            let mgr = Arc::clone(&manager_bg);
            match tokio::task::spawn_blocking(move || mgr.watchdog()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::warn!("Watchdog failed: {}", e),
                Err(e) => log::error!("Watchdog task failed: {}", e),
            }
        }
    });

    let sock_path = socket_path(args.user);
    let server = Server::bind(&sock_path)?;
    info!("convirtd{} listening on {}", if args.user { " (user)" } else { "" }, sock_path);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok((conn, caller)) => {
                    let manager = Arc::clone(&manager);
                    tokio::spawn(handle_connection(conn, caller, manager));
                }
                Err(e) => {
                    log::error!("accept error: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    // Containers outlive the daemon; only the shared runtime state goes
    if let Err(e) = manager.registry().teardown(manager.config()) {
        log::warn!("Failed to tear down runtimes: {}", e);
    }
    Ok(())
}

async fn handle_connection(mut conn: Connection, caller: CallerInfo, manager: Arc<Manager>) {
    info!(
        "connection from uid={} pid={} exe={:?}",
        caller.uid, caller.pid, caller.exe
    );

    let request: Request = match conn.read().await {
        Ok(r) => r,
        Err(e) => {
            log::error!("read error: {}", e);
            let _ = conn
                .write(&Response::Error {
                    kind: ErrorKind::Config,
                    message: "invalid request".into(),
                })
                .await;
            return;
        }
    };

    let response = handle_request(manager, request).await;
    if let Err(e) = conn.write(&response).await {
        log::error!("write error: {}", e);
    }
}
