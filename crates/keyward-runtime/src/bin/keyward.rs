//! Keyward node daemon
//!
//! Reads reader frames from a device or file, admin commands from stdin,
//! and drives the control loop until interrupted.

use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use keyward_cache::FileStore;
use keyward_core::{NodeConfig, SystemClock, Trigger, TriggerCell};
use keyward_runtime::{
    AdminCommand, LoggedContact, LoggedStatus, Node, NodeParts, SharedReader, TokioTicker,
};
use keyward_transport::ReqwestTransport;

const ADMIN_QUEUE: usize = 16;
const LOG_FORMAT_ENV: &str = "KEYWARD_LOG_FORMAT";

/// keyward - RFID access-control node
#[derive(Parser, Debug)]
#[command(name = "keyward")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the node configuration file
    #[arg(short, long, default_value = "keyward.json")]
    config: PathBuf,

    /// Reader device or capture file to take frames from
    #[arg(short, long)]
    reader: Option<PathBuf>,

    /// Ignore admin commands on stdin
    #[arg(long)]
    no_admin: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let config = NodeConfig::load(&args.config)?;

    // Timers only; the control loop stays on this thread.
    let timers = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("keyward-timers")
        .enable_time()
        .build()?;

    let triggers = TriggerCell::new();
    let parts = NodeParts {
        transport: Box::new(ReqwestTransport::new(config.request_timeout)?),
        store: Box::new(FileStore::new(config.cache_path.clone())),
        contact: Box::new(LoggedContact::default()),
        status: Box::new(LoggedStatus),
        checkin_timer: Box::new(TokioTicker::new(
            timers.handle().clone(),
            triggers.clone(),
            Trigger::Checkin,
        )),
        heartbeat_timer: Box::new(TokioTicker::new(
            timers.handle().clone(),
            triggers.clone(),
            Trigger::SessionHeartbeat,
        )),
    };
    let mut node = Node::new(config, Arc::new(SystemClock::new()), triggers, parts);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        timers.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                shutdown.store(true, Ordering::Release);
            }
        });
    }

    let mut reader = SharedReader::new();
    if let Some(path) = args.reader {
        spawn_reader(path, reader.clone())?;
    }

    let (admin_tx, mut admin_rx) = mpsc::channel(ADMIN_QUEUE);
    if !args.no_admin {
        std::thread::Builder::new()
            .name("keyward-admin".into())
            .spawn(move || read_admin(admin_tx))?;
    }

    node.run(&mut reader, &mut admin_rx, &shutdown);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

/// Copy reader bytes into the shared buffer as they arrive
fn spawn_reader(path: PathBuf, sink: SharedReader) -> io::Result<()> {
    let mut device = File::open(&path)?;
    tracing::info!(path = %path.display(), "reader opened");

    std::thread::Builder::new()
        .name("keyward-reader".into())
        .spawn(move || {
            let mut buf = [0u8; 64];
            loop {
                match device.read(&mut buf) {
                    Ok(0) => std::thread::sleep(Duration::from_millis(50)),
                    Ok(n) => sink.push(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::error!(error = %e, "reader failed");
                        return;
                    }
                }
            }
        })?;
    Ok(())
}

fn read_admin(tx: mpsc::Sender<AdminCommand>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<AdminCommand>() {
            Ok(command) => {
                if tx.blocking_send(command).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring admin input"),
        }
    }
}
