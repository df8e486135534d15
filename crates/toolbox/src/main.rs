#![warn(missing_docs)]

//! Entry point for the `toolbox` binary.

mod cli;
mod error;
mod fetch;
mod shell;

use std::{io as stdio, process, sync::Arc, time::Duration};

use clap::Parser;
use config::FileStorage;
use tokio::{
    io::{self, BufReader},
    sync::mpsc::{self, UnboundedReceiver},
};
use toolbox_engine::{DispatchPolicy, Engine, EngineParts, Location, Notification, SharedLocation};
use toolbox_modules::{Services, StaticPage, WorkspaceStore, default_registry};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, registry};

use crate::{cli::Cli, error::Result, fetch::HttpFetch, shell::Shell};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Print notifications as `[kind] message` lines until the engine goes away.
async fn print_notifications(mut rx: UnboundedReceiver<Notification>) {
    while let Some(n) = rx.recv().await {
        println!("[{}] {}", n.kind, n.message);
    }
}

/// Parse CLI arguments, install logging, wire collaborators and run the shell.
async fn run() -> Result<()> {
    let cli = Cli::parse();
    let log_spec = cli.log.spec();
    registry()
        .with(logging::env_filter_from_spec(&log_spec))
        .with(fmt::layer().without_time().with_writer(stdio::stderr))
        .try_init()
        .ok();

    let state_dir = cli.state_dir()?;
    let storage = Arc::new(FileStorage::open(&state_dir)?);
    let page = match &cli.page {
        Some(path) => StaticPage::load(path)?,
        None => StaticPage::default(),
    };
    let location = SharedLocation::new(Location::new(&cli.origin, &cli.path));
    let workspace = Arc::new(WorkspaceStore::new(storage.clone()));
    let watcher = workspace.spawn_watcher();
    let services = Services {
        page: Arc::new(page.clone()),
        fetch: Arc::new(HttpFetch::new(cli.token.clone())?),
        workspace,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Engine::initialize(EngineParts {
        storage,
        modules: default_registry(&services),
        location: Arc::new(location.clone()),
        notifications: tx,
        policy: DispatchPolicy {
            tick_interval: Duration::from_millis(cli.interval.max(1)),
            ..DispatchPolicy::default()
        },
    })?;
    info!(state = %state_dir.display(), log = %log_spec, "toolbox started");
    engine.start();
    let printer = tokio::spawn(print_notifications(rx));

    let shell = Shell::new(engine.clone(), location, page);
    let result = shell.run(BufReader::new(io::stdin())).await;

    engine.teardown().await;
    watcher.abort();
    printer.abort();
    result
}
