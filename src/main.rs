use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use log::info;

use slotlog::{EntryStore, LogShell, Scheduler};

fn store_path() -> PathBuf {
    std::env::var_os("SLOTLOG_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("slotlog.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let path = store_path();
    info!("store file: {}", path.display());
    let store = EntryStore::open(path)?;

    let scheduler = Scheduler::new(store, Arc::new(LogShell));
    scheduler.rebuild_backlog(false).await;
    scheduler.start().await;

    let mut events = scheduler.subscribe();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("event: {event:?}");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.stop().await;
    event_log.abort();
    Ok(())
}
