// src/main.rs

mod config;
mod connection;
mod dump;
mod errors;
mod logging;
mod orchestrator;
mod pg_tools;
mod planner;
mod process;
mod restore;
mod schema;
mod scheduler;
mod sequence;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use config::SyncConfig;
use errors::SyncError;
use logging::LogSink;
use orchestrator::Orchestrator;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    dotenv::dotenv().ok();

    let log = LogSink::stdout();
    let config = load_config()?;
    let once = std::env::args().any(|a| a == "--once");

    let orchestrator = Arc::new(Orchestrator::new(config.clone(), log.clone()));

    if once {
        log.info("running one sync pass (--once)");
        orchestrator.sync_now().await?;
    } else {
        log.info(&format!(
            "starting scheduler, interval {} minute(s)",
            config.interval_minutes
        ));
        let scheduler = Scheduler::new(orchestrator, config.interval_minutes, log);
        scheduler.start().await;
    }

    Ok(())
}

fn load_config() -> Result<SyncConfig, SyncError> {
    let path = std::env::var("PGSYNCD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("pgsyncd.json"));

    SyncConfig::load_from_json(&path)
}
