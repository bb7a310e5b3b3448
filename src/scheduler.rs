//! Scheduler: runs the orchestrator immediately, then again every
//! `interval_minutes`, forever, until stopped. A tick that lands while
//! a run is still in flight is dropped silently — `Orchestrator::
//! sync_now` already guards against overlap, so the scheduler doesn't
//! need its own bookkeeping for that case.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::logging::LogSink;
use crate::orchestrator::Orchestrator;

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    log: LogSink,
    stopped: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, interval_minutes: u32, log: LogSink) -> Self {
        Scheduler {
            orchestrator,
            interval: Duration::from_secs(u64::from(interval_minutes) * 60),
            log,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the immediate-then-interval loop; blocks until `stop()`
    /// is called from another task or the process exits.
    pub async fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.orchestrator.sync_now().await {
                self.log.error(&format!("sync run failed: {e}"));
            }

            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Requests the loop stop after its current sleep or run completes.
    /// Does not abort an in-flight run.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    fn test_config() -> SyncConfig {
        SyncConfig {
            source_url: "postgres://u:p@localhost/src".into(),
            target_url: "postgres://u:p@localhost/dst".into(),
            interval_minutes: 1,
            exclude_tables: vec![],
            max_parallel_tables: 3,
            source_ssl_enabled: false,
            target_ssl_enabled: false,
            temp_root: std::env::temp_dir().join("pgsyncd-test"),
        }
    }

    #[test]
    fn interval_converts_minutes_to_seconds() {
        let orchestrator = Arc::new(Orchestrator::new(test_config(), LogSink::stdout()));
        let scheduler = Scheduler::new(orchestrator, 15, LogSink::stdout());
        assert_eq!(scheduler.interval, Duration::from_secs(900));
    }

    #[test]
    fn stop_flips_the_stopped_flag() {
        let orchestrator = Arc::new(Orchestrator::new(test_config(), LogSink::stdout()));
        let scheduler = Scheduler::new(orchestrator, 15, LogSink::stdout());
        scheduler.stop();
        assert!(scheduler.stopped.load(Ordering::SeqCst));
    }
}
