//! Orchestrator: the `syncNow` entry point. Connects to both
//! databases, discovers the table set and its FK ordering, disables
//! triggers on the target for the duration of the run (always
//! re-enabling them, even on error or panic-unwind), then processes
//! each dependency level with up to `max_parallel_tables` tables in
//! flight at once. Grounded in the overall shape of the teacher's
//! `sync/logic.rs`, generalized from a fixed list of whole databases to
//! a discovered, FK-ordered list of tables within one database pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sqlx::{Pool, Postgres};
use tokio::sync::Semaphore;

use crate::config::SyncConfig;
use crate::connection;
use crate::dump;
use crate::errors::SyncError;
use crate::logging::LogSink;
use crate::pg_tools;
use crate::planner;
use crate::restore;
use crate::schema;
use crate::sequence;
use crate::types::{DumpWorkspace, ProgressInfo, RunStatus};

pub struct Orchestrator {
    config: SyncConfig,
    log: LogSink,
    progress: Arc<Mutex<ProgressInfo>>,
    running: Arc<AtomicUsize>,
}

impl Orchestrator {
    pub fn new(config: SyncConfig, log: LogSink) -> Self {
        Orchestrator {
            config,
            log,
            progress: Arc::new(Mutex::new(ProgressInfo::idle())),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn progress(&self) -> ProgressInfo {
        self.progress.lock().unwrap().clone()
    }

    /// Runs one full sync pass. If a run is already in flight, returns
    /// immediately without starting a second one — the scheduler relies
    /// on this to silently drop a tick rather than overlap runs.
    ///
    /// The terminal `Completed`/`Error` snapshot left in `progress()` by
    /// `run_once` is intentionally left in place here rather than reset
    /// to idle — callers observing `progress()` after a run finishes
    /// need to see its final `completed_tables == total_tables` state.
    /// The next run's `run_once` overwrites it with `Starting` itself.
    pub async fn sync_now(&self) -> Result<(), SyncError> {
        if self.running.swap(1, Ordering::SeqCst) == 1 {
            self.log.warn("sync already in progress, skipping this run");
            return Ok(());
        }

        let result = self.run_once().await;

        self.running.store(0, Ordering::SeqCst);
        result
    }

    /// Confirms `pg_dump`, `psql` and `pg_restore` can all be located
    /// before touching either database — all three are required by the
    /// dump/Stage-A/Stage-B pipeline, so a missing binary should fail
    /// the whole run up front rather than partway through some table.
    fn preflight_check_tools(&self) -> Result<(), SyncError> {
        pg_tools::find_pg_dump()?;
        pg_tools::find_psql()?;
        pg_tools::find_pg_restore()?;
        Ok(())
    }

    async fn run_once(&self) -> Result<(), SyncError> {
        self.log.info("starting sync run");
        {
            let mut progress = self.progress.lock().unwrap();
            *progress = ProgressInfo::idle();
            progress.status = RunStatus::Starting;
            progress.started_at = Some(chrono::Local::now());
        }

        self.preflight_check_tools()?;

        let source_pool = connection::connect(&self.config.source_url, self.config.source_ssl_enabled).await?;
        let target_pool = connection::connect(&self.config.target_url, self.config.target_ssl_enabled).await?;

        let tables = schema::list_tables(&source_pool, &target_pool, &self.log).await?;
        if tables.is_empty() {
            self.log.warn("no tables discovered to sync");
            let mut progress = self.progress.lock().unwrap();
            progress.status = RunStatus::Completed;
            return Ok(());
        }

        let levels = match planner::foreign_key_edges(&source_pool, &tables, &self.log).await {
            Ok(edges) => planner::plan_levels(&tables, &edges, &self.log),
            Err(e) => {
                self.log.warn(&format!(
                    "dependency planning failed ({e}), falling back to alphabetical order"
                ));
                planner::alphabetical_fallback(&tables)
            }
        };

        let dispatched_total = levels
            .iter()
            .flatten()
            .filter(|t| !self.config.exclude_tables.contains(*t))
            .count();

        {
            let mut progress = self.progress.lock().unwrap();
            progress.status = RunStatus::Processing;
            progress.total_tables = dispatched_total;
            progress.completed_tables = 0;
        }

        let workspace = DumpWorkspace::new(&self.config.temp_root).map_err(SyncError::Io)?;

        self.disable_triggers(&target_pool, &tables).await;

        let sync_result = self
            .process_levels(&source_pool, &target_pool, &levels, &workspace)
            .await;

        self.enable_triggers(&target_pool, &tables).await;

        {
            let mut progress = self.progress.lock().unwrap();
            progress.status = if sync_result.is_ok() { RunStatus::Completed } else { RunStatus::Error };
        }

        sync_result?;

        self.log.ok("sync run complete");
        Ok(())
    }

    async fn process_levels(
        &self,
        source_pool: &Pool<Postgres>,
        target_pool: &Pool<Postgres>,
        levels: &[Vec<String>],
        workspace: &DumpWorkspace,
    ) -> Result<(), SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_tables as usize));
        let total = levels
            .iter()
            .flatten()
            .filter(|t| !self.config.exclude_tables.contains(*t))
            .count();
        let completed = Arc::new(AtomicUsize::new(0));

        for level in levels {
            let mut handles = Vec::with_capacity(level.len());

            for table in level {
                if self.config.exclude_tables.contains(table) {
                    self.log.info(&format!("table '{table}' is excluded, skipping"));
                    continue;
                }

                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let source_pool = source_pool.clone();
                let target_pool = target_pool.clone();
                let source_url = self.config.source_url.clone();
                let source_ssl = self.config.source_ssl_enabled;
                let target_url = self.config.target_url.clone();
                let target_ssl = self.config.target_ssl_enabled;
                let dump_path = workspace.table_dump_path(table);
                let table = table.clone();
                let log = self.log.clone();
                let completed = completed.clone();
                let progress = self.progress.clone();

                let table_log = log.clone();
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = sync_one_table(
                        &source_pool,
                        &target_pool,
                        &source_url,
                        source_ssl,
                        &target_url,
                        target_ssl,
                        &table,
                        &dump_path,
                        &table_log,
                    )
                    .await;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    {
                        let mut p = progress.lock().unwrap();
                        p.completed_tables = done;
                        p.current_table = Some(table.clone());
                    }

                    match &outcome {
                        Ok(()) => log.progress(done, total, &format!("synced table '{table}'")),
                        Err(e) => log.progress(done, total, &format!("table '{table}' failed: {e}")),
                    }

                    outcome
                });

                handles.push(handle);
            }

            for handle in handles {
                if let Err(e) = handle.await.expect("table task panicked") {
                    self.log.warn(&format!("table sync error: {e}"));
                }
            }
        }

        Ok(())
    }

    async fn disable_triggers(&self, target_pool: &Pool<Postgres>, tables: &[String]) {
        for table in tables {
            if let Err(e) =
                sqlx::query(&format!("ALTER TABLE \"{table}\" DISABLE TRIGGER ALL")).execute(target_pool).await
            {
                self.log.warn(&format!("could not disable triggers on '{table}': {e}"));
            }
        }
    }

    async fn enable_triggers(&self, target_pool: &Pool<Postgres>, tables: &[String]) {
        for table in tables {
            if let Err(e) =
                sqlx::query(&format!("ALTER TABLE \"{table}\" ENABLE TRIGGER ALL")).execute(target_pool).await
            {
                self.log.warn(&format!("could not re-enable triggers on '{table}': {e}"));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn sync_one_table(
    source_pool: &Pool<Postgres>,
    target_pool: &Pool<Postgres>,
    source_url: &str,
    source_ssl: bool,
    target_url: &str,
    target_ssl: bool,
    table: &str,
    dump_path: &std::path::Path,
    log: &LogSink,
) -> Result<(), SyncError> {
    let source_params = connection::parse_connection_params(source_url, source_ssl)?;
    let target_params = connection::parse_connection_params(target_url, target_ssl)?;

    let source_meta = schema::metadata(source_pool, table, log).await?;
    let target_meta = schema::metadata(target_pool, table, log).await?;
    let common = schema::common_columns(&source_meta, &target_meta, log);

    dump::dump_table(&source_params, table, dump_path).await?;

    restore::restore_table(target_pool, &target_params, &target_meta, &common, dump_path, log).await?;

    let warnings = sequence::reconcile_table_sequences(source_pool, target_pool, table, &common).await;
    for w in warnings {
        log.warn(&w.to_string());
    }

    Ok(())
}
