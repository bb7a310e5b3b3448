use std::path::PathBuf;

/// Connection parameters derived from a config URL plus the SSL policy
/// decided for it (on for non-loopback hosts, off for loopback).
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_enabled: bool,
}

impl ConnectionParams {
    pub fn is_loopback_host(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

/// One edge discovered while walking foreign keys: `table` depends on
/// `depends_on` via the named constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDependency {
    pub table: String,
    pub depends_on: String,
    pub constraint_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub name: String,
    pub primary_key_columns: Vec<String>,
    pub columns: Vec<String>,
    pub row_count: i64,
    pub has_updated_at: bool,
}

/// `Idle` is the pre-first-run and between-runs rest state; a run then
/// walks `Starting -> Processing -> (Completed | Error)`, matching the
/// lifecycle the scheduler and `progress()` accessor both observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Starting,
    Processing,
    Completed,
    Error,
}

/// Snapshot of an in-flight or just-completed run, read by the
/// orchestrator's `progress()` accessor.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub status: RunStatus,
    pub total_tables: usize,
    pub completed_tables: usize,
    pub current_table: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Local>>,
}

impl ProgressInfo {
    pub fn idle() -> Self {
        ProgressInfo {
            status: RunStatus::Idle,
            total_tables: 0,
            completed_tables: 0,
            current_table: None,
            started_at: None,
        }
    }
}

/// Paths to the scratch directory and the per-table dump files created
/// under it for a single run. Dropping this removes the whole
/// directory, guaranteeing the "temp-file cleanup" invariant holds on
/// every exit path including panics unwound through it.
#[derive(Debug)]
pub struct DumpWorkspace {
    pub root: tempfile::TempDir,
}

impl DumpWorkspace {
    pub fn new(under: &PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(under)?;
        let root = tempfile::Builder::new().prefix("pgsyncd-").tempdir_in(under)?;
        Ok(DumpWorkspace { root })
    }

    pub fn table_dump_path(&self, table: &str) -> PathBuf {
        self.root.path().join(format!("{table}.dump"))
    }
}
