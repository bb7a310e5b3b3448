use thiserror::Error;

/// Error taxonomy for the synchronization engine.
///
/// Most variants are per-table and non-fatal to the run as a whole — the
/// orchestrator logs them and moves to the next table. `Configuration` and
/// `ExternalTool` are fatal before any table is attempted.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connect error: {source}")]
    Connect {
        table: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    #[error("dependency planning error: {0}")]
    Planner(String),

    #[error("dump failed for table '{table}': {reason}")]
    Dump { table: String, reason: String },

    #[error("stage A restore failed for table '{table}': {reason}")]
    RestoreStageA { table: String, reason: String },

    #[error("stage B restore failed for table '{table}': {reason}")]
    RestoreStageB { table: String, reason: String },

    #[error("sequence reconciliation warning for '{table}.{column}': {reason}")]
    Sequence {
        table: String,
        column: String,
        reason: String,
    },

    #[error("trigger toggle warning on '{table}': {reason}")]
    TriggerToggle { table: String, reason: String },

    #[error("required external tool not found: {0}")]
    ExternalTool(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("process failed (exit {code:?}): {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("process timed out after {0:?}")]
    ProcessTimeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Outcome of Stage A, used by the orchestrator to decide whether to
/// escalate to Stage B or give up on a table. Mirrors the explicit
/// result-kind pattern used throughout this codebase in place of
/// exceptions for inter-stage control flow.
#[derive(Debug)]
pub enum StageOutcome {
    Ok,
    NeedsUpsert(String),
    HardFail(String),
}