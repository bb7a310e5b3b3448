//! Dump producer: pulls one table's data out of the source database
//! into a local plain-SQL file (a `COPY ... FROM stdin` block) via
//! `pg_dump`, the same tool and `--no-owner --no-privileges` flag pair
//! the teacher's `sync/logic.rs` already uses for its data-only dumps,
//! narrowed here to a single `--table`. Plain format (rather than the
//! teacher's custom `-Fc`) is deliberate: Stage A loads it straight
//! with `psql`, and Stage B's upsert path re-tokenizes the very same
//! `COPY` block instead of needing a second extraction tool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::errors::SyncError;
use crate::pg_tools;
use crate::process::run_with_deadline;
use crate::types::ConnectionParams;

const DUMP_DEADLINE: Duration = Duration::from_secs(5 * 60);
const MIN_VALID_DUMP_BYTES: u64 = 100;

pub async fn dump_table(
    source: &ConnectionParams,
    table: &str,
    dest_path: &Path,
) -> Result<PathBuf, SyncError> {
    let pg_dump = pg_tools::find_pg_dump()?;

    let mut cmd = Command::new(pg_dump);
    cmd.arg("--data-only")
        .arg("--format=plain")
        .arg("--no-owner")
        .arg("--no-privileges")
        .arg("--table")
        .arg(table)
        .arg("--host")
        .arg(&source.host)
        .arg("--port")
        .arg(source.port.to_string())
        .arg("--username")
        .arg(&source.user)
        .arg("--dbname")
        .arg(&source.database)
        .arg("--file")
        .arg(dest_path)
        .env("PGPASSWORD", &source.password);

    if !source.ssl_enabled {
        cmd.env("PGSSLMODE", "disable");
    }

    run_with_deadline(cmd, DUMP_DEADLINE)
        .await
        .map_err(|e| SyncError::Dump {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

    let metadata = std::fs::metadata(dest_path).map_err(|e| SyncError::Dump {
        table: table.to_string(),
        reason: format!("dump file missing after pg_dump: {e}"),
    })?;

    if metadata.len() < MIN_VALID_DUMP_BYTES {
        return Err(SyncError::Dump {
            table: table.to_string(),
            reason: format!(
                "dump file is only {} bytes, suspiciously small for a non-empty archive",
                metadata.len()
            ),
        });
    }

    Ok(dest_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_five_minutes() {
        assert_eq!(DUMP_DEADLINE, Duration::from_secs(300));
    }
}
