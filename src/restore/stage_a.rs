//! Stage A: load a table's plain-SQL dump straight into the target
//! with `psql -1` (single-transaction) and `ON_ERROR_STOP=1`, the fast
//! path that works whenever the target table started empty or
//! otherwise has no conflicting rows. Grounded in the teacher's
//! `execute_sql_file_with_psql` in `restore/db_restore.rs`, which
//! already runs `psql -X -q -v ON_ERROR_STOP=1 -d <url> -f <file>`.
//!
//! Per the error taxonomy, Stage A is non-fatal on its own: any failure
//! it hits — a conflicting key, a column the target doesn't have, a
//! type mismatch, anything `psql` reports — escalates to Stage B. The
//! only true hard failure here is being unable to even attempt the
//! load (the `psql` binary or the dump file itself missing).

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::errors::StageOutcome;
use crate::pg_tools;
use crate::process::run_with_deadline;
use crate::types::ConnectionParams;

const RESTORE_DEADLINE: Duration = Duration::from_secs(5 * 60);

pub async fn restore_direct(target: &ConnectionParams, table: &str, dump_path: &Path) -> StageOutcome {
    let _ = table;
    let psql = match pg_tools::find_psql() {
        Ok(p) => p,
        Err(e) => return StageOutcome::HardFail(e.to_string()),
    };

    let scrubbed_path = match scrub_unsupported_settings(dump_path) {
        Ok(p) => p,
        Err(e) => return StageOutcome::HardFail(e.to_string()),
    };

    let mut cmd = Command::new(psql);
    cmd.arg("-X")
        .arg("-q")
        .arg("-1")
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("--host")
        .arg(&target.host)
        .arg("--port")
        .arg(target.port.to_string())
        .arg("--username")
        .arg(&target.user)
        .arg("--dbname")
        .arg(&target.database)
        .arg("--file")
        .arg(&scrubbed_path)
        .env("PGPASSWORD", &target.password);

    if !target.ssl_enabled {
        cmd.env("PGSSLMODE", "disable");
    }

    match run_with_deadline(cmd, RESTORE_DEADLINE).await {
        Ok(_) => StageOutcome::Ok,
        Err(e) => StageOutcome::NeedsUpsert(e.to_string()),
    }
}

/// `pg_dump` on newer servers emits `SET transaction_timeout = 0;`,
/// which older target servers reject outright with a syntax error
/// before a single row loads. Strips such lines into a sibling file
/// rather than editing the original dump in place, the same
/// copy-then-substitute approach the teacher's `replace_database_references`
/// uses for renaming references inside a SQL file.
fn scrub_unsupported_settings(dump_path: &Path) -> std::io::Result<PathBuf> {
    let content = std::fs::read_to_string(dump_path)?;
    if !content.contains("transaction_timeout") {
        return Ok(dump_path.to_path_buf());
    }

    let scrubbed: String = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("SET transaction_timeout"))
        .map(|line| format!("{line}\n"))
        .collect();

    let scrubbed_path = dump_path.with_extension("scrubbed.sql");
    std::fs::write(&scrubbed_path, scrubbed)?;
    Ok(scrubbed_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_leaves_dump_untouched_when_no_timeout_setting_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.sql");
        std::fs::write(&path, "COPY public.users (id) FROM stdin;\n1\n\\.\n").unwrap();
        let scrubbed = scrub_unsupported_settings(&path).unwrap();
        assert_eq!(scrubbed, path);
    }

    #[test]
    fn scrub_removes_transaction_timeout_setting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.sql");
        std::fs::write(
            &path,
            "SET transaction_timeout = 0;\nCOPY public.users (id) FROM stdin;\n1\n\\.\n",
        )
        .unwrap();
        let scrubbed = scrub_unsupported_settings(&path).unwrap();
        let content = std::fs::read_to_string(&scrubbed).unwrap();
        assert!(!content.contains("transaction_timeout"));
        assert!(content.contains("COPY public.users"));
    }
}
