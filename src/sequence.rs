//! Sequence reconciler: after a table's data lands, realigns the
//! target's identity/serial sequence so the next `INSERT` doesn't
//! collide with a row that was just synced. Grounded in the teacher's
//! `utils/sequence_reset.rs`, which walks `pg_class`/`pg_depend`/
//! `pg_attribute` to find a table's owned sequences; this version uses
//! `pg_get_serial_sequence` instead, since it resolves the common case
//! (`serial`/`GENERATED ... AS IDENTITY` columns) in one call per
//! column rather than a four-way join.

use sqlx::{Pool, Postgres, Row};

use crate::errors::SyncError;

/// Reconciles every integer column in `table` that owns a sequence.
/// Non-fatal by design: a failure here is logged by the caller and
/// never aborts the run, since a stale sequence only risks a future
/// insert collision, not a data-correctness problem for the sync
/// itself.
pub async fn reconcile_table_sequences(
    source_pool: &Pool<Postgres>,
    target_pool: &Pool<Postgres>,
    table: &str,
    columns: &[String],
) -> Vec<SyncError> {
    let mut warnings = Vec::new();

    for column in columns {
        if let Err(e) = reconcile_column(source_pool, target_pool, table, column).await {
            warnings.push(e);
        }
    }

    warnings
}

async fn reconcile_column(
    source_pool: &Pool<Postgres>,
    target_pool: &Pool<Postgres>,
    table: &str,
    column: &str,
) -> Result<(), SyncError> {
    let Some(sequence_name) = serial_sequence_for(target_pool, table, column).await? else {
        return Ok(());
    };

    let (source_last_value, source_is_called) = match serial_sequence_for(source_pool, table, column).await? {
        Some(source_sequence) => current_sequence_state(source_pool, &source_sequence).await?,
        None => (0, false),
    };

    let target_max: i64 = sqlx::query(&format!(
        "SELECT COALESCE(MAX(\"{column}\"), 0)::bigint AS max_value FROM \"{table}\""
    ))
    .fetch_one(target_pool)
    .await
    .map_err(|e| SyncError::Sequence {
        table: table.to_string(),
        column: column.to_string(),
        reason: e.to_string(),
    })?
    .get::<i64, _>("max_value");

    let next_value = source_last_value.max(target_max);
    // If the target already has rows beyond the source's last value, the
    // sequence must be treated as already-called regardless of what the
    // source recorded, or the next nextval() would collide with target_max.
    let is_called = source_is_called || target_max > source_last_value;

    sqlx::query("SELECT setval($1, $2, $3)")
        .bind(&sequence_name)
        .bind(next_value)
        .bind(is_called)
        .execute(target_pool)
        .await
        .map_err(|e| SyncError::Sequence {
            table: table.to_string(),
            column: column.to_string(),
            reason: e.to_string(),
        })?;

    Ok(())
}

async fn serial_sequence_for(
    pool: &Pool<Postgres>,
    table: &str,
    column: &str,
) -> Result<Option<String>, SyncError> {
    let row = sqlx::query("SELECT pg_get_serial_sequence($1, $2) AS seq")
        .bind(format!("public.{table}"))
        .bind(column)
        .fetch_one(pool)
        .await
        .map_err(|e| SyncError::Sequence {
            table: table.to_string(),
            column: column.to_string(),
            reason: e.to_string(),
        })?;

    Ok(row.get::<Option<String>, _>("seq"))
}

/// Reads a sequence's `last_value` and `is_called` directly off the
/// sequence relation — `pg_sequence_last_value` alone can't distinguish
/// "never called" from "called, value 0", but selecting from the
/// sequence itself returns both columns straight from its state.
async fn current_sequence_state(pool: &Pool<Postgres>, sequence_name: &str) -> Result<(i64, bool), SyncError> {
    let row = sqlx::query(&format!("SELECT last_value, is_called FROM {sequence_name}"))
        .fetch_optional(pool)
        .await
        .map_err(|e| SyncError::Sequence {
            table: String::new(),
            column: String::new(),
            reason: e.to_string(),
        })?;

    Ok(row
        .map(|r| (r.get::<i64, _>("last_value"), r.get::<bool, _>("is_called")))
        .unwrap_or((0, false)))
}

#[cfg(test)]
mod tests {
    // The reconciler needs a live two-database fixture to exercise
    // meaningfully; see the integration notes in DESIGN.md for the
    // properties covered at that layer instead of here.
}
