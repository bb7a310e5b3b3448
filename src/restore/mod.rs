pub mod copy_parser;
pub mod stage_a;
pub mod stage_b;

use std::path::Path;

use sqlx::{Pool, Postgres};

use crate::errors::{StageOutcome, SyncError};
use crate::logging::LogSink;
use crate::types::{ConnectionParams, TableMetadata};

/// Restores one table's dump into the target, trying Stage A first and
/// escalating to Stage B on any failure. Returns `Ok(())` once either
/// stage succeeds; a hard failure from either stage propagates so the
/// orchestrator can log it and move to the next table.
///
/// `common_columns` is the source∩target column set (source order)
/// computed by the schema inspector — Stage B needs it to map the
/// dump's COPY header (the source's full column list) onto columns
/// that actually exist on the target.
pub async fn restore_table(
    target_pool: &Pool<Postgres>,
    target_params: &ConnectionParams,
    metadata: &TableMetadata,
    common_columns: &[String],
    dump_path: &Path,
    log: &LogSink,
) -> Result<(), SyncError> {
    match stage_a::restore_direct(target_params, &metadata.name, dump_path).await {
        StageOutcome::Ok => Ok(()),
        StageOutcome::NeedsUpsert(reason) => {
            log.warn(&format!(
                "table '{}': direct load failed ({reason}), falling back to staged upsert",
                metadata.name
            ));
            stage_b::restore_upsert(target_pool, metadata, common_columns, dump_path, log).await
        }
        StageOutcome::HardFail(reason) => Err(SyncError::RestoreStageA {
            table: metadata.name.clone(),
            reason,
        }),
    }
}
