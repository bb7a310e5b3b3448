//! Stage B: when Stage A fails, re-extracts the `COPY` block from the
//! same plain-SQL dump, maps it onto the source∩target column
//! intersection, loads it into an unlogged scratch table, then folds
//! it into the real table with one `INSERT ... ON CONFLICT DO UPDATE`.
//! Slower than Stage A but idempotent against rows that already exist
//! on the target, and tolerant of column drift between source and
//! target — the staged-upsert fallback the direct load path can't
//! offer.

use std::path::Path;

use sqlx::{Pool, Postgres};

use crate::errors::SyncError;
use crate::logging::LogSink;
use crate::restore::copy_parser;
use crate::types::TableMetadata;

const BATCH_SIZE: usize = 1000;

struct CopyBlock {
    /// Full column list from the dump's COPY header — this is the
    /// *source* table's columns, not necessarily the target's.
    header_columns: Vec<String>,
    rows: Vec<Vec<copy_parser::Field>>,
}

fn extract_copy_block(content: &str, table: &str) -> Option<CopyBlock> {
    let header_prefix = format!("COPY public.{table} (");
    let header_prefix_unqualified = format!("COPY {table} (");

    let header_line = content
        .lines()
        .find(|l| l.starts_with(&header_prefix) || l.starts_with(&header_prefix_unqualified))?;

    let columns_start = header_line.find('(')? + 1;
    let columns_end = header_line.rfind(')')?;
    let header_columns: Vec<String> = header_line[columns_start..columns_end]
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect();

    let body_start = content.find(header_line)? + header_line.len() + 1;
    let body = &content[body_start..];
    let body_end = body.find("\\.\n").or_else(|| body.find("\\."))?;
    let rows = copy_parser::parse_copy_block(&body[..body_end + 2]);

    Some(CopyBlock { header_columns, rows })
}

/// Runs the staged upsert for one table. `common_columns` is the
/// source∩target intersection (source order); the dump's COPY header
/// columns are mapped onto it by position, so a source-only column
/// present in the dump but absent from `common_columns` is dropped
/// rather than tripping a "column does not exist" error on the target.
pub async fn restore_upsert(
    pool: &Pool<Postgres>,
    metadata: &TableMetadata,
    common_columns: &[String],
    dump_path: &Path,
    log: &LogSink,
) -> Result<(), SyncError> {
    let table = &metadata.name;
    let content = std::fs::read_to_string(dump_path).map_err(|e| SyncError::RestoreStageB {
        table: table.clone(),
        reason: format!("failed to read dump: {e}"),
    })?;

    let block = extract_copy_block(&content, table).ok_or_else(|| SyncError::RestoreStageB {
        table: table.clone(),
        reason: "no COPY block found in dump".to_string(),
    })?;

    if block.rows.is_empty() {
        return Ok(());
    }

    // Map each column we actually want (the source∩target intersection)
    // to its position in the dump's header, dropping any that — for
    // whatever reason — aren't in the header at all.
    let mut columns = Vec::with_capacity(common_columns.len());
    let mut header_indices = Vec::with_capacity(common_columns.len());
    for col in common_columns {
        match block.header_columns.iter().position(|h| h == col) {
            Some(idx) => {
                columns.push(col.clone());
                header_indices.push(idx);
            }
            None => log.warn(&format!(
                "table '{table}': column '{col}' not found in dump header, skipping"
            )),
        }
    }

    if columns.is_empty() {
        return Err(SyncError::RestoreStageB {
            table: table.clone(),
            reason: "no common columns survived mapping against the dump header".to_string(),
        });
    }

    let rows: Vec<Vec<copy_parser::Field>> = block
        .rows
        .iter()
        .map(|row| header_indices.iter().map(|&i| row[i].clone()).collect())
        .collect();

    let column_list = columns.join(", ");
    let temp_table = format!("pgsyncd_stage_{table}");

    let mut tx = pool.begin().await.map_err(|source| SyncError::Connect {
        table: Some(table.clone()),
        source,
    })?;

    sqlx::query(&format!(
        "CREATE TEMP TABLE \"{temp_table}\" ON COMMIT DROP AS SELECT {column_list} FROM \"{table}\" WHERE false",
    ))
    .execute(&mut *tx)
    .await
    .map_err(|e| SyncError::RestoreStageB {
        table: table.clone(),
        reason: format!("failed to create staging table: {e}"),
    })?;

    let mut dropped_rows = 0usize;
    for batch in rows.chunks(BATCH_SIZE) {
        dropped_rows += insert_batch(&mut tx, &temp_table, &columns, batch).await;
    }
    if dropped_rows > 0 {
        log.warn(&format!(
            "table '{table}': {dropped_rows} row(s) failed to stage and were dropped"
        ));
    }

    let conflict_cols = metadata.primary_key_columns.join(", ");
    let update_cols: Vec<String> = columns
        .iter()
        .filter(|c| !metadata.primary_key_columns.contains(c))
        .map(|c| format!("\"{c}\" = EXCLUDED.\"{c}\""))
        .collect();

    // With no non-key columns to update, fall back to re-asserting the
    // primary key on conflict — a no-op write that still takes the
    // conflict path, rather than `DO NOTHING`, which would silently
    // skip rows whose non-key data changed on a previous stage.
    let update_clause = if update_cols.is_empty() {
        metadata
            .primary_key_columns
            .iter()
            .map(|c| format!("\"{c}\" = EXCLUDED.\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        update_cols.join(", ")
    };

    let upsert_sql = format!(
        "INSERT INTO \"{table}\" ({column_list}) SELECT {column_list} FROM \"{temp_table}\" \
         ON CONFLICT ({conflict_cols}) DO UPDATE SET {update_clause}"
    );

    sqlx::query(&upsert_sql)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::RestoreStageB {
            table: table.clone(),
            reason: format!("final upsert failed: {e}"),
        })?;

    tx.commit().await.map_err(|source| SyncError::Connect {
        table: Some(table.clone()),
        source,
    })?;

    Ok(())
}

/// Inserts `rows` into the staging table one at a time so a single bad
/// row (a type mismatch, an overlong value) doesn't abort the whole
/// batch — it's counted and dropped instead. Returns the number of rows
/// dropped.
async fn insert_batch(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    temp_table: &str,
    columns: &[String],
    rows: &[Vec<copy_parser::Field>],
) -> usize {
    let col_list = columns.join(", ");
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let sql = format!(
        "INSERT INTO \"{temp_table}\" ({col_list}) VALUES ({})",
        placeholders.join(", ")
    );

    let mut dropped = 0;
    for row in rows {
        let mut query = sqlx::query(&sql);
        for field in row {
            query = query.bind(field.clone());
        }
        if query.execute(&mut **tx).await.is_err() {
            dropped += 1;
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_header_columns_and_rows_from_plain_dump() {
        let dump = "--\n-- Data\n--\n\nCOPY public.users (id, name) FROM stdin;\n1\talice\n2\tbob\n\\.\n\n\nSELECT pg_catalog.setval(...);\n";
        let block = extract_copy_block(dump, "users").unwrap();
        assert_eq!(block.header_columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(block.rows.len(), 2);
    }

    #[test]
    fn missing_copy_block_returns_none() {
        let dump = "-- nothing relevant here\n";
        assert!(extract_copy_block(dump, "users").is_none());
    }

    #[test]
    fn source_only_column_is_dropped_from_mapping() {
        // produtos dump carries descricao/categoria that the target lacks;
        // common_columns only has id/nome, so the header-index mapping
        // must select just those two positions.
        let dump = "COPY public.produtos (id, nome, descricao, categoria) FROM stdin;\n1\twidget\tlong text\telectronics\n\\.\n";
        let block = extract_copy_block(dump, "produtos").unwrap();
        let common = vec!["id".to_string(), "nome".to_string()];
        let indices: Vec<usize> = common
            .iter()
            .map(|c| block.header_columns.iter().position(|h| h == c).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1]);
        let mapped_row: Vec<_> = indices.iter().map(|&i| block.rows[0][i].clone()).collect();
        assert_eq!(mapped_row, vec![Some("1".to_string()), Some("widget".to_string())]);
    }
}
