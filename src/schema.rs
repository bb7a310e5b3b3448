//! Schema inspector: lists tables present on both ends of the sync and
//! their metadata, grounded in the teacher's `pg_class`/`pg_attribute`
//! query style from `utils/sequence_reset.rs` but scoped to table shape
//! instead of sequence ownership.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use sqlx::{Pool, Postgres, Row};

use crate::errors::SyncError;
use crate::logging::LogSink;
use crate::types::TableMetadata;

fn valid_identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

pub fn validate_identifier(name: &str) -> Result<(), SyncError> {
    if valid_identifier_re().is_match(name) {
        Ok(())
    } else {
        Err(SyncError::InvalidIdentifier(name.to_string()))
    }
}

async fn base_table_names(pool: &Pool<Postgres>) -> Result<Vec<String>, SyncError> {
    let rows = sqlx::query(
        "SELECT relname FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE n.nspname = 'public' AND c.relkind = 'r' \
         ORDER BY relname",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| row.get::<String, _>("relname")).collect())
}

/// Lists `public` base tables present on the source that also exist on
/// the target. Exclusions from config are *not* applied here — they
/// take effect at dispatch time so dependency-depth computation still
/// sees the full table set. A source table absent on the target, or
/// whose name fails the identifier pattern, is skipped with a warning
/// rather than failing the whole discovery pass.
pub async fn list_tables(
    source_pool: &Pool<Postgres>,
    target_pool: &Pool<Postgres>,
    log: &LogSink,
) -> Result<Vec<String>, SyncError> {
    let source_tables = base_table_names(source_pool).await?;
    let target_tables: HashSet<String> = base_table_names(target_pool).await?.into_iter().collect();

    let mut tables = Vec::new();
    for name in source_tables {
        if !valid_identifier_re().is_match(&name) {
            log.warn(&format!(
                "skipping table '{name}': name does not match the allowed identifier pattern"
            ));
            continue;
        }
        if !target_tables.contains(&name) {
            log.warn(&format!("skipping table '{name}': not present on target"));
            continue;
        }
        tables.push(name);
    }

    Ok(tables)
}

/// Fetches column, primary-key, row-count and `updated_at`-hint
/// metadata for one table. A table with no primary key defaults to
/// `"id"` (logged) rather than failing discovery outright, per the
/// spec's "most tables have one" assumption.
pub async fn metadata(pool: &Pool<Postgres>, table: &str, log: &LogSink) -> Result<TableMetadata, SyncError> {
    validate_identifier(table)?;

    let columns: Vec<String> = sqlx::query(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.get::<String, _>("column_name"))
    .collect();

    let mut primary_key_columns: Vec<String> = sqlx::query(
        "SELECT a.attname FROM pg_index i \
         JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
         WHERE i.indrelid = $1::regclass AND i.indisprimary \
         ORDER BY a.attnum",
    )
    .bind(format!("public.{table}"))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.get::<String, _>("attname"))
    .collect();

    if primary_key_columns.is_empty() {
        log.warn(&format!("table '{table}' has no primary key, defaulting to 'id'"));
        primary_key_columns = vec!["id".to_string()];
    }

    let has_updated_at = columns.iter().any(|c| c == "updated_at");

    let row_count: i64 = sqlx::query(&format!("SELECT COUNT(*)::bigint AS row_count FROM \"{table}\""))
        .fetch_one(pool)
        .await?
        .get::<i64, _>("row_count");

    Ok(TableMetadata {
        name: table.to_string(),
        primary_key_columns,
        columns,
        row_count,
        has_updated_at,
    })
}

/// Intersection of two tables' column sets, in source-table column
/// order, used to build the explicit column list for COPY/UPSERT so a
/// schema drift between source and target never breaks the run.
/// Columns dropped from either side are logged by name.
pub fn common_columns(source: &TableMetadata, target: &TableMetadata, log: &LogSink) -> Vec<String> {
    let common: Vec<String> = source
        .columns
        .iter()
        .filter(|c| target.columns.contains(c))
        .cloned()
        .collect();

    let source_only: Vec<&str> = source
        .columns
        .iter()
        .filter(|c| !target.columns.contains(c))
        .map(String::as_str)
        .collect();
    if !source_only.is_empty() {
        log.warn(&format!(
            "table '{}': source-only columns will be ignored: {}",
            source.name,
            source_only.join(", ")
        ));
    }

    let target_only: Vec<&str> = target
        .columns
        .iter()
        .filter(|c| !source.columns.contains(c))
        .map(String::as_str)
        .collect();
    if !target_only.is_empty() {
        log.warn(&format!(
            "table '{}': target-only columns will be left unfilled: {}",
            target.name,
            target_only.join(", ")
        ));
    }

    common
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, columns: &[&str]) -> TableMetadata {
        TableMetadata {
            name: name.to_string(),
            primary_key_columns: vec!["id".to_string()],
            columns: columns.iter().map(|c| c.to_string()).collect(),
            row_count: 0,
            has_updated_at: false,
        }
    }

    #[test]
    fn valid_identifiers_pass() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("order_items_2").is_ok());
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        assert!(validate_identifier("users; DROP TABLE x").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn common_columns_preserves_source_order() {
        let source = meta("t", &["id", "name", "legacy_col"]);
        let target = meta("t", &["id", "name", "new_col"]);
        let log = LogSink::stdout();
        assert_eq!(common_columns(&source, &target, &log), vec!["id", "name"]);
    }

    #[test]
    fn common_columns_logs_dropped_names_both_directions() {
        use std::sync::{Arc, Mutex};

        let source = meta("produtos", &["id", "descricao", "categoria"]);
        let target = meta("produtos", &["id", "extra_col"]);

        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = captured.clone();
        let log = LogSink::new(move |line| captured_clone.lock().unwrap().push(line.to_string()));

        let common = common_columns(&source, &target, &log);
        assert_eq!(common, vec!["id".to_string()]);

        let lines = captured.lock().unwrap();
        assert!(lines.iter().any(|l| l.contains("descricao") && l.contains("categoria")));
        assert!(lines.iter().any(|l| l.contains("extra_col")));
    }
}
