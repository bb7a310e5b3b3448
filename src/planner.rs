//! Dependency planner: orders tables so a row is never inserted before
//! the row it foreign-keys into. Builds the FK edge list with one
//! query against `pg_constraint`, then assigns each table a depth by
//! iterative relaxation (a table's depth is one more than the deepest
//! of its dependencies) rather than a full topological sort — simpler
//! to reason about and cheap enough at table-catalog scale.

use std::collections::{HashMap, HashSet};

use sqlx::{Pool, Postgres, Row};

use crate::errors::SyncError;
use crate::logging::LogSink;
use crate::types::TableDependency;

/// Self-references are dropped outright (a table never needs to wait on
/// itself); an edge pointing outside the synced table set is dropped
/// too but logged, since it means the target table's parent row isn't
/// being synced by this run at all.
pub async fn foreign_key_edges(
    pool: &Pool<Postgres>,
    tables: &[String],
    log: &LogSink,
) -> Result<Vec<TableDependency>, SyncError> {
    let rows = sqlx::query(
        "SELECT \
            conname AS constraint_name, \
            conrelid::regclass::text AS table_name, \
            confrelid::regclass::text AS depends_on \
         FROM pg_constraint \
         WHERE contype = 'f' \
           AND connamespace = 'public'::regnamespace",
    )
    .fetch_all(pool)
    .await?;

    let table_set: HashSet<&str> = tables.iter().map(String::as_str).collect();

    let mut edges = Vec::new();
    for row in rows {
        let edge = TableDependency {
            table: row.get::<String, _>("table_name"),
            depends_on: row.get::<String, _>("depends_on"),
            constraint_name: row.get::<String, _>("constraint_name"),
        };

        if edge.table == edge.depends_on {
            continue;
        }

        if !table_set.contains(edge.table.as_str()) {
            continue;
        }

        if !table_set.contains(edge.depends_on.as_str()) {
            log.warn(&format!(
                "table '{}' has an external dependency on '{}' (constraint '{}') outside the synced table set, ignoring for ordering",
                edge.table, edge.depends_on, edge.constraint_name
            ));
            continue;
        }

        edges.push(edge);
    }

    Ok(edges)
}

/// Groups `tables` into ordered levels: level 0 has no dependencies
/// within the set, level N depends only on tables in levels < N. A
/// table participating in a cycle settles at whatever depth the
/// relaxation reaches before the iteration cap and is logged, not
/// dropped — the orchestrator still attempts it, just without an
/// ordering guarantee against its cycle partners.
pub fn plan_levels(tables: &[String], edges: &[TableDependency], log: &LogSink) -> Vec<Vec<String>> {
    let mut depth: HashMap<&str, usize> = tables.iter().map(|t| (t.as_str(), 0)).collect();

    let max_iterations = tables.len().saturating_mul(2).max(1);
    let mut hit_cap = false;
    for i in 0..max_iterations {
        let mut changed = false;
        for edge in edges {
            let dep_depth = *depth.get(edge.depends_on.as_str()).unwrap_or(&0);
            let entry = depth.entry(edge.table.as_str()).or_insert(0);
            if *entry < dep_depth + 1 {
                *entry = dep_depth + 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        if i == max_iterations - 1 {
            hit_cap = true;
        }
    }

    if hit_cap {
        log.warn(
            "dependency depth relaxation hit its iteration cap, a foreign-key cycle is likely present; \
             affected tables will still be synced but without an ordering guarantee against their cycle partners",
        );
    }

    let max_depth = depth.values().copied().max().unwrap_or(0);
    let mut levels: Vec<Vec<String>> = vec![Vec::new(); max_depth + 1];
    for table in tables {
        let d = *depth.get(table.as_str()).unwrap_or(&0);
        levels[d].push(table.clone());
    }
    for level in &mut levels {
        level.sort();
    }
    levels.retain(|level| !level.is_empty());
    levels
}

/// Falls back to a plain alphabetical single-level plan when the edge
/// query itself fails (insufficient privileges to read
/// `pg_constraint`, for instance) — a degraded-but-deterministic order
/// beats refusing to sync at all.
pub fn alphabetical_fallback(tables: &[String]) -> Vec<Vec<String>> {
    let mut sorted = tables.to_vec();
    sorted.sort();
    vec![sorted]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(table: &str, depends_on: &str) -> TableDependency {
        TableDependency {
            table: table.to_string(),
            depends_on: depends_on.to_string(),
            constraint_name: format!("{table}_{depends_on}_fkey"),
        }
    }

    #[test]
    fn independent_tables_land_in_one_level() {
        let tables = vec!["a".to_string(), "b".to_string()];
        let levels = plan_levels(&tables, &[], &LogSink::stdout());
        assert_eq!(levels, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn child_table_lands_after_parent() {
        let tables = vec!["orders".to_string(), "customers".to_string()];
        let edges = vec![dep("orders", "customers")];
        let levels = plan_levels(&tables, &edges, &LogSink::stdout());
        assert_eq!(levels[0], vec!["customers".to_string()]);
        assert_eq!(levels[1], vec!["orders".to_string()]);
    }

    #[test]
    fn chain_of_three_produces_three_levels() {
        let tables = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let edges = vec![dep("b", "a"), dep("c", "b")];
        let levels = plan_levels(&tables, &edges, &LogSink::stdout());
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["a".to_string()]);
        assert_eq!(levels[1], vec!["b".to_string()]);
        assert_eq!(levels[2], vec!["c".to_string()]);
    }

    #[test]
    fn cycle_terminates_without_hanging() {
        let tables = vec!["a".to_string(), "b".to_string()];
        let edges = vec![dep("a", "b"), dep("b", "a")];
        let levels = plan_levels(&tables, &edges, &LogSink::stdout());
        // Must terminate and account for both tables somewhere.
        let total: usize = levels.iter().map(|l| l.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn self_reference_is_dropped_and_does_not_affect_depth() {
        let tables = vec!["employees".to_string()];
        let edges = vec![dep("employees", "employees")];
        let levels = plan_levels(&tables, &edges, &LogSink::stdout());
        assert_eq!(levels, vec![vec!["employees".to_string()]]);
    }

    #[test]
    fn alphabetical_fallback_is_sorted() {
        let tables = vec!["zeta".to_string(), "alpha".to_string()];
        let levels = alphabetical_fallback(&tables);
        assert_eq!(levels, vec![vec!["alpha".to_string(), "zeta".to_string()]]);
    }
}
