//! Locates the PostgreSQL client binaries (`pg_dump`, `pg_restore`, `psql`)
//! this crate shells out to. Checks `PATH` first via `which`, then falls
//! back to the well-known per-platform install directories, and caches
//! each resolved path so repeated lookups across a run don't re-walk the
//! filesystem.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::Mutex;

use crate::errors::SyncError;

fn cache() -> &'static Mutex<HashMap<&'static str, PathBuf>> {
    static CACHE: OnceLock<Mutex<HashMap<&'static str, PathBuf>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn find_pg_dump() -> Result<PathBuf, SyncError> {
    find_binary("pg_dump")
}

pub fn find_pg_restore() -> Result<PathBuf, SyncError> {
    find_binary("pg_restore")
}

pub fn find_psql() -> Result<PathBuf, SyncError> {
    find_binary("psql")
}

fn find_binary(name: &'static str) -> Result<PathBuf, SyncError> {
    if let Some(cached) = cache().lock().unwrap().get(name) {
        return Ok(cached.clone());
    }

    let resolved = which::which(name)
        .ok()
        .or_else(|| well_known_paths(name).into_iter().find(|p| p.is_file()))
        .ok_or_else(|| {
            SyncError::ExternalTool(format!(
                "'{name}' not found on PATH or in well-known PostgreSQL install locations"
            ))
        })?;

    cache().lock().unwrap().insert(name, resolved.clone());
    Ok(resolved)
}

#[cfg(target_os = "windows")]
fn well_known_paths(name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(entries) = std::fs::read_dir(r"C:\Program Files\PostgreSQL") {
        for entry in entries.flatten() {
            candidates.push(entry.path().join("bin").join(format!("{name}.exe")));
        }
    }
    candidates
}

#[cfg(target_os = "macos")]
fn well_known_paths(name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(entries) = std::fs::read_dir("/opt/homebrew/opt") {
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with("postgresql") {
                candidates.push(entry.path().join("bin").join(name));
            }
        }
    }
    candidates.push(PathBuf::from("/usr/local/bin").join(name));
    candidates.push(PathBuf::from("/Applications/Postgres.app/Contents/Versions/latest/bin").join(name));
    candidates
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn well_known_paths(name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(entries) = std::fs::read_dir("/usr/lib/postgresql") {
        for entry in entries.flatten() {
            candidates.push(entry.path().join("bin").join(name));
        }
    }
    candidates.push(PathBuf::from("/usr/bin").join(name));
    candidates.push(PathBuf::from("/usr/local/bin").join(name));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_binary_reports_external_tool_error() {
        let err = find_binary("definitely-not-a-real-pg-binary");
        assert!(matches!(err, Err(SyncError::ExternalTool(_))));
    }
}
