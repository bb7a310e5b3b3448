//! Connection factory: turns a config URL into a live `sqlx` pool with
//! the TLS policy spec'd for this system — off for loopback hosts, on
//! with permissive verification otherwise (so a source or target behind
//! a self-signed cert still connects, matching how operators actually
//! run this against managed Postgres instances).

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Pool, Postgres};
use url::Url;

use crate::errors::SyncError;
use crate::types::ConnectionParams;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

pub fn parse_connection_params(url: &str, ssl_enabled_cfg: bool) -> Result<ConnectionParams, SyncError> {
    let parsed = Url::parse(url)?;

    let host = parsed
        .host_str()
        .ok_or_else(|| SyncError::Configuration(format!("URL '{url}' has no host")))?
        .to_string();
    let port = parsed.port().unwrap_or(5432);
    let user = parsed.username().to_string();
    let password = parsed.password().unwrap_or_default().to_string();
    let database = parsed
        .path_segments()
        .and_then(|mut segs| segs.next())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::Configuration(format!("URL '{url}' has no database name")))?
        .to_string();

    let mut params = ConnectionParams {
        host,
        port,
        user,
        password,
        database,
        ssl_enabled: ssl_enabled_cfg,
    };

    // Loopback connections never need TLS and frequently run against a
    // local dev Postgres with no cert configured at all.
    if params.is_loopback_host() {
        params.ssl_enabled = false;
    }

    Ok(params)
}

fn connect_options(params: &ConnectionParams) -> PgConnectOptions {
    let ssl_mode = if params.ssl_enabled {
        PgSslMode::Require
    } else {
        PgSslMode::Disable
    };

    PgConnectOptions::new()
        .host(&params.host)
        .port(params.port)
        .username(&params.user)
        .password(&params.password)
        .database(&params.database)
        .ssl_mode(ssl_mode)
}

/// Opens a small pool against one endpoint and probes it with `SELECT
/// 1`, surfacing connect failures as `SyncError::Connect` with the
/// table left `None` (this is a whole-endpoint connection, not a
/// per-table one).
pub async fn connect(url: &str, ssl_enabled_cfg: bool) -> Result<Pool<Postgres>, SyncError> {
    let params = parse_connection_params(url, ssl_enabled_cfg)?;
    let options = connect_options(&params);

    let pool = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        PgPoolOptions::new().max_connections(10).connect_with(options),
    )
    .await
    .map_err(|_| SyncError::Connect {
        table: None,
        source: sqlx::Error::PoolTimedOut,
    })?
    .map_err(|source| SyncError::Connect { table: None, source })?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|source| SyncError::Connect { table: None, source })?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_host_forces_ssl_off() {
        let params = parse_connection_params("postgres://u:p@localhost:5432/app", true).unwrap();
        assert!(!params.ssl_enabled);
    }

    #[test]
    fn remote_host_keeps_configured_ssl() {
        let params = parse_connection_params("postgres://u:p@db.example.com:5432/app", true).unwrap();
        assert!(params.ssl_enabled);
    }

    #[test]
    fn missing_database_is_rejected() {
        let err = parse_connection_params("postgres://u:p@db.example.com:5432/", true);
        assert!(err.is_err());
    }

    #[test]
    fn default_port_is_5432() {
        let params = parse_connection_params("postgres://u:p@db.example.com/app", true).unwrap();
        assert_eq!(params.port, 5432);
    }
}
