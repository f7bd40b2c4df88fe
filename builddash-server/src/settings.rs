//! Process settings loaded from the environment
//!
//! Variables (all required unless noted):
//! - `AM_HOST`, `AM_PORT`, `AM_USER_NAME`, `AM_PASS`, `AM_DB_NAME`: asset_manager
//! - `DB_HOST`, `DB_PORT`, `DB_USER_NAME`, `DB_PASS`, `DATABASE_NAME`: landing_tables
//! - `CONNECTIONS_POOL`: pool size for both backends
//! - `AM_SCHEMA`, `DB_SCHEMA`: catalog schema (optional, default `public`)
//! - `POOL_ACQUIRE_TIMEOUT_SECS`: pool wait bound (optional, default 30)
//! - `SQLITE_DB_PATH`: layout store file (optional, default `layouts.db`)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;

use crate::error::{DashError, Result};
use crate::registry::Backend;

const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SQLITE_PATH: &str = "layouts.db";

/// Connection parameters for one external backend
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub pool_size: u32,
}

impl BackendSettings {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub asset_manager: BackendSettings,
    pub landing_tables: BackendSettings,
    pub acquire_timeout: Duration,
    pub sqlite_path: PathBuf,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pool_size: u32 = parse_required(&lookup, "CONNECTIONS_POOL")?;
        if pool_size == 0 {
            return Err(DashError::Config(
                "CONNECTIONS_POOL must be at least 1".to_string(),
            ));
        }

        let asset_manager = BackendSettings {
            host: required(&lookup, "AM_HOST")?,
            port: parse_required(&lookup, "AM_PORT")?,
            user: required(&lookup, "AM_USER_NAME")?,
            password: required(&lookup, "AM_PASS")?,
            database: required(&lookup, "AM_DB_NAME")?,
            schema: lookup("AM_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            pool_size,
        };

        let landing_tables = BackendSettings {
            host: required(&lookup, "DB_HOST")?,
            port: parse_required(&lookup, "DB_PORT")?,
            user: required(&lookup, "DB_USER_NAME")?,
            password: required(&lookup, "DB_PASS")?,
            database: required(&lookup, "DATABASE_NAME")?,
            schema: lookup("DB_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            pool_size,
        };

        let acquire_timeout = match lookup("POOL_ACQUIRE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_value("POOL_ACQUIRE_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        };

        let sqlite_path = lookup("SQLITE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH));

        Ok(Self {
            asset_manager,
            landing_tables,
            acquire_timeout,
            sqlite_path,
        })
    }

    pub fn backend(&self, backend: Backend) -> &BackendSettings {
        match backend {
            Backend::AssetManager => &self.asset_manager,
            Backend::LandingTables => &self.landing_tables,
        }
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DashError::Config(format!("{} is not set", key)))
}

fn parse_required<F, T>(lookup: &F, key: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = required(lookup, key)?;
    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| DashError::Config(format!("{} has an invalid value: '{}'", key, raw)))
}
