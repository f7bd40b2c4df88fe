//! Connection registry - one PostgreSQL pool per named backend
//!
//! Pools are built once at startup with a fixed size and a bounded acquire
//! wait. They connect lazily, so an unreachable backend fails the requests
//! that need it instead of the whole process.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool, Postgres};

use crate::error::{DashError, Result};
use crate::settings::{BackendSettings, Settings};

/// The fixed set of external backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Backend {
    AssetManager,
    LandingTables,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::AssetManager, Backend::LandingTables];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssetManager => "asset_manager",
            Self::LandingTables => "landing_tables",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| DashError::UnknownBackend(s.to_owned()))
    }
}

struct BackendHandle {
    pool: PgPool,
    schema: String,
    connect_options: PgConnectOptions,
    acquire_timeout: Duration,
}

impl BackendHandle {
    fn new(
        connect_options: PgConnectOptions,
        schema: String,
        pool_size: u32,
        acquire_timeout: Duration,
    ) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(connect_options.clone());

        Self {
            pool,
            schema,
            connect_options,
            acquire_timeout,
        }
    }

    fn from_settings(settings: &BackendSettings, acquire_timeout: Duration) -> Self {
        Self::new(
            settings.connect_options(),
            settings.schema.clone(),
            settings.pool_size,
            acquire_timeout,
        )
    }

    /// Dial the backend once outside the pool, which would otherwise keep
    /// retrying a refused connection until the acquire timeout.
    async fn check_reachable(&self, backend: Backend) -> Result<()> {
        let attempt = tokio::time::timeout(
            self.acquire_timeout,
            PgConnection::connect_with(&self.connect_options),
        )
        .await;

        match attempt {
            Ok(Ok(conn)) => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(backend = %backend, error = %e, "Closing reachability check failed");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(unavailable(backend, e.to_string())),
            Err(_) => Err(unavailable(backend, "connect timed out".to_owned())),
        }
    }
}

fn unavailable(backend: Backend, reason: String) -> DashError {
    tracing::warn!(backend = %backend, %reason, "Backend unavailable");
    DashError::BackendUnavailable {
        backend: backend.as_str().to_owned(),
        reason,
    }
}

/// Named handles to every configured backend
pub struct Registry {
    asset_manager: BackendHandle,
    landing_tables: BackendHandle,
}

impl Registry {
    /// Build the pools for every backend without opening connections yet.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn connect_lazy(settings: &Settings) -> Self {
        for backend in Backend::ALL {
            let cfg = settings.backend(backend);
            tracing::info!(
                backend = %backend,
                host = %cfg.host,
                port = cfg.port,
                database = %cfg.database,
                schema = %cfg.schema,
                pool_size = cfg.pool_size,
                "Registering backend"
            );
        }

        Self {
            asset_manager: BackendHandle::from_settings(
                &settings.asset_manager,
                settings.acquire_timeout,
            ),
            landing_tables: BackendHandle::from_settings(
                &settings.landing_tables,
                settings.acquire_timeout,
            ),
        }
    }

    /// Resolve a logical backend identifier.
    pub fn resolve(&self, id: &str) -> Result<Backend> {
        id.parse()
    }

    fn handle(&self, backend: Backend) -> &BackendHandle {
        match backend {
            Backend::AssetManager => &self.asset_manager,
            Backend::LandingTables => &self.landing_tables,
        }
    }

    pub fn pool(&self, backend: Backend) -> &PgPool {
        &self.handle(backend).pool
    }

    /// Catalog schema whose tables are visible through this backend.
    pub fn schema(&self, backend: Backend) -> &str {
        &self.handle(backend).schema
    }

    /// Check out one connection; it returns to the pool when dropped.
    ///
    /// A pool holding no connections first checks that the backend answers
    /// at all, so a down backend is `BackendUnavailable` right away. Waiting
    /// out the timeout on a pool whose connections are all busy is
    /// `PoolExhausted`.
    pub async fn acquire(&self, backend: Backend) -> Result<PoolConnection<Postgres>> {
        let handle = self.handle(backend);
        if handle.pool.size() == 0 {
            handle.check_reachable(backend).await?;
        }

        handle.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut if handle.pool.size() == 0 => unavailable(
                backend,
                "no connection could be opened before the acquire timeout".to_owned(),
            ),
            sqlx::Error::PoolTimedOut => DashError::PoolExhausted {
                backend: backend.as_str().to_owned(),
            },
            other => unavailable(backend, other.to_string()),
        })
    }

    /// Close every pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        for backend in Backend::ALL {
            self.pool(backend).close().await;
            tracing::debug!(backend = %backend, "Backend pool closed");
        }
    }
}
