use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::GeneralConfig;

pub mod migrator;

/// Pool sizing and timeouts for the store connection.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Fail fast instead of queueing forever when the pool is exhausted.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&GeneralConfig> for PoolOptions {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            max_connections: general.max_db_connections,
            min_connections: general.min_db_connections,
            acquire_timeout: Duration::from_secs(general.db_acquire_timeout_seconds),
            idle_timeout: Duration::from_secs(general.db_idle_timeout_seconds),
        }
    }
}

/// Handle on the persistent store.
///
/// The connection is deliberately not public: reads and writes of identity
/// data go through [`crate::gateway::Gateway`], which is the only module
/// that can satisfy the capability parameter of the query functions.
#[derive(Clone)]
pub struct Store {
    conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, PoolOptions::default()).await
    }

    pub async fn from_config(general: &GeneralConfig) -> Result<Self> {
        Self::with_pool_options(&general.database_path, PoolOptions::from(general)).await
    }

    pub async fn with_pool_options(db_url: &str, options: PoolOptions) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.connect_timeout(Duration::from_secs(10))
            .acquire_timeout(options.acquire_timeout)
            .sqlx_logging(false);

        if in_memory {
            // Every in-memory connection is its own database; keep exactly one alive.
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(options.max_connections)
                .min_connections(options.min_connections)
                .idle_timeout(options.idle_timeout)
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            options.min_connections, options.max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    pub(crate) const fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}
